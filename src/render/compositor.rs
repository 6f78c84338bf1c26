//! Overlay compositor - pooled layers for non-primary visual content.
//!
//! Every overlay clip (images, text, secondary video) gets one reusable
//! layer. Layers live in a [`KeyedPool`] keyed by clip id: when a clip
//! leaves the active set its layer is reset and recycled, and only once the
//! recycle pool is full does a surface actually get destroyed. Steady-state
//! surface count therefore never exceeds
//! `max(active_overlay_count, max_layers)`.
//!
//! Enumeration order of the input defines stacking: overlay N draws at
//! `OVERLAY_Z_BASE + N`, above the primary video surface at z 0.
//!
//! Content updates are change-detected per layer (an image URL that did not
//! change is not rewritten) to avoid redundant backend writes.

use std::collections::HashSet;
use std::time::Instant;

use glam::Vec2;
use log::debug;
use uuid::Uuid;

use crate::core::pool::{KeyedPool, Released};
use crate::entities::{ActiveClip, AssetKind};
use crate::stores::MediaStore;

use super::{transform, Renderer, SurfaceContent, SurfaceId};

/// Primary video renders at z 0; overlays stack from here up.
pub const OVERLAY_Z_BASE: i32 = 10;

/// Default bound on the recycle pool.
pub const DEFAULT_MAX_LAYERS: usize = 20;

/// One pooled overlay layer.
#[derive(Debug)]
pub struct LayerNode {
    pub surface: SurfaceId,
    pub clip_id: Uuid,
    pub last_update: Instant,
    /// Change-detection key for the current content (image URL, text run).
    content_key: Option<String>,
}

impl LayerNode {
    fn new(surface: SurfaceId, clip_id: Uuid) -> Self {
        Self {
            surface,
            clip_id,
            last_update: Instant::now(),
            content_key: None,
        }
    }
}

/// Pooled overlay rendering over any [`Renderer`] backend.
pub struct OverlayCompositor {
    layers: KeyedPool<Uuid, LayerNode>,
    container: Vec2,
}

impl OverlayCompositor {
    pub fn new() -> Self {
        Self::with_max_layers(DEFAULT_MAX_LAYERS)
    }

    pub fn with_max_layers(max_layers: usize) -> Self {
        Self {
            layers: KeyedPool::new(max_layers),
            container: Vec2::ZERO,
        }
    }

    /// Render the overlay set for one frame.
    ///
    /// `overlays` is already filtered and ordered by the caller; its
    /// enumeration order defines stacking. Clips whose asset is missing are
    /// skipped silently.
    pub fn render_overlays(
        &mut self,
        renderer: &mut dyn Renderer,
        overlays: &[ActiveClip],
        assets: &MediaStore,
        width: f32,
        height: f32,
    ) {
        self.container = Vec2::new(width, height);
        let present: HashSet<Uuid> = overlays.iter().map(|a| a.clip.id).collect();

        // Recycle layers whose clip left the active set
        for clip_id in self.layers.active_keys() {
            if !present.contains(&clip_id) {
                self.recycle(renderer, clip_id);
            }
        }

        for (index, active) in overlays.iter().enumerate() {
            let clip = &active.clip;
            let Some(asset) = assets.get(clip.asset_id) else {
                debug!("overlay clip {} skipped: missing asset {}", clip.id, clip.asset_id);
                continue;
            };

            let (node, _how) = self.layers.acquire(
                clip.id,
                |node| node.content_key = None,
                || LayerNode::new(renderer.create_surface(), clip.id),
            );
            node.clip_id = clip.id;
            let surface = node.surface;

            // Content by asset kind, written only on change
            let (key, content) = match asset.kind {
                AssetKind::Image => (
                    format!("image:{}", asset.url),
                    Some(SurfaceContent::Image {
                        url: asset.url.clone(),
                    }),
                ),
                AssetKind::Video => {
                    // Secondary video overlays are a known gap: the layer is
                    // placed and sized but carries no playing content yet.
                    ("video:placeholder".to_string(), Some(SurfaceContent::Empty))
                }
                // Text assets and anything else render the display name as
                // styled text, standing in for a real caption model.
                AssetKind::Text | AssetKind::Audio => (
                    format!("text:{}", asset.name),
                    Some(SurfaceContent::Text {
                        text: asset.name.clone(),
                    }),
                ),
            };
            if node.content_key.as_deref() != Some(key.as_str()) {
                if let Some(content) = content {
                    renderer.set_content(surface, content);
                }
                self.layers
                    .get_mut(clip.id)
                    .expect("just acquired")
                    .content_key = Some(key);
            }

            let mut placement =
                transform::apply_transforms(clip, active.frame(), Some(&asset), self.container);
            placement.z = OVERLAY_Z_BASE + index as i32;
            renderer.set_placement(surface, placement);

            if let Some(node) = self.layers.get_mut(clip.id) {
                node.last_update = Instant::now();
            }
        }
    }

    /// Recycle every active layer (e.g. on timeline clear).
    pub fn clear_layers(&mut self, renderer: &mut dyn Renderer) {
        for clip_id in self.layers.active_keys() {
            self.recycle(renderer, clip_id);
        }
    }

    pub fn update_container_size(&mut self, width: f32, height: f32) {
        self.container = Vec2::new(width, height);
    }

    /// Destroy all layers, pooled ones included.
    pub fn dispose(&mut self, renderer: &mut dyn Renderer) {
        for node in self.layers.drain_all() {
            renderer.destroy_surface(node.surface);
        }
    }

    pub fn active_layer_count(&self) -> usize {
        self.layers.active_len()
    }

    pub fn pooled_layer_count(&self) -> usize {
        self.layers.free_len()
    }

    /// The layer currently bound to a clip, if any.
    pub fn layer_for_clip(&self, clip_id: Uuid) -> Option<&LayerNode> {
        self.layers.get(clip_id)
    }

    fn recycle(&mut self, renderer: &mut dyn Renderer, clip_id: Uuid) {
        let released = self.layers.release(clip_id, |node| {
            node.content_key = None;
            renderer.reset_surface(node.surface);
        });
        if let Released::Evicted(node) = released {
            debug!("layer pool full, destroying surface {}", node.surface);
            renderer.destroy_surface(node.surface);
        }
    }
}

impl Default for OverlayCompositor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{Clip, MediaAsset, Track, TrackKind};
    use crate::render::retained::RetainedRenderer;
    use crate::render::SurfaceContent;

    fn make_overlay(assets: &MediaStore, kind: AssetKind, order: i32) -> ActiveClip {
        let mut asset = MediaAsset::new(kind, format!("{kind:?}.dat"), format!("{kind:?}"));
        asset.width = Some(100);
        asset.height = Some(50);
        let asset_id = asset.id;
        assets.insert(asset);

        let track_kind = match kind {
            AssetKind::Text => TrackKind::Text,
            _ => TrackKind::Video,
        };
        let track = Track::new(track_kind, order, "overlay");
        let clip = Clip::new(track.id, asset_id, 0, 100);
        ActiveClip::new(clip, track, 10)
    }

    #[test]
    fn test_layer_created_and_recycled() {
        let mut renderer = RetainedRenderer::new(640, 360);
        let mut compositor = OverlayCompositor::new();
        let assets = MediaStore::new();
        let overlay = make_overlay(&assets, AssetKind::Image, 1);
        let clip_id = overlay.clip.id;

        compositor.render_overlays(&mut renderer, &[overlay], &assets, 640.0, 360.0);
        assert_eq!(compositor.active_layer_count(), 1);
        let surface = compositor.layer_for_clip(clip_id).unwrap().surface;
        assert!(matches!(
            renderer.node(surface).unwrap().content,
            SurfaceContent::Image { .. }
        ));

        // Clip gone: layer leaves the active map and is pooled
        compositor.render_overlays(&mut renderer, &[], &assets, 640.0, 360.0);
        assert_eq!(compositor.active_layer_count(), 0);
        assert_eq!(compositor.pooled_layer_count(), 1);
        assert!(compositor.layer_for_clip(clip_id).is_none());
        // Surface survives (recycled), reset and hidden
        let node = renderer.node(surface).unwrap();
        assert_eq!(node.content, SurfaceContent::Empty);
        assert!(!node.placement.visible);
    }

    #[test]
    fn test_pool_overflow_destroys_surface() {
        let mut renderer = RetainedRenderer::new(640, 360);
        let mut compositor = OverlayCompositor::with_max_layers(1);
        let assets = MediaStore::new();
        let a = make_overlay(&assets, AssetKind::Image, 1);
        let b = make_overlay(&assets, AssetKind::Image, 2);

        compositor.render_overlays(&mut renderer, &[a, b], &assets, 640.0, 360.0);
        assert_eq!(renderer.surface_count(), 2);

        // Both leave: one pooled, one destroyed (pool capacity 1)
        compositor.render_overlays(&mut renderer, &[], &assets, 640.0, 360.0);
        assert_eq!(compositor.pooled_layer_count(), 1);
        assert_eq!(renderer.surface_count(), 1);
    }

    #[test]
    fn test_steady_state_surface_bound() {
        let mut renderer = RetainedRenderer::new(640, 360);
        let mut compositor = OverlayCompositor::with_max_layers(3);
        let assets = MediaStore::new();

        // Churn overlays across several frames
        for round in 0..5 {
            let overlays: Vec<ActiveClip> = (0..2)
                .map(|i| make_overlay(&assets, AssetKind::Image, round * 10 + i))
                .collect();
            compositor.render_overlays(&mut renderer, &overlays, &assets, 640.0, 360.0);
        }
        // active=2 each round, pool capacity 3: never more than max(2, 3) + 2 active
        assert!(
            renderer.surface_count() <= 5,
            "surface count {} exceeds bound",
            renderer.surface_count()
        );
    }

    #[test]
    fn test_z_follows_enumeration_order() {
        let mut renderer = RetainedRenderer::new(640, 360);
        let mut compositor = OverlayCompositor::new();
        let assets = MediaStore::new();
        let first = make_overlay(&assets, AssetKind::Image, 1);
        let second = make_overlay(&assets, AssetKind::Text, 2);
        let first_id = first.clip.id;
        let second_id = second.clip.id;

        compositor.render_overlays(&mut renderer, &[first, second], &assets, 640.0, 360.0);

        let z_first = renderer
            .node(compositor.layer_for_clip(first_id).unwrap().surface)
            .unwrap()
            .placement
            .z;
        let z_second = renderer
            .node(compositor.layer_for_clip(second_id).unwrap().surface)
            .unwrap()
            .placement
            .z;
        assert_eq!(z_first, OVERLAY_Z_BASE);
        assert_eq!(z_second, OVERLAY_Z_BASE + 1);
    }

    #[test]
    fn test_image_content_not_rewritten_when_url_unchanged() {
        let mut renderer = RetainedRenderer::new(640, 360);
        let mut compositor = OverlayCompositor::new();
        let assets = MediaStore::new();
        let overlay = make_overlay(&assets, AssetKind::Image, 1);
        let clip_id = overlay.clip.id;

        compositor.render_overlays(&mut renderer, std::slice::from_ref(&overlay), &assets, 640.0, 360.0);
        let key_before = compositor
            .layer_for_clip(clip_id)
            .unwrap()
            .content_key
            .clone();
        compositor.render_overlays(&mut renderer, &[overlay], &assets, 640.0, 360.0);
        let key_after = compositor
            .layer_for_clip(clip_id)
            .unwrap()
            .content_key
            .clone();
        assert_eq!(key_before, key_after);
    }

    #[test]
    fn test_missing_asset_skipped() {
        let mut renderer = RetainedRenderer::new(640, 360);
        let mut compositor = OverlayCompositor::new();
        let assets = MediaStore::new();

        let track = Track::new(TrackKind::Video, 1, "overlay");
        let clip = Clip::new(track.id, Uuid::new_v4(), 0, 100); // asset never registered
        let active = ActiveClip::new(clip, track, 10);

        compositor.render_overlays(&mut renderer, &[active], &assets, 640.0, 360.0);
        assert_eq!(compositor.active_layer_count(), 0);
        assert_eq!(renderer.surface_count(), 0);
    }
}
