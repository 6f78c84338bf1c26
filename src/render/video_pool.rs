//! Pooled video surfaces for primary playback.
//!
//! One reusable surface per video asset, recycled through the same
//! [`KeyedPool`] the overlay compositor uses. A surface is "seeked" by
//! rewriting its `Video` content with the requested source time; actual
//! decode is the backend's concern, never this pool's.

use log::debug;
use uuid::Uuid;

use crate::core::pool::{KeyedPool, Released};
use crate::entities::MediaAsset;

use super::{Renderer, SurfaceContent, SurfaceId};

/// Default bound on recycled video surfaces.
pub const DEFAULT_VIDEO_SURFACES: usize = 8;

/// Seek tolerance below which content is not rewritten.
const SEEK_EPSILON: f64 = 1e-4;

/// One pooled, seekable video surface.
#[derive(Debug)]
pub struct VideoSurface {
    pub surface: SurfaceId,
    pub asset_id: Uuid,
    pub time_secs: f64,
    pub playing: bool,
    pub rate: f64,
}

/// Bounded pool of video surfaces keyed by asset id.
pub struct VideoSurfacePool {
    pool: KeyedPool<Uuid, VideoSurface>,
}

impl VideoSurfacePool {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_VIDEO_SURFACES)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            pool: KeyedPool::new(capacity),
        }
    }

    /// Get a ready, seeked surface for the asset.
    ///
    /// Reuses the asset's existing surface when present; content is only
    /// rewritten when the requested time actually moved.
    pub fn get_surface(
        &mut self,
        renderer: &mut dyn Renderer,
        asset: &MediaAsset,
        time_secs: f64,
        playing: bool,
    ) -> SurfaceId {
        let asset_id = asset.id;
        let (entry, _how) = self.pool.acquire(
            asset_id,
            |entry| {
                entry.time_secs = f64::NEG_INFINITY; // force a content rewrite
            },
            || VideoSurface {
                surface: renderer.create_surface(),
                asset_id,
                time_secs: f64::NEG_INFINITY,
                playing: false,
                rate: 1.0,
            },
        );
        entry.asset_id = asset_id;
        let surface = entry.surface;
        let needs_seek = (entry.time_secs - time_secs).abs() > SEEK_EPSILON;
        entry.time_secs = time_secs;
        entry.playing = playing;

        if needs_seek {
            renderer.set_content(
                surface,
                SurfaceContent::Video {
                    asset_id,
                    time_secs,
                },
            );
        }
        surface
    }

    /// All (asset, surface) pairs currently active, for visibility toggling.
    pub fn all_surfaces(&self) -> Vec<(Uuid, SurfaceId)> {
        self.pool
            .active_keys()
            .into_iter()
            .filter_map(|id| self.pool.get(id).map(|e| (id, e.surface)))
            .collect()
    }

    /// Keep a surface advancing or paused at the playback rate.
    pub fn sync_to_timeline(&mut self, asset_id: Uuid, playing: bool, rate: f64) {
        if let Some(entry) = self.pool.get_mut(asset_id) {
            entry.playing = playing;
            entry.rate = rate;
        }
    }

    /// Release the surface for an asset (recycle or destroy per capacity).
    pub fn release(&mut self, renderer: &mut dyn Renderer, asset_id: Uuid) {
        let released = self.pool.release(asset_id, |entry| {
            renderer.reset_surface(entry.surface);
        });
        if let Released::Evicted(entry) = released {
            debug!("video pool full, destroying surface {}", entry.surface);
            renderer.destroy_surface(entry.surface);
        }
    }

    pub fn active_count(&self) -> usize {
        self.pool.active_len()
    }

    pub fn surface_for(&self, asset_id: Uuid) -> Option<&VideoSurface> {
        self.pool.get(asset_id)
    }

    pub fn dispose(&mut self, renderer: &mut dyn Renderer) {
        for entry in self.pool.drain_all() {
            renderer.destroy_surface(entry.surface);
        }
    }
}

impl Default for VideoSurfacePool {
    fn default() -> Self {
        Self::new()
    }
}
