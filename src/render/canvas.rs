//! Immediate-mode CPU canvas backend.
//!
//! Every `present` clears the pixel target and redraws all visible surfaces
//! bottom-to-top. Image surfaces are sampled bilinearly through the inverse
//! placement transform, row-parallel with rayon. Text and video content are
//! drawn as styled stand-in fills: text rendering proper and video decode
//! belong to richer backends, the same way the retained backend leaves
//! video playback to its host surface.
//!
//! Image pixels come from an [`ImageProvider`] so the backend stays
//! decoupled from where bytes live; [`FsImageProvider`] reads files through
//! the `image` crate and caches decoded pixmaps per URL.

use std::collections::HashMap;
use std::sync::Arc;

use glam::Vec2;
use log::{debug, warn};
use rayon::prelude::*;

use super::{Placement, Renderer, SurfaceContent, SurfaceId};

/// RGBA8 pixel buffer.
#[derive(Clone, Debug)]
pub struct Pixmap {
    pub width: u32,
    pub height: u32,
    /// Interleaved RGBA, row-major.
    pub data: Vec<u8>,
}

impl Pixmap {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; (width * height * 4) as usize],
        }
    }

    pub fn fill(&mut self, rgba: [u8; 4]) {
        for px in self.data.chunks_exact_mut(4) {
            px.copy_from_slice(&rgba);
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let idx = ((y * self.width + x) * 4) as usize;
        [
            self.data[idx],
            self.data[idx + 1],
            self.data[idx + 2],
            self.data[idx + 3],
        ]
    }

    /// Bilinear sample in 0-1 range; transparent outside bounds.
    fn sample(&self, x: f32, y: f32) -> [f32; 4] {
        if x < 0.0 || y < 0.0 || x >= self.width as f32 || y >= self.height as f32 {
            return [0.0; 4];
        }
        let x0 = x.floor() as u32;
        let y0 = y.floor() as u32;
        let x1 = (x0 + 1).min(self.width - 1);
        let y1 = (y0 + 1).min(self.height - 1);
        let fx = x - x0 as f32;
        let fy = y - y0 as f32;

        let mut out = [0.0f32; 4];
        let p00 = self.pixel(x0, y0);
        let p10 = self.pixel(x1, y0);
        let p01 = self.pixel(x0, y1);
        let p11 = self.pixel(x1, y1);
        for c in 0..4 {
            let top = p00[c] as f32 * (1.0 - fx) + p10[c] as f32 * fx;
            let bottom = p01[c] as f32 * (1.0 - fx) + p11[c] as f32 * fx;
            out[c] = (top * (1.0 - fy) + bottom * fy) / 255.0;
        }
        out
    }
}

/// Source of decoded image pixels, keyed by URL.
pub trait ImageProvider: Send {
    fn load_image(&mut self, url: &str) -> anyhow::Result<Arc<Pixmap>>;
}

/// File-backed provider with a per-URL decode cache.
#[derive(Default)]
pub struct FsImageProvider {
    cache: HashMap<String, Arc<Pixmap>>,
}

impl FsImageProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ImageProvider for FsImageProvider {
    fn load_image(&mut self, url: &str) -> anyhow::Result<Arc<Pixmap>> {
        if let Some(cached) = self.cache.get(url) {
            return Ok(Arc::clone(cached));
        }
        let decoded = image::open(url)?.to_rgba8();
        let pixmap = Arc::new(Pixmap {
            width: decoded.width(),
            height: decoded.height(),
            data: decoded.into_raw(),
        });
        self.cache.insert(url.to_string(), Arc::clone(&pixmap));
        Ok(pixmap)
    }
}

#[derive(Clone, Debug)]
struct Node {
    content: SurfaceContent,
    placement: Placement,
}

impl Default for Node {
    fn default() -> Self {
        Self {
            content: SurfaceContent::Empty,
            placement: Placement {
                visible: false,
                ..Placement::default()
            },
        }
    }
}

const TEXT_FILL: [u8; 4] = [235, 235, 235, 230];
const VIDEO_FILL: [u8; 4] = [16, 16, 16, 255];
const CLEAR: [u8; 4] = [0, 0, 0, 255];

/// CPU rasterizing backend.
pub struct CanvasRenderer {
    nodes: HashMap<SurfaceId, Node>,
    next_id: SurfaceId,
    target: Pixmap,
    provider: Box<dyn ImageProvider>,
}

impl CanvasRenderer {
    pub fn new(width: u32, height: u32, provider: Box<dyn ImageProvider>) -> Self {
        Self {
            nodes: HashMap::new(),
            next_id: 1,
            target: Pixmap::new(width.max(1), height.max(1)),
            provider,
        }
    }

    /// The last presented frame.
    pub fn pixels(&self) -> &Pixmap {
        &self.target
    }
}

impl Renderer for CanvasRenderer {
    fn create_surface(&mut self) -> SurfaceId {
        let id = self.next_id;
        self.next_id += 1;
        self.nodes.insert(id, Node::default());
        id
    }

    fn destroy_surface(&mut self, id: SurfaceId) {
        self.nodes.remove(&id);
    }

    fn set_content(&mut self, id: SurfaceId, content: SurfaceContent) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.content = content;
        }
    }

    fn set_placement(&mut self, id: SurfaceId, placement: Placement) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.placement = placement;
        }
    }

    fn set_visible(&mut self, id: SurfaceId, visible: bool) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.placement.visible = visible;
        }
    }

    fn reset_surface(&mut self, id: SurfaceId) {
        if let Some(node) = self.nodes.get_mut(&id) {
            *node = Node::default();
        }
    }

    fn resize_target(&mut self, width: u32, height: u32) {
        self.target = Pixmap::new(width.max(1), height.max(1));
    }

    fn target_size(&self) -> (u32, u32) {
        (self.target.width, self.target.height)
    }

    fn present(&mut self) -> anyhow::Result<()> {
        self.target.fill(CLEAR);

        let mut order: Vec<SurfaceId> = self
            .nodes
            .iter()
            .filter(|(_, n)| n.placement.visible)
            .map(|(id, _)| *id)
            .collect();
        order.sort_by_key(|id| self.nodes[id].placement.z);

        for id in order {
            let node = self.nodes[&id].clone();
            match &node.content {
                SurfaceContent::Empty => {}
                SurfaceContent::Image { url } => match self.provider.load_image(url) {
                    Ok(pixmap) => draw_pixmap(&mut self.target, &pixmap, &node.placement),
                    Err(e) => {
                        // One bad image never takes down the frame
                        warn!("image load failed for {url}: {e:#}");
                    }
                },
                SurfaceContent::Text { text } => {
                    // Stand-in: styled fill where the text run would be
                    debug!("canvas text stand-in for {text:?}");
                    draw_fill(&mut self.target, TEXT_FILL, &node.placement);
                }
                SurfaceContent::Video { asset_id, .. } => {
                    // No decode in this backend; draw the frame slot
                    debug!("canvas video stand-in for asset {asset_id}");
                    draw_fill(&mut self.target, VIDEO_FILL, &node.placement);
                }
            }
        }
        Ok(())
    }

    fn surface_count(&self) -> usize {
        self.nodes.len()
    }
}

/// Rasterize a placed region, sourcing color from `sample` in surface-local
/// coordinates (origin at surface center).
fn draw_region(
    target: &mut Pixmap,
    placement: &Placement,
    sample: impl Fn(Vec2) -> [f32; 4] + Sync,
) {
    let half = placement.size * 0.5;
    if half.x <= 0.0 || half.y <= 0.0 {
        return;
    }
    let inverse = placement.transform.inverse();
    let opacity = placement.opacity.clamp(0.0, 1.0);
    if opacity <= 0.0 {
        return;
    }
    let width = target.width as usize;

    target
        .data
        .par_chunks_mut(width * 4)
        .enumerate()
        .for_each(|(y, row)| {
            for x in 0..width {
                let canvas_pt = Vec2::new(x as f32 + 0.5, y as f32 + 0.5);
                let local = inverse.transform_point2(canvas_pt);
                if local.x.abs() > half.x || local.y.abs() > half.y {
                    continue;
                }
                let color = sample(local);
                let alpha = color[3] * opacity;
                if alpha <= 0.0 {
                    continue;
                }
                let idx = x * 4;
                for c in 0..3 {
                    let src = color[c] * 255.0;
                    let dst = row[idx + c] as f32;
                    row[idx + c] = (src * alpha + dst * (1.0 - alpha)).clamp(0.0, 255.0) as u8;
                }
                let dst_a = row[idx + 3] as f32 / 255.0;
                row[idx + 3] = ((alpha + dst_a * (1.0 - alpha)) * 255.0).clamp(0.0, 255.0) as u8;
            }
        });
}

fn draw_pixmap(target: &mut Pixmap, src: &Pixmap, placement: &Placement) {
    let size = placement.size;
    let sx = src.width as f32 / size.x.max(1.0);
    let sy = src.height as f32 / size.y.max(1.0);
    let half = size * 0.5;
    draw_region(target, placement, |local| {
        src.sample((local.x + half.x) * sx, (local.y + half.y) * sy)
    });
}

fn draw_fill(target: &mut Pixmap, rgba: [u8; 4], placement: &Placement) {
    let color = [
        rgba[0] as f32 / 255.0,
        rgba[1] as f32 / 255.0,
        rgba[2] as f32 / 255.0,
        rgba[3] as f32 / 255.0,
    ];
    draw_region(target, placement, move |_| color);
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Affine2;

    /// Provider returning a fixed 2x2 pixmap for any URL.
    struct SolidProvider {
        rgba: [u8; 4],
    }

    impl ImageProvider for SolidProvider {
        fn load_image(&mut self, _url: &str) -> anyhow::Result<Arc<Pixmap>> {
            let mut pixmap = Pixmap::new(2, 2);
            pixmap.fill(self.rgba);
            Ok(Arc::new(pixmap))
        }
    }

    struct FailingProvider;

    impl ImageProvider for FailingProvider {
        fn load_image(&mut self, url: &str) -> anyhow::Result<Arc<Pixmap>> {
            anyhow::bail!("no pixels for {url}")
        }
    }

    fn centered_placement(canvas: f32, size: f32) -> Placement {
        Placement {
            transform: Affine2::from_translation(Vec2::splat(canvas / 2.0)),
            size: Vec2::splat(size),
            ..Placement::default()
        }
    }

    #[test]
    fn test_image_drawn_at_center() {
        let mut renderer = CanvasRenderer::new(
            16,
            16,
            Box::new(SolidProvider {
                rgba: [255, 0, 0, 255],
            }),
        );
        let id = renderer.create_surface();
        renderer.set_content(
            id,
            SurfaceContent::Image {
                url: "red.png".into(),
            },
        );
        renderer.set_placement(id, centered_placement(16.0, 8.0));
        renderer.present().unwrap();

        assert_eq!(renderer.pixels().pixel(8, 8)[0], 255); // inside: red
        assert_eq!(renderer.pixels().pixel(1, 1), CLEAR); // outside: clear
    }

    #[test]
    fn test_failed_image_does_not_fail_present() {
        let mut renderer = CanvasRenderer::new(8, 8, Box::new(FailingProvider));
        let id = renderer.create_surface();
        renderer.set_content(
            id,
            SurfaceContent::Image {
                url: "gone.png".into(),
            },
        );
        renderer.set_placement(id, centered_placement(8.0, 4.0));
        assert!(renderer.present().is_ok());
        assert_eq!(renderer.pixels().pixel(4, 4), CLEAR);
    }

    #[test]
    fn test_z_order_paints_topmost_last() {
        let mut renderer = CanvasRenderer::new(
            8,
            8,
            Box::new(SolidProvider {
                rgba: [0, 255, 0, 255],
            }),
        );
        let below = renderer.create_surface();
        renderer.set_content(
            below,
            SurfaceContent::Image {
                url: "green.png".into(),
            },
        );
        renderer.set_placement(
            below,
            Placement {
                z: 1,
                ..centered_placement(8.0, 8.0)
            },
        );

        let above = renderer.create_surface();
        renderer.set_content(
            above,
            SurfaceContent::Video {
                asset_id: uuid::Uuid::new_v4(),
                time_secs: 0.0,
            },
        );
        renderer.set_placement(
            above,
            Placement {
                z: 2,
                ..centered_placement(8.0, 8.0)
            },
        );

        renderer.present().unwrap();
        // The video stand-in fill (z=2) covers the green image
        assert_eq!(renderer.pixels().pixel(4, 4), VIDEO_FILL);
    }

    #[test]
    fn test_opacity_blends() {
        let mut renderer = CanvasRenderer::new(
            8,
            8,
            Box::new(SolidProvider {
                rgba: [255, 255, 255, 255],
            }),
        );
        let id = renderer.create_surface();
        renderer.set_content(
            id,
            SurfaceContent::Image {
                url: "white.png".into(),
            },
        );
        renderer.set_placement(
            id,
            Placement {
                opacity: 0.5,
                ..centered_placement(8.0, 8.0)
            },
        );
        renderer.present().unwrap();
        let px = renderer.pixels().pixel(4, 4);
        assert!(px[0] > 100 && px[0] < 150, "expected ~half white, got {px:?}");
    }
}
