//! Render capability - the seam between compositing logic and pixels.
//!
//! The active-set/recycling algorithm must not care whether surfaces are
//! retained tree nodes or repainted every frame, so the compositor and the
//! video pool talk to a small [`Renderer`] trait:
//!
//! - [`retained::RetainedRenderer`] keeps a node tree (content + placement
//!   per surface) and presents by doing nothing - the tree IS the output.
//!   Fully inspectable, which also makes it the test backend.
//! - [`canvas::CanvasRenderer`] is immediate-mode: every present clears a
//!   pixel target and redraws all visible surfaces in z order on the CPU.
//!
//! Surfaces are cheap handles. Content and placement are set separately so
//! a recycled surface can keep its expensive content (an already-loaded
//! image) while being re-placed.

pub mod canvas;
pub mod compositor;
pub mod retained;
pub mod transform;
pub mod video_pool;

use glam::{Affine2, Vec2};
use uuid::Uuid;

pub use canvas::{CanvasRenderer, FsImageProvider, ImageProvider, Pixmap};
pub use compositor::{LayerNode, OverlayCompositor, OVERLAY_Z_BASE};
pub use retained::RetainedRenderer;
pub use video_pool::{VideoSurface, VideoSurfacePool};

/// Opaque surface handle issued by a [`Renderer`].
pub type SurfaceId = u64;

/// What a surface shows.
#[derive(Clone, Debug, PartialEq)]
pub enum SurfaceContent {
    Empty,
    /// Still image, identified by source URL.
    Image { url: String },
    /// Styled text run.
    Text { text: String },
    /// A frame of video at a source-relative time. Backends that cannot
    /// decode render a stand-in.
    Video { asset_id: Uuid, time_secs: f64 },
}

/// Where and how a surface is drawn.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Placement {
    /// Maps surface-local space (origin at surface center) to target pixels.
    pub transform: Affine2,
    pub opacity: f32,
    /// Stacking order; higher draws on top.
    pub z: i32,
    /// Surface size in target pixels before the transform's scale.
    pub size: Vec2,
    pub visible: bool,
}

impl Default for Placement {
    fn default() -> Self {
        Self {
            transform: Affine2::IDENTITY,
            opacity: 1.0,
            z: 0,
            size: Vec2::ZERO,
            visible: true,
        }
    }
}

/// Minimal rendering backend: allocate surfaces, give them content and
/// placement, present.
pub trait Renderer {
    fn create_surface(&mut self) -> SurfaceId;

    /// Physically destroy a surface. Unknown ids are ignored.
    fn destroy_surface(&mut self, id: SurfaceId);

    fn set_content(&mut self, id: SurfaceId, content: SurfaceContent);

    fn set_placement(&mut self, id: SurfaceId, placement: Placement);

    fn set_visible(&mut self, id: SurfaceId, visible: bool);

    /// Clear content and restore default placement, hidden. Called when a
    /// surface is recycled into a pool.
    fn reset_surface(&mut self, id: SurfaceId);

    fn resize_target(&mut self, width: u32, height: u32);

    fn target_size(&self) -> (u32, u32);

    /// Flush the current frame. Retained backends are done already;
    /// immediate backends rasterize here.
    fn present(&mut self) -> anyhow::Result<()>;

    /// Live surface count (active + recycled but not destroyed).
    fn surface_count(&self) -> usize;
}
