//! 2D transform math for clip placement.
//!
//! Pure functions from clip properties to an affine placement. Transform
//! order matches the compositing contract: translate (normalized position
//! scaled by the container), then scale, then rotate - composed so rotation
//! applies to the surface first.
//!
//! Rotation is stored in degrees, clockwise-positive in screen space
//! (Y-down), which is the same direction glam's `from_angle` turns when the
//! Y axis points down.

use glam::{Affine2, Vec2};

use crate::entities::{Clip, MediaAsset};

use super::Placement;

/// Build the surface-local -> target-pixels transform for a clip.
pub fn clip_transform(clip: &Clip, container: Vec2) -> Affine2 {
    let translation = Vec2::new(
        clip.position[0] * container.x,
        clip.position[1] * container.y,
    );
    let scale = Vec2::new(clip.scale[0], clip.scale[1]);
    let rotation = clip.rotation.to_radians();

    Affine2::from_translation(translation)
        * Affine2::from_scale(scale)
        * Affine2::from_angle(rotation)
}

/// Surface size: intrinsic asset dimensions scaled by the clip, falling
/// back to the container when the asset has no known dimensions.
pub fn surface_size(clip: &Clip, asset: Option<&MediaAsset>, container: Vec2) -> Vec2 {
    match asset.and_then(|a| a.dimensions()) {
        Some((w, h)) => Vec2::new(w as f32 * clip.scale[0], h as f32 * clip.scale[1]),
        None => container,
    }
}

/// Full placement for a clip at a frame (z left at 0 for the caller).
pub fn apply_transforms(
    clip: &Clip,
    frame: i64,
    asset: Option<&MediaAsset>,
    container: Vec2,
) -> Placement {
    Placement {
        transform: clip_transform(clip, container),
        opacity: clip.effective_opacity(frame),
        z: 0,
        size: surface_size(clip, asset, container),
        visible: true,
    }
}
