//! Entities module - the timeline data model.
//!
//! Plain serde-friendly structs with stable `Uuid` ids. Everything here is
//! pure data: activity resolution, compositing and audio scheduling live in
//! `core`, `render` and `audio`.

pub mod active;
pub mod asset;
pub mod clip;
pub mod track;

pub use active::ActiveClip;
pub use asset::{AssetKind, MediaAsset};
pub use clip::{Clip, Transition, TransitionKind};
pub use track::{Track, TrackKind};
