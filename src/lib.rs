//! PREVU - real-time preview compositing core for a timeline video editor.
//!
//! Given a mutable timeline of clips across typed tracks, this crate
//! resolves which clips are active at any queried frame, schedules audio
//! playback against the active set, and composites overlay content above a
//! primary video surface using bounded pools of reusable render surfaces -
//! with a frame-rate-adaptive quality loop on top.
//!
//! Everything runs cooperatively on the caller's thread; the only helper
//! threads are background decode workers and the realtime audio callback,
//! both communicating through channels.

// Core engine (resolver, preview orchestration, playback clock, pooling)
pub mod core;

// Data model, stores, rendering backends, audio
pub mod audio;
pub mod entities;
pub mod render;
pub mod stores;

// Re-export commonly used types from core
pub use crate::core::metrics::PerformanceMetrics;
pub use crate::core::playback::{PlaybackEngine, PlaybackState};
pub use crate::core::pool::KeyedPool;
pub use crate::core::preview::PreviewRenderer;
pub use crate::core::resolver::ClipResolver;

// Re-export the data model and stores
pub use crate::audio::{AudioBuffer, AudioEngine};
pub use crate::entities::{ActiveClip, AssetKind, Clip, MediaAsset, Track, TrackKind};
pub use crate::render::{CanvasRenderer, OverlayCompositor, Renderer, RetainedRenderer};
pub use crate::stores::{EditorStore, MediaStore, Quality, TimelineStore};
