//! Store layer - the data sources the preview core reads from.
//!
//! Three stores mirror the editing application's state slices:
//! - [`TimelineStore`] - clips, tracks, playhead, fps, duration, zoom
//! - [`EditorStore`] - playback/session state and preview quality
//! - [`MediaStore`] - read-only asset lookup
//!
//! The preview core reads all three every frame and writes exactly two
//! things back: the playhead (seek forwarding) and the quality tier
//! (auto-throttle).

pub mod editor;
pub mod events;
pub mod media;
pub mod timeline;

pub use editor::{EditorStore, Quality};
pub use events::{ChangeHub, TimelineEvent};
pub use media::MediaStore;
pub use timeline::{TimelineState, TimelineStore};
