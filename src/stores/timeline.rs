//! TimelineStore - the single source of truth for clips, tracks and the playhead.
//!
//! All mutation goes through methods that bump a revision counter and emit a
//! [`TimelineEvent`]. The preview core only ever writes the playhead
//! (seek forwarding); everything else is written by the editing layer.
//!
//! Interior mutability (`Mutex` + shared `ChangeHub`) so the store can be
//! held as `Arc<TimelineStore>` by the resolver, the playback engine and the
//! preview renderer at the same time.

use std::sync::Mutex;

use indexmap::IndexMap;
use log::trace;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::{Clip, Track};

use super::events::{ChangeHub, TimelineEvent};

/// Serializable timeline state.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TimelineState {
    /// Clips keyed by id, insertion-ordered.
    pub clips: IndexMap<Uuid, Clip>,
    /// Tracks in creation order; consumers sort by `order`.
    pub tracks: Vec<Track>,
    pub playhead: i64,
    pub fps: f64,
    /// Timeline length in frames.
    pub duration: i64,
    pub zoom: f32,
}

impl TimelineState {
    fn new(fps: f64, duration: i64) -> Self {
        Self {
            clips: IndexMap::new(),
            tracks: Vec::new(),
            playhead: 0,
            fps,
            duration,
            zoom: 1.0,
        }
    }
}

/// Shared, observable timeline.
pub struct TimelineStore {
    state: Mutex<TimelineState>,
    hub: ChangeHub<TimelineEvent>,
    revision: Mutex<u64>,
}

impl TimelineStore {
    pub fn new(fps: f64, duration: i64) -> Self {
        Self {
            state: Mutex::new(TimelineState::new(fps, duration)),
            hub: ChangeHub::new(),
            revision: Mutex::new(0),
        }
    }

    /// Register a change callback. Fired synchronously on every mutation.
    pub fn subscribe<F>(&self, callback: F)
    where
        F: Fn(&TimelineEvent) + Send + Sync + 'static,
    {
        self.hub.subscribe(callback);
    }

    fn emit(&self, event: TimelineEvent) {
        {
            let mut rev = self.revision.lock().unwrap_or_else(|e| e.into_inner());
            *rev += 1;
        }
        self.hub.emit(&event);
    }

    /// Monotonic mutation counter.
    pub fn revision(&self) -> u64 {
        *self.revision.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ========== Clips ==========

    pub fn add_clip(&self, clip: Clip) {
        trace!("add_clip {} on track {}", clip.id, clip.track_id);
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clips
            .insert(clip.id, clip);
        self.emit(TimelineEvent::ClipsChanged);
    }

    pub fn remove_clip(&self, id: Uuid) -> Option<Clip> {
        let removed = self
            .state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clips
            .shift_remove(&id);
        if removed.is_some() {
            self.emit(TimelineEvent::ClipsChanged);
        }
        removed
    }

    /// Apply an edit to a clip in place. No event when the id is unknown.
    pub fn update_clip(&self, id: Uuid, edit: impl FnOnce(&mut Clip)) -> bool {
        let found = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            match state.clips.get_mut(&id) {
                Some(clip) => {
                    edit(clip);
                    true
                }
                None => false,
            }
        };
        if found {
            self.emit(TimelineEvent::ClipsChanged);
        }
        found
    }

    pub fn clip(&self, id: Uuid) -> Option<Clip> {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clips
            .get(&id)
            .cloned()
    }

    /// Snapshot of all clips in insertion order.
    pub fn clips(&self) -> Vec<Clip> {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clips
            .values()
            .cloned()
            .collect()
    }

    pub fn clip_count(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clips
            .len()
    }

    // ========== Tracks ==========

    pub fn add_track(&self, track: Track) {
        trace!("add_track {} ({:?}, order {})", track.id, track.kind, track.order);
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .tracks
            .push(track);
        self.emit(TimelineEvent::TracksChanged);
    }

    pub fn remove_track(&self, id: Uuid) -> Option<Track> {
        let removed = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            state
                .tracks
                .iter()
                .position(|t| t.id == id)
                .map(|pos| state.tracks.remove(pos))
        };
        if removed.is_some() {
            self.emit(TimelineEvent::TracksChanged);
        }
        removed
    }

    pub fn update_track(&self, id: Uuid, edit: impl FnOnce(&mut Track)) -> bool {
        let found = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            match state.tracks.iter_mut().find(|t| t.id == id) {
                Some(track) => {
                    edit(track);
                    true
                }
                None => false,
            }
        };
        if found {
            self.emit(TimelineEvent::TracksChanged);
        }
        found
    }

    pub fn track(&self, id: Uuid) -> Option<Track> {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .tracks
            .iter()
            .find(|t| t.id == id)
            .cloned()
    }

    /// Snapshot of all tracks sorted ascending by `order`.
    pub fn tracks(&self) -> Vec<Track> {
        let mut tracks: Vec<Track> = self
            .state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .tracks
            .clone();
        tracks.sort_by_key(|t| t.order);
        tracks
    }

    // ========== Playhead / settings ==========

    pub fn playhead(&self) -> i64 {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).playhead
    }

    /// Move the playhead, clamped to `[0, duration]`.
    pub fn set_playhead(&self, frame: i64) {
        let (old, new) = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            let clamped = frame.clamp(0, state.duration.max(0));
            let old = state.playhead;
            state.playhead = clamped;
            (old, clamped)
        };
        if old != new {
            self.emit(TimelineEvent::PlayheadChanged {
                old_frame: old,
                new_frame: new,
            });
        }
    }

    pub fn fps(&self) -> f64 {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).fps
    }

    pub fn set_fps(&self, fps: f64) {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).fps = fps.max(1.0);
        self.emit(TimelineEvent::SettingsChanged);
    }

    pub fn duration(&self) -> i64 {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).duration
    }

    pub fn set_duration(&self, duration: i64) {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).duration = duration.max(0);
        self.emit(TimelineEvent::SettingsChanged);
    }

    pub fn zoom(&self) -> f32 {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).zoom
    }

    pub fn set_zoom(&self, zoom: f32) {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).zoom = zoom.max(0.01);
        self.emit(TimelineEvent::SettingsChanged);
    }

    /// Full state snapshot (serialization, debugging).
    pub fn snapshot(&self) -> TimelineState {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}
