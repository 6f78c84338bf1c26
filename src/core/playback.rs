//! PlaybackEngine - the virtual clock driving preview playback.
//!
//! # Timing Model
//!
//! FPS-based, not wall-clock-locked: each frame has a fixed duration of
//! `1 / (fps * rate)` seconds and `tick()` advances the playhead by however
//! many whole frame durations have elapsed since the previous tick. When
//! the host tick runs slower than the frame rate, the clock skips frames
//! rather than slowing playback - the skip count is surfaced so the
//! renderer can record dropped frames.
//!
//! `tick()` is meant to be called from the host's animation-frame loop.
//! State (is_playing, playback rate) lives in the editor store; the current
//! position lives in the timeline store's playhead. The engine owns only
//! the tick timing.

use std::sync::Arc;
use std::time::Instant;

use log::trace;

use crate::stores::{EditorStore, TimelineStore};

/// Coarse transport state reported through `on_state_change`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaybackState {
    Playing,
    Paused,
}

/// Result of one clock tick that advanced the playhead.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Tick {
    /// The new playhead frame.
    pub frame: i64,
    /// Frames skipped over by this tick (0 when keeping up).
    pub skipped: u64,
}

type FrameCallback = Box<dyn FnMut(i64) + Send>;
type StateCallback = Box<dyn FnMut(PlaybackState) + Send>;

/// Frame-ticking virtual clock.
pub struct PlaybackEngine {
    timeline: Arc<TimelineStore>,
    editor: Arc<EditorStore>,
    last_tick: Option<Instant>,
    /// Wrap to frame 0 at the timeline end instead of stopping.
    loop_enabled: bool,
    on_frame: Option<FrameCallback>,
    on_state: Option<StateCallback>,
}

impl PlaybackEngine {
    pub fn new(timeline: Arc<TimelineStore>, editor: Arc<EditorStore>) -> Self {
        Self {
            timeline,
            editor,
            last_tick: None,
            loop_enabled: false,
            on_frame: None,
            on_state: None,
        }
    }

    /// Callback invoked with the new frame on every advance.
    pub fn set_on_frame_update(&mut self, callback: impl FnMut(i64) + Send + 'static) {
        self.on_frame = Some(Box::new(callback));
    }

    /// Callback invoked on start/stop transitions.
    pub fn set_on_state_change(&mut self, callback: impl FnMut(PlaybackState) + Send + 'static) {
        self.on_state = Some(Box::new(callback));
    }

    pub fn set_loop_enabled(&mut self, enabled: bool) {
        self.loop_enabled = enabled;
    }

    pub fn loop_enabled(&self) -> bool {
        self.loop_enabled
    }

    pub fn is_playing(&self) -> bool {
        self.editor.is_playing()
    }

    pub fn start(&mut self) {
        if self.editor.is_playing() {
            return;
        }
        self.editor.set_playing(true);
        self.last_tick = Some(Instant::now());
        trace!("playback started at frame {}", self.timeline.playhead());
        self.emit_state(PlaybackState::Playing);
    }

    pub fn stop(&mut self) {
        if !self.editor.is_playing() {
            return;
        }
        self.editor.set_playing(false);
        self.last_tick = None;
        trace!("playback stopped at frame {}", self.timeline.playhead());
        self.emit_state(PlaybackState::Paused);
    }

    /// Move the playhead without changing transport state. The tick timer
    /// restarts so the next advance is measured from now.
    pub fn seek(&mut self, frame: i64) {
        self.timeline.set_playhead(frame);
        if self.last_tick.is_some() {
            self.last_tick = Some(Instant::now());
        }
    }

    /// Advance the clock. Returns the tick result when the playhead moved.
    pub fn tick(&mut self) -> Option<Tick> {
        if !self.editor.is_playing() {
            return None;
        }

        let now = Instant::now();
        let Some(last) = self.last_tick else {
            self.last_tick = Some(now);
            return None;
        };

        let fps = self.timeline.fps();
        let rate = self.editor.playback_rate();
        let frame_duration = 1.0 / (fps * rate).max(f64::EPSILON);
        let elapsed = now.duration_since(last).as_secs_f64();
        if elapsed < frame_duration {
            return None;
        }

        let advance = (elapsed / frame_duration).floor().max(1.0) as i64;
        self.last_tick = Some(now);

        let current = self.timeline.playhead();
        let duration = self.timeline.duration();
        let target = current + advance;

        let frame = if duration > 0 && target >= duration {
            if self.loop_enabled {
                trace!("playback loop: {current} -> 0");
                target % duration
            } else {
                // Land on the last frame and stop
                self.editor.set_playing(false);
                self.last_tick = None;
                self.emit_state(PlaybackState::Paused);
                duration - 1
            }
        } else {
            target
        };

        self.timeline.set_playhead(frame);
        if let Some(cb) = self.on_frame.as_mut() {
            cb(frame);
        }

        Some(Tick {
            frame,
            skipped: (advance - 1).max(0) as u64,
        })
    }

    fn emit_state(&mut self, state: PlaybackState) {
        if let Some(cb) = self.on_state.as_mut() {
            cb(state);
        }
    }
}
