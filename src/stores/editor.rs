//! EditorStore - playback/session state read by the renderer every frame.
//!
//! The preview core reads `is_playing`, `playback_rate`, `volume`, quality
//! and preview resolution each frame; the only value it ever writes back is
//! `quality` (auto-throttle downgrade).

use std::sync::Mutex;

use log::debug;
use serde::{Deserialize, Serialize};

/// Coarse preview fidelity tier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    Draft,
    Half,
    Full,
}

impl Quality {
    /// Resolution multiplier applied to the preview target.
    pub fn factor(&self) -> f32 {
        match self {
            Quality::Draft => 0.25,
            Quality::Half => 0.5,
            Quality::Full => 1.0,
        }
    }

    /// The next tier down, if any. There is no automatic upgrade path.
    pub fn lower(&self) -> Option<Quality> {
        match self {
            Quality::Full => Some(Quality::Half),
            Quality::Half => Some(Quality::Draft),
            Quality::Draft => None,
        }
    }
}

#[derive(Clone, Debug)]
struct EditorState {
    is_playing: bool,
    playback_rate: f64,
    volume: f32,
    quality: Quality,
    /// Full-quality preview target size in pixels.
    resolution: (u32, u32),
}

/// Shared editor/session state.
pub struct EditorStore {
    state: Mutex<EditorState>,
}

impl Default for EditorStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EditorStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(EditorState {
                is_playing: false,
                playback_rate: 1.0,
                volume: 1.0,
                quality: Quality::Full,
                resolution: (1280, 720),
            }),
        }
    }

    pub fn is_playing(&self) -> bool {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).is_playing
    }

    pub fn set_playing(&self, playing: bool) {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).is_playing = playing;
    }

    pub fn playback_rate(&self) -> f64 {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .playback_rate
    }

    pub fn set_playback_rate(&self, rate: f64) {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .playback_rate = rate.clamp(0.1, 8.0);
    }

    pub fn volume(&self) -> f32 {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).volume
    }

    pub fn set_volume(&self, volume: f32) {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).volume = volume.clamp(0.0, 1.0);
    }

    pub fn quality(&self) -> Quality {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).quality
    }

    pub fn set_quality(&self, quality: Quality) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.quality != quality {
            debug!("preview quality {:?} -> {:?}", state.quality, quality);
            state.quality = quality;
        }
    }

    /// Full-quality preview target size.
    pub fn resolution(&self) -> (u32, u32) {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).resolution
    }

    pub fn set_resolution(&self, width: u32, height: u32) {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .resolution = (width.max(1), height.max(1));
    }

    /// Preview size with the current quality factor applied.
    pub fn effective_resolution(&self) -> (u32, u32) {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let f = state.quality.factor();
        (
            ((state.resolution.0 as f32 * f) as u32).max(1),
            ((state.resolution.1 as f32 * f) as u32).max(1),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quality_ladder() {
        assert_eq!(Quality::Full.lower(), Some(Quality::Half));
        assert_eq!(Quality::Half.lower(), Some(Quality::Draft));
        assert_eq!(Quality::Draft.lower(), None);
    }

    #[test]
    fn test_volume_clamped() {
        let store = EditorStore::new();
        store.set_volume(2.0);
        assert_eq!(store.volume(), 1.0);
        store.set_volume(-1.0);
        assert_eq!(store.volume(), 0.0);
    }

    #[test]
    fn test_effective_resolution() {
        let store = EditorStore::new();
        store.set_resolution(1280, 720);
        store.set_quality(Quality::Half);
        assert_eq!(store.effective_resolution(), (640, 360));
    }
}
