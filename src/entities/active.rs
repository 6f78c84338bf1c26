//! ActiveClip - a resolved (clip, track) pair at a specific frame.

use serde::{Deserialize, Serialize};

use super::{Clip, Track};

/// A clip resolved as active at some queried frame.
///
/// Carries the owning track (already checked visible) and the computed
/// source-relative `local_time` so downstream consumers never re-derive it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActiveClip {
    pub clip: Clip,
    pub track: Track,
    /// `clip.in_point + (frame - clip.start_time)`, in source frames.
    pub local_time: i64,
}

impl ActiveClip {
    pub fn new(clip: Clip, track: Track, frame: i64) -> Self {
        let local_time = clip.local_time(frame);
        Self {
            clip,
            track,
            local_time,
        }
    }

    /// The timeline frame this resolution was made for.
    pub fn frame(&self) -> i64 {
        self.clip.start_time + (self.local_time - self.clip.in_point)
    }

    /// Local time converted to source seconds at the given timeline fps.
    pub fn local_secs(&self, fps: f64) -> f64 {
        if fps <= 0.0 {
            return 0.0;
        }
        self.local_time as f64 / fps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::TrackKind;
    use uuid::Uuid;

    #[test]
    fn test_active_clip_round_trip() {
        let track = Track::new(TrackKind::Video, 0, "V1");
        let mut clip = Clip::new(track.id, Uuid::new_v4(), 10, 50);
        clip.in_point = 5;

        let active = ActiveClip::new(clip, track, 22);
        assert_eq!(active.local_time, 17); // 5 + (22 - 10)
        assert_eq!(active.frame(), 22);
        assert!((active.local_secs(30.0) - 17.0 / 30.0).abs() < 1e-9);
    }
}
