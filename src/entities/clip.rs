//! Clip - a placed reference to a media asset on a track.
//!
//! # Coordinate Systems
//!
//! - `start_time` - where the clip starts in TIMELINE frames (absolute position)
//! - `duration` - clip length in timeline frames
//! - `in_point` / `out_point` - source-relative trim points in frames
//!
//! A clip is active at frame F iff `F ∈ [start_time, start_time + duration)`.
//! The half-open end matters: a 90-frame clip starting at 0 covers frames
//! 0..=89 and is gone at 90.
//!
//! Local time maps a timeline frame into source frames after trim:
//! `local_time(F) = in_point + (F - start_time)`.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Transition styles evaluated by the preview as an opacity ramp.
///
/// The preview core treats both kinds identically (linear opacity ramp over
/// the transition window); export-side rendering may differentiate them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    Fade,
    Dissolve,
}

/// Transition attached to a clip edge (in or out).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub kind: TransitionKind,
    /// Transition window length in timeline frames.
    pub duration: i64,
}

/// Single clip placement on the timeline.
///
/// References a [`MediaAsset`](super::MediaAsset) by id and a parent
/// [`Track`](super::Track) by id. Visual properties (opacity, scale,
/// position, rotation) are applied by the compositor every frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Clip {
    /// Stable identifier for this placement.
    pub id: Uuid,
    /// Owning track.
    pub track_id: Uuid,
    /// Referenced media asset.
    pub asset_id: Uuid,
    /// Timeline start frame.
    pub start_time: i64,
    /// Length in timeline frames.
    pub duration: i64,
    /// Source-relative trim-in, frames.
    pub in_point: i64,
    /// Source-relative trim-out, frames.
    pub out_point: i64,
    /// Base opacity, 0.0..=1.0.
    pub opacity: f32,
    /// 2D scale factors.
    pub scale: [f32; 2],
    /// Normalized position in the container, 0.0..=1.0 per axis.
    pub position: [f32; 2],
    /// Rotation in degrees, clockwise-positive.
    pub rotation: f32,
    #[serde(default)]
    pub transition_in: Option<Transition>,
    #[serde(default)]
    pub transition_out: Option<Transition>,
}

impl Clip {
    /// Create a clip with neutral visual properties.
    pub fn new(track_id: Uuid, asset_id: Uuid, start_time: i64, duration: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            track_id,
            asset_id,
            start_time,
            duration,
            in_point: 0,
            out_point: 0,
            opacity: 1.0,
            scale: [1.0, 1.0],
            position: [0.5, 0.5],
            rotation: 0.0,
            transition_in: None,
            transition_out: None,
        }
    }

    /// Exclusive end frame on the timeline.
    pub fn end_time(&self) -> i64 {
        self.start_time + self.duration
    }

    /// Half-open interval membership: `frame ∈ [start_time, start_time + duration)`.
    pub fn is_active_at(&self, frame: i64) -> bool {
        frame >= self.start_time && frame < self.end_time()
    }

    /// Source-relative frame for a timeline frame.
    ///
    /// Only meaningful while the clip is active; callers resolve activity
    /// first via [`is_active_at`](Self::is_active_at).
    pub fn local_time(&self, frame: i64) -> i64 {
        self.in_point + (frame - self.start_time)
    }

    /// Opacity at `frame` with transition ramps applied.
    ///
    /// Linear ramp 0→1 over the in-transition window and 1→0 over the
    /// out-transition window, multiplied into the base opacity.
    pub fn effective_opacity(&self, frame: i64) -> f32 {
        let mut opacity = self.opacity;

        if let Some(t) = self.transition_in
            && t.duration > 0
        {
            let elapsed = frame - self.start_time;
            if elapsed < t.duration {
                opacity *= (elapsed as f32 / t.duration as f32).clamp(0.0, 1.0);
            }
        }

        if let Some(t) = self.transition_out
            && t.duration > 0
        {
            let remaining = self.end_time() - frame;
            if remaining <= t.duration {
                opacity *= (remaining as f32 / t.duration as f32).clamp(0.0, 1.0);
            }
        }

        opacity.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_clip(start: i64, duration: i64) -> Clip {
        Clip::new(Uuid::new_v4(), Uuid::new_v4(), start, duration)
    }

    #[test]
    fn test_half_open_interval() {
        let clip = make_clip(0, 90);
        assert!(clip.is_active_at(0));
        assert!(clip.is_active_at(45));
        assert!(clip.is_active_at(89));
        assert!(!clip.is_active_at(90)); // exclusive end
        assert!(!clip.is_active_at(-1));
    }

    #[test]
    fn test_local_time() {
        let mut clip = make_clip(30, 60);
        clip.in_point = 12;
        assert_eq!(clip.local_time(30), 12);
        assert_eq!(clip.local_time(45), 27);
        assert_eq!(clip.local_time(89), 71);
    }

    #[test]
    fn test_effective_opacity_ramps() {
        let mut clip = make_clip(0, 100);
        clip.transition_in = Some(Transition {
            kind: TransitionKind::Fade,
            duration: 10,
        });
        clip.transition_out = Some(Transition {
            kind: TransitionKind::Dissolve,
            duration: 10,
        });

        assert_eq!(clip.effective_opacity(0), 0.0);
        assert!((clip.effective_opacity(5) - 0.5).abs() < 1e-6);
        assert_eq!(clip.effective_opacity(50), 1.0);
        // Out ramp: 10 frames remaining at frame 90
        assert!((clip.effective_opacity(95) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_effective_opacity_respects_base() {
        let mut clip = make_clip(0, 100);
        clip.opacity = 0.5;
        assert_eq!(clip.effective_opacity(50), 0.5);
    }
}
