//! Render-loop performance metrics.
//!
//! Rolling fps over a 1-second window plus last render duration and a
//! cumulative dropped-frame counter. Feeds the auto-quality check in the
//! render loop.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

const FPS_WINDOW: Duration = Duration::from_secs(1);

/// Rolling render statistics.
#[derive(Debug)]
pub struct PerformanceMetrics {
    frame_times: VecDeque<Instant>,
    last_render: Duration,
    dropped_frames: u64,
}

impl Default for PerformanceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PerformanceMetrics {
    pub fn new() -> Self {
        Self {
            frame_times: VecDeque::new(),
            last_render: Duration::ZERO,
            dropped_frames: 0,
        }
    }

    /// Record a completed render and its duration.
    pub fn record_frame(&mut self, render_duration: Duration) {
        let now = Instant::now();
        self.frame_times.push_back(now);
        self.last_render = render_duration;
        self.trim(now);
    }

    /// Record frames the playback clock skipped over.
    pub fn record_dropped(&mut self, count: u64) {
        self.dropped_frames += count;
    }

    /// Frames rendered in the last second.
    pub fn fps(&mut self) -> f64 {
        self.trim(Instant::now());
        self.frame_times.len() as f64 / FPS_WINDOW.as_secs_f64()
    }

    pub fn last_render_duration(&self) -> Duration {
        self.last_render
    }

    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames
    }

    /// Whether the window holds enough samples for the fps value to mean
    /// anything (avoids a spurious downgrade right after startup or seek).
    pub fn has_full_window(&self) -> bool {
        match (self.frame_times.front(), self.frame_times.back()) {
            (Some(first), Some(last)) => last.duration_since(*first) >= FPS_WINDOW / 2,
            _ => false,
        }
    }

    pub fn reset(&mut self) {
        self.frame_times.clear();
        self.last_render = Duration::ZERO;
    }

    fn trim(&mut self, now: Instant) {
        while let Some(front) = self.frame_times.front() {
            if now.duration_since(*front) > FPS_WINDOW {
                self.frame_times.pop_front();
            } else {
                break;
            }
        }
    }
}
