//! Core engine: resolution, orchestration, playback clock, pooling.

pub mod metrics;
pub mod playback;
pub mod pool;
pub mod preview;
pub mod resolver;
pub mod workers;

pub use metrics::PerformanceMetrics;
pub use playback::{PlaybackEngine, PlaybackState, Tick};
pub use pool::{Acquired, KeyedPool, Released};
pub use preview::PreviewRenderer;
pub use resolver::{CacheStats, ClipInterval, ClipResolver};
pub use workers::{Epoch, Workers};
