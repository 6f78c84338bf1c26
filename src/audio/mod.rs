//! Audio subsystem: buffer loading, voice-based output, reconciliation.
//!
//! [`AudioEngine`] owns the policy (what plays, at which offset, when to
//! stop); [`device::AudioDevice`] implementations own the mixing; a
//! [`buffer::BufferLoader`] owns decoding. The engine itself never touches
//! media bytes.

pub mod buffer;
pub mod device;
pub mod engine;
pub mod error;

pub use buffer::{AudioBuffer, BufferLoader, MemoryLoader, SymphoniaLoader};
pub use device::{AudioDevice, CpalDevice, OfflineDevice, VoiceId, VoiceParams};
pub use engine::{AudioEngine, AudioSourceState};
pub use error::AudioError;
