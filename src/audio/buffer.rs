//! Decoded audio buffers and the loader seam.
//!
//! The engine never decodes media itself - it asks a [`BufferLoader`] for a
//! fully decoded, interleaved f32 buffer and caches the result per asset.
//! [`SymphoniaLoader`] is the file-backed production loader;
//! [`MemoryLoader`] serves preloaded buffers for offline use and tests.

use std::collections::HashMap;
use std::fs::File;
use std::path::Path;
use std::sync::{Arc, Mutex};

use log::debug;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::entities::MediaAsset;

use super::error::AudioError;

/// Fully decoded, interleaved f32 audio.
#[derive(Clone, Debug)]
pub struct AudioBuffer {
    pub sample_rate: u32,
    pub channels: u16,
    /// Interleaved samples, `frames * channels` long.
    pub samples: Arc<Vec<f32>>,
}

impl AudioBuffer {
    pub fn new(sample_rate: u32, channels: u16, samples: Vec<f32>) -> Self {
        Self {
            sample_rate,
            channels,
            samples: Arc::new(samples),
        }
    }

    /// Number of audio frames (samples per channel).
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels as usize
        }
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            0.0
        } else {
            self.frames() as f64 / self.sample_rate as f64
        }
    }
}

/// Source of decoded buffers, keyed by asset.
pub trait BufferLoader: Send + Sync {
    fn load(&self, asset: &MediaAsset) -> Result<AudioBuffer, AudioError>;
}

/// File-backed loader using Symphonia (AAC, MP3, WAV, MP4 audio).
#[derive(Default)]
pub struct SymphoniaLoader;

impl SymphoniaLoader {
    pub fn new() -> Self {
        Self
    }

    fn decode_file(path: &Path) -> Result<AudioBuffer, AudioError> {
        let file =
            File::open(path).map_err(|e| AudioError::FileOpen(format!("{path:?}: {e}")))?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions {
                    enable_gapless: true,
                    ..Default::default()
                },
                &MetadataOptions::default(),
            )
            .map_err(|e| AudioError::UnsupportedFormat(format!("{e}")))?;
        let mut reader = probed.format;

        let track = reader
            .tracks()
            .iter()
            .find(|t| {
                t.codec_params.codec != symphonia::core::codecs::CODEC_TYPE_NULL
                    && t.codec_params.channels.is_some()
            })
            .ok_or(AudioError::NoAudioTrack)?;
        let track_id = track.id;
        let codec_params = track.codec_params.clone();

        let sample_rate = codec_params
            .sample_rate
            .ok_or_else(|| AudioError::Decode("no sample rate in codec params".to_string()))?;
        let channels = codec_params
            .channels
            .map(|c| c.count() as u16)
            .ok_or_else(|| AudioError::Decode("no channel info in codec params".to_string()))?;

        let mut decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|e| AudioError::UnsupportedFormat(format!("codec init failed: {e}")))?;

        let mut samples: Vec<f32> = Vec::new();
        loop {
            let packet = match reader.next_packet() {
                Ok(p) => p,
                Err(symphonia::core::errors::Error::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(e) => return Err(AudioError::Decode(format!("{e}"))),
            };
            if packet.track_id() != track_id {
                continue;
            }
            let decoded = match decoder.decode(&packet) {
                Ok(d) => d,
                Err(symphonia::core::errors::Error::DecodeError(msg)) => {
                    debug!("skipping corrupted audio packet: {msg}");
                    continue;
                }
                Err(e) => return Err(AudioError::Decode(format!("{e}"))),
            };
            let spec = *decoded.spec();
            let frames = decoded.frames();
            if frames == 0 {
                continue;
            }
            let mut buf = SampleBuffer::<f32>::new(frames as u64, spec);
            buf.copy_interleaved_ref(decoded);
            samples.extend_from_slice(buf.samples());
        }

        debug!(
            "decoded {path:?}: {} frames at {sample_rate}Hz x{channels}",
            samples.len() / channels.max(1) as usize
        );
        Ok(AudioBuffer::new(sample_rate, channels, samples))
    }
}

impl BufferLoader for SymphoniaLoader {
    fn load(&self, asset: &MediaAsset) -> Result<AudioBuffer, AudioError> {
        Self::decode_file(Path::new(&asset.url))
    }
}

/// In-memory loader for offline rendering and tests.
#[derive(Default)]
pub struct MemoryLoader {
    buffers: Mutex<HashMap<String, AudioBuffer>>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a buffer under a URL.
    pub fn insert(&self, url: impl Into<String>, buffer: AudioBuffer) {
        self.buffers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(url.into(), buffer);
    }
}

impl BufferLoader for MemoryLoader {
    fn load(&self, asset: &MediaAsset) -> Result<AudioBuffer, AudioError> {
        self.buffers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&asset.url)
            .cloned()
            .ok_or_else(|| AudioError::FileOpen(format!("no buffer registered for {}", asset.url)))
    }
}
