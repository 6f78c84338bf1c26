//! Audio output seam: voice-based playback devices.
//!
//! The engine schedules *voices* - a decoded buffer playing from an offset
//! at a rate with a gain - and the device mixes all live voices into the
//! output. Two implementations:
//!
//! - [`CpalDevice`] - realtime output. The cpal callback locks a
//!   `parking_lot` mutex around the mix state and must never allocate;
//!   all allocation happens on the control side when voices start.
//! - [`OfflineDevice`] - no thread, no hardware. The caller pulls mixed
//!   samples explicitly, which also makes scheduling behavior observable
//!   in tests.
//!
//! Stopping an unknown or already-finished voice is a no-op by contract:
//! natural end and explicit stop race constantly and double-stop must
//! never be an error.

use std::collections::HashMap;
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, Stream, StreamConfig};
use log::{debug, error, info, trace};
use parking_lot::Mutex;

use super::buffer::AudioBuffer;
use super::error::AudioError;

/// Handle to a scheduled voice.
pub type VoiceId = u64;

/// Everything needed to start one voice.
#[derive(Clone, Debug)]
pub struct VoiceParams {
    pub buffer: Arc<AudioBuffer>,
    /// Source-relative start offset in seconds (non-negative).
    pub offset_secs: f64,
    pub rate: f64,
    pub gain: f32,
}

/// Playback device abstraction.
pub trait AudioDevice {
    fn start_voice(&mut self, params: VoiceParams) -> Result<VoiceId, AudioError>;

    /// Stop and remove a voice. Unknown ids are ignored.
    fn stop_voice(&mut self, id: VoiceId);

    fn set_voice_gain(&mut self, id: VoiceId, gain: f32);

    /// Change a voice's rate going forward. Elapsed-offset drift from rate
    /// changes mid-flight is not corrected.
    fn set_voice_rate(&mut self, id: VoiceId, rate: f64);

    fn set_master_gain(&mut self, gain: f32);

    fn master_gain(&self) -> f32;

    /// Voices that reached their natural end since the last call. Each id
    /// is reported exactly once and the voice is removed.
    fn finished_voices(&mut self) -> Vec<VoiceId>;

    fn active_voices(&self) -> usize;

    fn resume(&mut self) -> Result<(), AudioError>;

    fn suspend(&mut self) -> Result<(), AudioError>;

    fn close(&mut self);
}

struct Voice {
    buffer: Arc<AudioBuffer>,
    /// Position in source frames.
    pos: f64,
    rate: f64,
    gain: f32,
    finished: bool,
}

/// Shared mixer core used by both devices.
struct MixState {
    voices: HashMap<VoiceId, Voice>,
    next_id: VoiceId,
    master_gain: f32,
    sample_rate: u32,
    channels: u16,
    suspended: bool,
}

impl MixState {
    fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            voices: HashMap::new(),
            next_id: 1,
            master_gain: 1.0,
            sample_rate,
            channels,
            suspended: false,
        }
    }

    fn start_voice(&mut self, params: VoiceParams) -> VoiceId {
        let id = self.next_id;
        self.next_id += 1;
        let offset_frames = params.offset_secs.max(0.0) * params.buffer.sample_rate as f64;
        self.voices.insert(
            id,
            Voice {
                buffer: params.buffer,
                pos: offset_frames,
                rate: params.rate,
                gain: params.gain,
                finished: false,
            },
        );
        id
    }

    fn take_finished(&mut self) -> Vec<VoiceId> {
        let finished: Vec<VoiceId> = self
            .voices
            .iter()
            .filter(|(_, v)| v.finished)
            .map(|(id, _)| *id)
            .collect();
        for id in &finished {
            self.voices.remove(id);
        }
        finished
    }

    /// Mix all live voices into an interleaved output slice.
    fn mix_into(&mut self, out: &mut [f32]) {
        out.fill(0.0);
        if self.suspended {
            return;
        }
        let out_ch = self.channels as usize;
        if out_ch == 0 {
            return;
        }
        let out_frames = out.len() / out_ch;

        for voice in self.voices.values_mut() {
            if voice.finished {
                continue;
            }
            let src_frames = voice.buffer.frames();
            let src_ch = voice.buffer.channels as usize;
            if src_frames == 0 || src_ch == 0 {
                voice.finished = true;
                continue;
            }
            let step = voice.rate * voice.buffer.sample_rate as f64 / self.sample_rate as f64;
            let samples = Arc::clone(&voice.buffer.samples);

            for i in 0..out_frames {
                let pos = voice.pos + step * i as f64;
                if pos >= src_frames as f64 {
                    voice.finished = true;
                    break;
                }
                let i0 = pos.floor() as usize;
                let i1 = (i0 + 1).min(src_frames - 1);
                let frac = (pos - i0 as f64) as f32;
                for c in 0..out_ch {
                    let s0 = src_sample(&samples, i0, src_ch, out_ch, c);
                    let s1 = src_sample(&samples, i1, src_ch, out_ch, c);
                    let s = s0 * (1.0 - frac) + s1 * frac;
                    out[i * out_ch + c] += s * voice.gain;
                }
            }
            voice.pos += step * out_frames as f64;
            if voice.pos >= src_frames as f64 {
                voice.finished = true;
            }
        }

        for s in out.iter_mut() {
            *s = soft_clip(*s * self.master_gain);
        }
    }
}

/// Pull one interleaved source sample for an output channel, mapping
/// between channel layouts (mono fans out, stereo downmixes to mono).
#[inline]
fn src_sample(samples: &[f32], frame: usize, src_ch: usize, out_ch: usize, c: usize) -> f32 {
    let base = frame * src_ch;
    if src_ch == out_ch {
        samples[base + c]
    } else if src_ch == 1 {
        samples[base]
    } else if out_ch == 1 {
        (samples[base] + samples[base + 1]) * 0.5
    } else {
        samples[base + c.min(src_ch - 1)]
    }
}

/// Tanh-based soft clip: values in [-1, 1] pass nearly unchanged, values
/// beyond are gently compressed instead of wrapping harshly.
#[inline]
fn soft_clip(x: f32) -> f32 {
    if x.abs() <= 1.0 {
        x
    } else {
        x.signum() * (1.0 + (x.abs() - 1.0).tanh()) * 0.5 + x.signum() * 0.5
    }
}

// ============================================================================
// Realtime device (cpal)
// ============================================================================

/// Realtime output through the default cpal device.
pub struct CpalDevice {
    state: Arc<Mutex<MixState>>,
    stream: Option<Stream>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl CpalDevice {
    /// Open the default output device at 44.1kHz stereo.
    pub fn new() -> Result<Self, AudioError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| AudioError::Output("no audio output device found".to_string()))?;
        info!(
            "using audio output device {}",
            device.name().unwrap_or_else(|_| "unknown".to_string())
        );

        let sample_rate = 44_100;
        let channels = 2;
        let config = StreamConfig {
            channels,
            sample_rate: SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let state = Arc::new(Mutex::new(MixState::new(sample_rate, channels)));
        let state_cb = Arc::clone(&state);

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    // Audio thread: lock is short and uncontended in practice
                    state_cb.lock().mix_into(data);
                },
                move |err| {
                    error!("audio output stream error: {err}");
                },
                None,
            )
            .map_err(|e| AudioError::StreamBuild(format!("{e}")))?;
        stream
            .play()
            .map_err(|e| AudioError::StreamPlay(format!("{e}")))?;

        debug!("audio output stream built: {sample_rate}Hz x{channels}");
        Ok(Self {
            state,
            stream: Some(stream),
            sample_rate,
            channels,
        })
    }
}

impl AudioDevice for CpalDevice {
    fn start_voice(&mut self, params: VoiceParams) -> Result<VoiceId, AudioError> {
        if self.stream.is_none() {
            return Err(AudioError::Output("device closed".to_string()));
        }
        Ok(self.state.lock().start_voice(params))
    }

    fn stop_voice(&mut self, id: VoiceId) {
        if self.state.lock().voices.remove(&id).is_none() {
            trace!("stop_voice {id}: already gone");
        }
    }

    fn set_voice_gain(&mut self, id: VoiceId, gain: f32) {
        if let Some(voice) = self.state.lock().voices.get_mut(&id) {
            voice.gain = gain;
        }
    }

    fn set_voice_rate(&mut self, id: VoiceId, rate: f64) {
        if let Some(voice) = self.state.lock().voices.get_mut(&id) {
            voice.rate = rate;
        }
    }

    fn set_master_gain(&mut self, gain: f32) {
        self.state.lock().master_gain = gain;
    }

    fn master_gain(&self) -> f32 {
        self.state.lock().master_gain
    }

    fn finished_voices(&mut self) -> Vec<VoiceId> {
        self.state.lock().take_finished()
    }

    fn active_voices(&self) -> usize {
        self.state.lock().voices.len()
    }

    fn resume(&mut self) -> Result<(), AudioError> {
        self.state.lock().suspended = false;
        if let Some(stream) = &self.stream {
            stream
                .play()
                .map_err(|e| AudioError::StreamPlay(format!("{e}")))?;
        }
        Ok(())
    }

    fn suspend(&mut self) -> Result<(), AudioError> {
        self.state.lock().suspended = true;
        Ok(())
    }

    fn close(&mut self) {
        self.state.lock().voices.clear();
        self.stream = None;
        debug!("audio device closed");
    }
}

// ============================================================================
// Offline device
// ============================================================================

/// Pull-based device for offline rendering and tests.
pub struct OfflineDevice {
    state: MixState,
    closed: bool,
}

impl OfflineDevice {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            state: MixState::new(sample_rate, channels),
            closed: false,
        }
    }

    /// Mix the next `frames` output frames and return them interleaved.
    pub fn render(&mut self, frames: usize) -> Vec<f32> {
        let mut out = vec![0.0f32; frames * self.state.channels as usize];
        self.state.mix_into(&mut out);
        out
    }
}

impl AudioDevice for OfflineDevice {
    fn start_voice(&mut self, params: VoiceParams) -> Result<VoiceId, AudioError> {
        if self.closed {
            return Err(AudioError::Output("device closed".to_string()));
        }
        Ok(self.state.start_voice(params))
    }

    fn stop_voice(&mut self, id: VoiceId) {
        if self.state.voices.remove(&id).is_none() {
            trace!("stop_voice {id}: already gone");
        }
    }

    fn set_voice_gain(&mut self, id: VoiceId, gain: f32) {
        if let Some(voice) = self.state.voices.get_mut(&id) {
            voice.gain = gain;
        }
    }

    fn set_voice_rate(&mut self, id: VoiceId, rate: f64) {
        if let Some(voice) = self.state.voices.get_mut(&id) {
            voice.rate = rate;
        }
    }

    fn set_master_gain(&mut self, gain: f32) {
        self.state.master_gain = gain;
    }

    fn master_gain(&self) -> f32 {
        self.state.master_gain
    }

    fn finished_voices(&mut self) -> Vec<VoiceId> {
        self.state.take_finished()
    }

    fn active_voices(&self) -> usize {
        self.state.voices.len()
    }

    fn resume(&mut self) -> Result<(), AudioError> {
        self.state.suspended = false;
        Ok(())
    }

    fn suspend(&mut self) -> Result<(), AudioError> {
        self.state.suspended = true;
        Ok(())
    }

    fn close(&mut self) {
        self.state.voices.clear();
        self.closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_buffer(frames: usize, value: f32) -> Arc<AudioBuffer> {
        Arc::new(AudioBuffer::new(44_100, 1, vec![value; frames]))
    }

    fn make_params(buffer: Arc<AudioBuffer>) -> VoiceParams {
        VoiceParams {
            buffer,
            offset_secs: 0.0,
            rate: 1.0,
            gain: 1.0,
        }
    }

    #[test]
    fn test_voice_plays_and_finishes() {
        let mut device = OfflineDevice::new(44_100, 1);
        let id = device.start_voice(make_params(make_buffer(100, 0.5))).unwrap();
        assert_eq!(device.active_voices(), 1);

        let out = device.render(100);
        assert!((out[0] - 0.5).abs() < 1e-6);
        assert!((out[99] - 0.5).abs() < 1e-6);

        // Next render passes the end: voice finishes and is reaped
        device.render(10);
        assert_eq!(device.finished_voices(), vec![id]);
        assert_eq!(device.active_voices(), 0);
    }

    #[test]
    fn test_offset_skips_into_buffer() {
        let mut samples = vec![0.0f32; 44_100];
        samples[22_050] = 1.0; // spike at 0.5s
        let buffer = Arc::new(AudioBuffer::new(44_100, 1, samples));

        let mut device = OfflineDevice::new(44_100, 1);
        device
            .start_voice(VoiceParams {
                buffer,
                offset_secs: 0.5,
                rate: 1.0,
                gain: 1.0,
            })
            .unwrap();
        let out = device.render(4);
        assert!((out[0] - 1.0).abs() < 1e-6, "offset should land on the spike");
    }

    #[test]
    fn test_double_stop_is_noop() {
        let mut device = OfflineDevice::new(44_100, 2);
        let id = device.start_voice(make_params(make_buffer(10, 0.1))).unwrap();
        device.stop_voice(id);
        device.stop_voice(id); // second stop must not panic or error
        assert_eq!(device.active_voices(), 0);
    }

    #[test]
    fn test_master_gain_and_suspend() {
        let mut device = OfflineDevice::new(44_100, 1);
        device.start_voice(make_params(make_buffer(1000, 0.5))).unwrap();

        device.set_master_gain(0.5);
        let out = device.render(4);
        assert!((out[0] - 0.25).abs() < 1e-6);

        device.suspend().unwrap();
        let silent = device.render(4);
        assert!(silent.iter().all(|&s| s == 0.0));

        device.resume().unwrap();
        let back = device.render(4);
        assert!(back[0] > 0.0);
    }

    #[test]
    fn test_mono_fans_out_to_stereo() {
        let mut device = OfflineDevice::new(44_100, 2);
        device.start_voice(make_params(make_buffer(100, 0.3))).unwrap();
        let out = device.render(2);
        assert!((out[0] - 0.3).abs() < 1e-6); // L
        assert!((out[1] - 0.3).abs() < 1e-6); // R
    }

    #[test]
    fn test_rate_doubles_consumption() {
        let mut device = OfflineDevice::new(44_100, 1);
        let id = device.start_voice(make_params(make_buffer(100, 0.2))).unwrap();
        device.set_voice_rate(id, 2.0);
        device.render(50); // consumes 100 source frames at 2x
        device.render(1);
        assert_eq!(device.finished_voices(), vec![id]);
    }

    #[test]
    fn test_soft_clip_behavior() {
        assert!((soft_clip(0.7) - 0.7).abs() < 1e-6);
        assert!(soft_clip(4.0) < 1.5);
        assert!(soft_clip(-4.0) > -1.5);
    }
}
