//! AudioEngine - schedules audio-buffer playback against the active set.
//!
//! # Reconciliation model
//!
//! `play_audio_clips` is called every rendered frame while playing. It
//! diffs the scheduled-voice map against the incoming active set:
//! departed clips are stopped, missing clips are scheduled from a
//! non-negative source offset, and clips already playing are left alone -
//! there is deliberately no drift correction on repeated calls.
//!
//! # Lifecycle
//!
//! The output device is created lazily on first use (the environment this
//! models gates audio behind a prior user interaction). Decoded buffers are
//! cached per asset id with no eviction; long sessions grow the cache until
//! [`clear_buffer_cache`](AudioEngine::clear_buffer_cache) is called.
//!
//! # Failure isolation
//!
//! One clip failing to load is logged and skipped; every other clip in the
//! same call still schedules.

use std::collections::HashMap;
use std::sync::Arc;

use log::{trace, warn};
use uuid::Uuid;

use crate::entities::ActiveClip;
use crate::stores::MediaStore;

use super::buffer::{AudioBuffer, BufferLoader};
use super::device::{AudioDevice, VoiceId, VoiceParams};
use super::error::AudioError;

type DeviceFactory = Box<dyn Fn() -> Result<Box<dyn AudioDevice>, AudioError> + Send>;

/// One scheduled audio clip.
#[derive(Clone, Debug)]
pub struct AudioSourceState {
    pub voice: VoiceId,
    pub gain: f32,
    pub asset_id: Uuid,
    pub clip_id: Uuid,
    /// Timeline start frame of the scheduled clip.
    pub start_time: i64,
    /// Source offset in seconds the voice was started at.
    pub offset: f64,
}

/// Audio playback reconciler.
pub struct AudioEngine {
    device: Option<Box<dyn AudioDevice>>,
    factory: DeviceFactory,
    loader: Arc<dyn BufferLoader>,
    /// Decoded buffers per asset id. No eviction.
    buffers: HashMap<Uuid, Arc<AudioBuffer>>,
    /// Scheduled voices per clip id.
    scheduled: HashMap<Uuid, AudioSourceState>,
    volume: f32,
    /// Load missing buffers inline during `play_audio_clips`. When off,
    /// misses are returned to the caller for asynchronous loading.
    inline_load: bool,
}

impl AudioEngine {
    pub fn new(factory: DeviceFactory, loader: Arc<dyn BufferLoader>) -> Self {
        Self {
            device: None,
            factory,
            loader,
            buffers: HashMap::new(),
            scheduled: HashMap::new(),
            volume: 1.0,
            inline_load: true,
        }
    }

    /// Engine backed by the default realtime output device.
    pub fn with_realtime_output(loader: Arc<dyn BufferLoader>) -> Self {
        Self::new(
            Box::new(|| {
                super::device::CpalDevice::new().map(|d| Box::new(d) as Box<dyn AudioDevice>)
            }),
            loader,
        )
    }

    /// Engine backed by an offline device (no hardware, pull-based).
    pub fn offline(sample_rate: u32, channels: u16, loader: Arc<dyn BufferLoader>) -> Self {
        Self::new(
            Box::new(move || {
                Ok(Box::new(super::device::OfflineDevice::new(sample_rate, channels))
                    as Box<dyn AudioDevice>)
            }),
            loader,
        )
    }

    /// When disabled, `play_audio_clips` never blocks on decoding: cache
    /// misses are returned for the caller to load in the background.
    pub fn set_inline_load(&mut self, inline_load: bool) {
        self.inline_load = inline_load;
    }

    fn ensure_device(&mut self) -> Result<(), AudioError> {
        if self.device.is_none() {
            let mut device = (self.factory)()?;
            device.set_master_gain(self.volume);
            self.device = Some(device);
            trace!("audio device created lazily");
        }
        Ok(())
    }

    /// Decode (or fetch from cache) the buffer for an asset.
    pub fn load_buffer(
        &mut self,
        asset_id: Uuid,
        asset: &crate::entities::MediaAsset,
    ) -> Result<Arc<AudioBuffer>, AudioError> {
        if let Some(cached) = self.buffers.get(&asset_id) {
            return Ok(Arc::clone(cached));
        }
        let buffer = Arc::new(self.loader.load(asset)?);
        self.buffers.insert(asset_id, Arc::clone(&buffer));
        Ok(buffer)
    }

    pub fn has_buffer(&self, asset_id: Uuid) -> bool {
        self.buffers.contains_key(&asset_id)
    }

    /// Insert an externally decoded buffer (asynchronous load completion).
    pub fn insert_buffer(&mut self, asset_id: Uuid, buffer: AudioBuffer) {
        self.buffers.insert(asset_id, Arc::new(buffer));
    }

    pub fn loader(&self) -> Arc<dyn BufferLoader> {
        Arc::clone(&self.loader)
    }

    /// Reconcile scheduled audio against the current active set.
    ///
    /// Returns asset ids whose buffers still need loading (only when inline
    /// loading is off); the caller is expected to load them and call again
    /// on a later frame.
    pub fn play_audio_clips(
        &mut self,
        active: &[ActiveClip],
        assets: &MediaStore,
        current_time: f64,
        rate: f64,
        fps: f64,
    ) -> Vec<Uuid> {
        let mut pending: Vec<Uuid> = Vec::new();

        if let Err(e) = self.ensure_device() {
            warn!("audio device unavailable: {e}");
            return pending;
        }

        // Reap voices that ended naturally
        let finished = self.device.as_mut().expect("ensured").finished_voices();
        if !finished.is_empty() {
            self.scheduled
                .retain(|_, state| !finished.contains(&state.voice));
        }

        trace!(
            "audio reconcile at t={current_time:.3}s rate={rate} ({} active, {} scheduled)",
            active.len(),
            self.scheduled.len()
        );

        // Stop voices whose clip left the active set
        let active_ids: Vec<Uuid> = active.iter().map(|a| a.clip.id).collect();
        let departed: Vec<Uuid> = self
            .scheduled
            .keys()
            .filter(|id| !active_ids.contains(id))
            .copied()
            .collect();
        for clip_id in departed {
            if let Some(state) = self.scheduled.remove(&clip_id) {
                self.device
                    .as_mut()
                    .expect("ensured")
                    .stop_voice(state.voice);
                trace!("stopped audio for departed clip {clip_id}");
            }
        }

        // Schedule clips that are active but not yet playing
        for entry in active {
            let clip_id = entry.clip.id;
            if self.scheduled.contains_key(&clip_id) {
                continue; // already playing; no drift correction
            }
            let asset_id = entry.clip.asset_id;
            let Some(asset) = assets.get(asset_id) else {
                trace!("audio clip {clip_id} skipped: missing asset {asset_id}");
                continue;
            };

            let buffer = if let Some(cached) = self.buffers.get(&asset_id) {
                Arc::clone(cached)
            } else if self.inline_load {
                match self.load_buffer(asset_id, &asset) {
                    Ok(buffer) => buffer,
                    Err(e) => {
                        warn!("audio load failed for clip {clip_id} (asset {asset_id}): {e}");
                        continue; // other clips in this call still schedule
                    }
                }
            } else {
                pending.push(asset_id);
                continue;
            };

            let offset = (entry.local_time as f64 / fps.max(1.0)).max(0.0);
            let gain = 1.0;
            let params = VoiceParams {
                buffer,
                offset_secs: offset,
                rate,
                gain,
            };
            match self.device.as_mut().expect("ensured").start_voice(params) {
                Ok(voice) => {
                    trace!("scheduled audio clip {clip_id} at offset {offset:.3}s");
                    self.scheduled.insert(
                        clip_id,
                        AudioSourceState {
                            voice,
                            gain,
                            asset_id,
                            clip_id,
                            start_time: entry.clip.start_time,
                            offset,
                        },
                    );
                }
                Err(e) => {
                    warn!("failed to start audio for clip {clip_id}: {e}");
                }
            }
        }

        pending
    }

    /// Master volume, clamped to [0, 1].
    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
        if let Some(device) = self.device.as_mut() {
            device.set_master_gain(self.volume);
        }
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    /// Update rate on all playing voices. Offset drift that accumulated at
    /// the old rate is not corrected.
    pub fn set_playback_rate(&mut self, rate: f64) {
        if let Some(device) = self.device.as_mut() {
            for state in self.scheduled.values() {
                device.set_voice_rate(state.voice, rate);
            }
        }
    }

    /// Stop everything; scheduled offsets are invalid after a position jump.
    pub fn seek(&mut self) {
        self.stop_all();
    }

    pub fn stop_all(&mut self) {
        if let Some(device) = self.device.as_mut() {
            for (_, state) in self.scheduled.drain() {
                device.stop_voice(state.voice);
            }
        } else {
            self.scheduled.clear();
        }
    }

    pub fn resume(&mut self) -> Result<(), AudioError> {
        self.ensure_device()?;
        self.device.as_mut().expect("ensured").resume()
    }

    pub fn suspend(&mut self) -> Result<(), AudioError> {
        match self.device.as_mut() {
            Some(device) => device.suspend(),
            None => Ok(()),
        }
    }

    pub fn scheduled_count(&self) -> usize {
        self.scheduled.len()
    }

    pub fn scheduled_clips(&self) -> Vec<Uuid> {
        self.scheduled.keys().copied().collect()
    }

    pub fn source_state(&self, clip_id: Uuid) -> Option<&AudioSourceState> {
        self.scheduled.get(&clip_id)
    }

    pub fn cached_buffer_count(&self) -> usize {
        self.buffers.len()
    }

    /// Drop all decoded buffers. Not called automatically anywhere.
    pub fn clear_buffer_cache(&mut self) {
        self.buffers.clear();
    }

    /// Stop all voices, close the device, clear caches.
    pub fn dispose(&mut self) {
        self.stop_all();
        if let Some(device) = self.device.as_mut() {
            device.close();
        }
        self.device = None;
        self.buffers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::buffer::MemoryLoader;
    use crate::entities::{AssetKind, Clip, MediaAsset, Track, TrackKind};

    fn make_engine(loader: Arc<MemoryLoader>) -> AudioEngine {
        AudioEngine::offline(44_100, 2, loader)
    }

    fn register_tone(loader: &MemoryLoader, assets: &MediaStore, url: &str) -> MediaAsset {
        loader.insert(url, AudioBuffer::new(44_100, 1, vec![0.25; 44_100 * 10]));
        let asset = MediaAsset::new(AssetKind::Audio, url, url);
        assets.insert(asset.clone());
        asset
    }

    fn make_active(asset_id: Uuid, start: i64, duration: i64, frame: i64) -> ActiveClip {
        let track = Track::new(TrackKind::Audio, 0, "A1");
        let clip = Clip::new(track.id, asset_id, start, duration);
        ActiveClip::new(clip, track, frame)
    }

    #[test]
    fn test_schedule_and_no_double_schedule() {
        let loader = Arc::new(MemoryLoader::new());
        let assets = MediaStore::new();
        let asset = register_tone(&loader, &assets, "tone.wav");
        let mut engine = make_engine(loader);

        let active = vec![make_active(asset.id, 0, 300, 30)];
        engine.play_audio_clips(&active, &assets, 1.0, 1.0, 30.0);
        assert_eq!(engine.scheduled_count(), 1);
        let voice = engine.source_state(active[0].clip.id).unwrap().voice;

        // Same active set again: the clip must not be rescheduled
        engine.play_audio_clips(&active, &assets, 1.5, 1.0, 30.0);
        assert_eq!(engine.scheduled_count(), 1);
        assert_eq!(engine.source_state(active[0].clip.id).unwrap().voice, voice);
    }

    #[test]
    fn test_offset_computed_from_local_time() {
        let loader = Arc::new(MemoryLoader::new());
        let assets = MediaStore::new();
        let asset = register_tone(&loader, &assets, "tone.wav");
        let mut engine = make_engine(loader);

        // Clip started 60 frames ago at 30fps: offset = 2s
        let active = vec![make_active(asset.id, 0, 300, 60)];
        engine.play_audio_clips(&active, &assets, 2.0, 1.0, 30.0);
        let state = engine.source_state(active[0].clip.id).unwrap();
        assert!((state.offset - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_departed_clip_stopped() {
        let loader = Arc::new(MemoryLoader::new());
        let assets = MediaStore::new();
        let asset = register_tone(&loader, &assets, "tone.wav");
        let mut engine = make_engine(loader);

        let active = vec![make_active(asset.id, 0, 300, 30)];
        engine.play_audio_clips(&active, &assets, 1.0, 1.0, 30.0);
        assert_eq!(engine.scheduled_count(), 1);

        engine.play_audio_clips(&[], &assets, 2.0, 1.0, 30.0);
        assert_eq!(engine.scheduled_count(), 0);
    }

    #[test]
    fn test_failed_load_isolated_per_clip() {
        let loader = Arc::new(MemoryLoader::new());
        let assets = MediaStore::new();
        let good = register_tone(&loader, &assets, "good.wav");
        // Asset registered in the store but with no buffer behind it
        let bad = MediaAsset::new(AssetKind::Audio, "bad.wav", "bad");
        assets.insert(bad.clone());
        let mut engine = make_engine(loader);

        let active = vec![
            make_active(bad.id, 0, 300, 10),
            make_active(good.id, 0, 300, 10),
        ];
        engine.play_audio_clips(&active, &assets, 0.33, 1.0, 30.0);

        // The bad clip is skipped, the good one still plays
        assert_eq!(engine.scheduled_count(), 1);
        assert!(engine.source_state(active[1].clip.id).is_some());
    }

    #[test]
    fn test_stop_all_clears_everything() {
        let loader = Arc::new(MemoryLoader::new());
        let assets = MediaStore::new();
        let a = register_tone(&loader, &assets, "a.wav");
        let b = register_tone(&loader, &assets, "b.wav");
        let mut engine = make_engine(loader);

        let active = vec![
            make_active(a.id, 0, 300, 10),
            make_active(b.id, 0, 300, 10),
        ];
        engine.play_audio_clips(&active, &assets, 0.33, 1.0, 30.0);
        assert_eq!(engine.scheduled_count(), 2);

        engine.stop_all();
        assert_eq!(engine.scheduled_count(), 0);
        // Idempotent
        engine.stop_all();
        assert_eq!(engine.scheduled_count(), 0);
    }

    #[test]
    fn test_volume_clamped() {
        let loader = Arc::new(MemoryLoader::new());
        let mut engine = make_engine(loader);
        engine.set_volume(3.0);
        assert_eq!(engine.volume(), 1.0);
        engine.set_volume(-0.5);
        assert_eq!(engine.volume(), 0.0);
    }

    #[test]
    fn test_buffer_cache_unbounded_until_cleared() {
        let loader = Arc::new(MemoryLoader::new());
        let assets = MediaStore::new();
        let mut engine = make_engine(Arc::clone(&loader));

        for i in 0..5 {
            let asset = register_tone(&loader, &assets, &format!("t{i}.wav"));
            engine.load_buffer(asset.id, &asset).unwrap();
        }
        assert_eq!(engine.cached_buffer_count(), 5);

        engine.clear_buffer_cache();
        assert_eq!(engine.cached_buffer_count(), 0);
    }

    #[test]
    fn test_async_mode_returns_pending() {
        let loader = Arc::new(MemoryLoader::new());
        let assets = MediaStore::new();
        let asset = register_tone(&loader, &assets, "tone.wav");
        let mut engine = make_engine(Arc::clone(&loader));
        engine.set_inline_load(false);

        let active = vec![make_active(asset.id, 0, 300, 0)];
        let pending = engine.play_audio_clips(&active, &assets, 0.0, 1.0, 30.0);
        assert_eq!(pending, vec![asset.id]);
        assert_eq!(engine.scheduled_count(), 0);

        // Completion arrives, clip schedules on the next call
        let buffer = loader.load(&asset).unwrap();
        engine.insert_buffer(asset.id, buffer);
        let pending = engine.play_audio_clips(&active, &assets, 0.1, 1.0, 30.0);
        assert!(pending.is_empty());
        assert_eq!(engine.scheduled_count(), 1);
    }
}
