//! PreviewRenderer - per-frame orchestration of the preview pipeline.
//!
//! # Frame pipeline
//!
//! `render_frame(frame)`:
//! 1. Resolve active video-track clips; index 0 is the primary.
//! 2. Resolve all active clips; everything non-audio except the primary is
//!    an overlay (images, text, secondary video), in track order.
//! 3. Render the primary through the video surface pool. Visibility across
//!    pooled surfaces is toggled only when the visible asset id actually
//!    changes.
//! 4. Render overlays through the compositor.
//! 5. While playing, reconcile scheduled audio at `frame / fps` seconds.
//! 6. Record metrics. Any error is caught and logged at the top level; the
//!    previously presented frame stays on screen.
//!
//! # Host integration
//!
//! The host calls `tick()` from its animation-frame loop. A tick drains
//! asynchronous load completions, re-renders on playhead moves while
//! paused (active playback renders from the clock tick instead), advances
//! the playback clock, and runs the auto-quality check: fps below 20
//! downgrades the quality tier one step. There is no automatic upgrade
//! path.
//!
//! # Staleness
//!
//! Asynchronous work is never allowed to mutate render or audio state
//! directly: decode jobs are epoch-tagged and their completions only land
//! in the buffer cache, with all scheduling re-derived inside render
//! passes. `seek`/`dispose` bump the epoch, which cancels queued jobs at
//! pickup and demotes in-flight completions to cache-only.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use anyhow::Result;
use crossbeam_channel::{unbounded, Receiver, Sender};
use glam::Vec2;
use log::{debug, info, trace, warn};
use uuid::Uuid;

use crate::audio::{AudioBuffer, AudioEngine, AudioError};
use crate::entities::{ActiveClip, TrackKind};
use crate::render::{transform, OverlayCompositor, Renderer, VideoSurfacePool};
use crate::stores::{EditorStore, MediaStore, Quality, TimelineEvent, TimelineStore};

use super::metrics::PerformanceMetrics;
use super::playback::PlaybackEngine;
use super::resolver::ClipResolver;
use super::workers::{Epoch, Workers};

/// Below this rolling fps the quality tier drops one step.
const MIN_ACCEPTABLE_FPS: f64 = 20.0;

/// Worker threads for background decode.
const LOADER_THREADS: usize = 2;

struct AudioLoadDone {
    asset_id: Uuid,
    result: Result<AudioBuffer, AudioError>,
    epoch_tag: u64,
}

/// Orchestrates resolution, compositing, audio and quality control.
pub struct PreviewRenderer<R: Renderer + 'static> {
    renderer: R,
    timeline: Arc<TimelineStore>,
    editor: Arc<EditorStore>,
    media: Arc<MediaStore>,
    resolver: Arc<ClipResolver>,
    audio: AudioEngine,
    compositor: OverlayCompositor,
    video_pool: VideoSurfacePool,
    playback: PlaybackEngine,
    metrics: PerformanceMetrics,
    workers: Option<Workers>,
    epoch: Epoch,
    load_tx: Sender<AudioLoadDone>,
    load_rx: Receiver<AudioLoadDone>,
    loading: HashSet<Uuid>,
    pending_playhead: Arc<Mutex<Option<i64>>>,
    visible_primary: Option<Uuid>,
    last_rendered_frame: i64,
    disposed: bool,
}

impl<R: Renderer + 'static> PreviewRenderer<R> {
    /// Build the renderer with background decode workers (default).
    pub fn new(
        renderer: R,
        timeline: Arc<TimelineStore>,
        editor: Arc<EditorStore>,
        media: Arc<MediaStore>,
        audio: AudioEngine,
        initial_quality: Quality,
    ) -> Self {
        Self::build(renderer, timeline, editor, media, audio, initial_quality, true)
    }

    /// Build with synchronous loading - no worker threads, buffer decodes
    /// happen inline during `render_frame`. Offline rendering and tests.
    pub fn with_sync_loading(
        renderer: R,
        timeline: Arc<TimelineStore>,
        editor: Arc<EditorStore>,
        media: Arc<MediaStore>,
        audio: AudioEngine,
        initial_quality: Quality,
    ) -> Self {
        Self::build(renderer, timeline, editor, media, audio, initial_quality, false)
    }

    fn build(
        renderer: R,
        timeline: Arc<TimelineStore>,
        editor: Arc<EditorStore>,
        media: Arc<MediaStore>,
        mut audio: AudioEngine,
        initial_quality: Quality,
        background_loading: bool,
    ) -> Self {
        editor.set_quality(initial_quality);

        let resolver = ClipResolver::attach(&timeline);
        let playback = PlaybackEngine::new(Arc::clone(&timeline), Arc::clone(&editor));

        let epoch = Epoch::new();
        let workers = if background_loading {
            audio.set_inline_load(false);
            Some(Workers::new(LOADER_THREADS, epoch.clone()))
        } else {
            None
        };

        // Re-render on playhead moves while paused; during playback the
        // clock tick drives rendering instead.
        let pending_playhead: Arc<Mutex<Option<i64>>> = Arc::new(Mutex::new(None));
        let pending = Arc::clone(&pending_playhead);
        timeline.subscribe(move |event| {
            if let TimelineEvent::PlayheadChanged { new_frame, .. } = event {
                *pending.lock().unwrap_or_else(|e| e.into_inner()) = Some(*new_frame);
            }
        });

        let (load_tx, load_rx) = unbounded();
        let mut preview = Self {
            renderer,
            timeline,
            editor,
            media,
            resolver,
            audio,
            compositor: OverlayCompositor::new(),
            video_pool: VideoSurfacePool::new(),
            playback,
            metrics: PerformanceMetrics::new(),
            workers,
            epoch,
            load_tx,
            load_rx,
            loading: HashSet::new(),
            pending_playhead,
            visible_primary: None,
            last_rendered_frame: 0,
            disposed: false,
        };

        let initial = preview.timeline.playhead();
        preview.render_frame(initial);
        preview
    }

    /// Render one frame. Errors are logged, never propagated - the
    /// previously rendered frame remains visible.
    pub fn render_frame(&mut self, frame: i64) {
        if self.disposed {
            return;
        }
        let started = Instant::now();
        let tag = self.epoch.current();
        if let Err(e) = self.render_frame_inner(frame, tag) {
            warn!("render_frame({frame}) failed, keeping previous frame: {e:#}");
        }
        self.metrics.record_frame(started.elapsed());
        self.last_rendered_frame = frame;
    }

    fn render_frame_inner(&mut self, frame: i64, epoch_tag: u64) -> Result<()> {
        let fps = self.timeline.fps();
        let (width, height) = self.editor.effective_resolution();
        if self.renderer.target_size() != (width, height) {
            self.renderer.resize_target(width, height);
        }
        let container = Vec2::new(width as f32, height as f32);

        // 1. Active video clips; index 0 is primary
        let video_clips = self.resolver.get_active_video_clips(frame);
        let primary = video_clips.first().cloned();
        let primary_id = primary.as_ref().map(|p| p.clip.id);

        // 2. Everything else visual becomes an overlay, in track order
        let all = self.resolver.get_active_clips(frame);
        let overlays: Vec<ActiveClip> = all
            .iter()
            .filter(|a| a.track.kind != TrackKind::Audio && Some(a.clip.id) != primary_id)
            .cloned()
            .collect();

        // 3. Primary video surface
        match primary.as_ref() {
            Some(p) => self.render_primary(p, fps, container),
            None => self.hide_primary(),
        }

        // 4. Overlays
        self.compositor.render_overlays(
            &mut self.renderer,
            &overlays,
            &self.media,
            container.x,
            container.y,
        );

        // 5. Audio reconcile while playing
        if self.editor.is_playing() {
            let audio_clips = self.resolver.get_active_audio_clips(frame);
            if !audio_clips.is_empty() {
                let current_time = frame as f64 / fps.max(1.0);
                let rate = self.editor.playback_rate();
                let pending =
                    self.audio
                        .play_audio_clips(&audio_clips, &self.media, current_time, rate, fps);
                self.dispatch_audio_loads(pending, epoch_tag);
            }
        }

        self.renderer.present()
    }

    fn render_primary(&mut self, primary: &ActiveClip, fps: f64, container: Vec2) {
        let Some(asset) = self.media.get(primary.clip.asset_id) else {
            // Missing asset: silent exclusion, not an error
            debug!(
                "primary clip {} skipped: missing asset {}",
                primary.clip.id, primary.clip.asset_id
            );
            self.hide_primary();
            return;
        };

        let playing = self.editor.is_playing();
        let time_secs = primary.local_secs(fps);
        let surface =
            self.video_pool
                .get_surface(&mut self.renderer, &asset, time_secs, playing);

        // Toggle visibility only when the visible asset actually changed
        if self.visible_primary != Some(asset.id) {
            for (asset_id, sid) in self.video_pool.all_surfaces() {
                self.renderer.set_visible(sid, asset_id == asset.id);
            }
            self.visible_primary = Some(asset.id);
        }

        let mut placement =
            transform::apply_transforms(&primary.clip, primary.frame(), Some(&asset), container);
        placement.z = 0; // overlays stack above
        self.renderer.set_placement(surface, placement);

        self.video_pool
            .sync_to_timeline(asset.id, playing, self.editor.playback_rate());
    }

    fn hide_primary(&mut self) {
        if self.visible_primary.take().is_some() {
            for (_, sid) in self.video_pool.all_surfaces() {
                self.renderer.set_visible(sid, false);
            }
        }
    }

    fn dispatch_audio_loads(&mut self, pending: Vec<Uuid>, epoch_tag: u64) {
        let Some(workers) = self.workers.as_ref() else {
            return;
        };
        for asset_id in pending {
            if self.loading.contains(&asset_id) {
                continue;
            }
            let Some(asset) = self.media.get(asset_id) else {
                continue;
            };
            self.loading.insert(asset_id);
            let loader = self.audio.loader();
            let tx = self.load_tx.clone();
            workers.execute_with_epoch(epoch_tag, move || {
                let result = loader.load(&asset);
                let _ = tx.send(AudioLoadDone {
                    asset_id,
                    result,
                    epoch_tag,
                });
            });
        }
    }

    /// Drive the preview from the host's animation-frame loop.
    pub fn tick(&mut self) {
        if self.disposed {
            return;
        }
        self.pump_loads();

        // Playhead subscription: re-render only when not currently playing
        let pending = self
            .pending_playhead
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(frame) = pending
            && !self.editor.is_playing()
            && frame != self.last_rendered_frame
        {
            self.render_frame(frame);
        }

        if let Some(tick) = self.playback.tick() {
            if tick.skipped > 0 {
                self.metrics.record_dropped(tick.skipped);
            }
            self.render_frame(tick.frame);
        }

        self.auto_quality_check();
    }

    fn pump_loads(&mut self) {
        let mut fresh = false;
        while let Ok(done) = self.load_rx.try_recv() {
            self.loading.remove(&done.asset_id);
            match done.result {
                Ok(buffer) => {
                    // Decoded bytes are keyed by asset, not frame - always
                    // cacheable. Only a completion from the current epoch
                    // may trigger a render.
                    self.audio.insert_buffer(done.asset_id, buffer);
                    if self.epoch.is_current(done.epoch_tag) {
                        fresh = true;
                    } else {
                        trace!("stale load completion for asset {} dropped", done.asset_id);
                    }
                }
                Err(e) => {
                    warn!("background audio load failed for {}: {e}", done.asset_id);
                }
            }
        }
        if fresh {
            self.render_frame(self.last_rendered_frame);
        }
    }

    fn auto_quality_check(&mut self) {
        if !self.editor.is_playing() || !self.metrics.has_full_window() {
            return;
        }
        let fps = self.metrics.fps();
        if fps < MIN_ACCEPTABLE_FPS
            && let Some(lower) = self.editor.quality().lower()
        {
            info!(
                "preview fps {fps:.1} below {MIN_ACCEPTABLE_FPS}, downgrading quality to {lower:?}"
            );
            self.editor.set_quality(lower);
            self.metrics.reset();
        }
    }

    /// Write the quality tier and force a re-render of the current frame.
    pub fn set_quality(&mut self, quality: Quality) {
        self.editor.set_quality(quality);
        self.render_frame(self.last_rendered_frame);
    }

    /// Jump to a frame. Scheduled audio offsets are invalid after a
    /// position jump, so everything is stopped; queued loads for the old
    /// position become stale.
    pub fn seek(&mut self, frame: i64) {
        self.epoch.bump();
        self.audio.seek();
        self.playback.seek(frame);
        let target = self.timeline.playhead();
        self.render_frame(target);
        *self
            .pending_playhead
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = None;
    }

    /// Start playback (resumes the audio device first).
    pub fn play(&mut self) {
        if let Err(e) = self.audio.resume() {
            warn!("audio resume failed: {e}");
        }
        self.playback.start();
    }

    /// Pause playback and silence scheduled audio.
    pub fn pause(&mut self) {
        self.playback.stop();
        self.audio.stop_all();
    }

    /// Resize the preview target (full-quality size).
    pub fn set_resolution(&mut self, width: u32, height: u32) {
        self.editor.set_resolution(width, height);
        self.compositor
            .update_container_size(width as f32, height as f32);
        self.render_frame(self.last_rendered_frame);
    }

    /// Stop the loop and dispose sub-components in dependency order.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.epoch.bump();
        self.playback.stop();
        self.audio.dispose();
        self.compositor.dispose(&mut self.renderer);
        self.video_pool.dispose(&mut self.renderer);
        self.workers = None;
        self.disposed = true;
        debug!("preview renderer disposed");
    }

    // ========== Accessors ==========

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn resolver(&self) -> &Arc<ClipResolver> {
        &self.resolver
    }

    pub fn audio(&self) -> &AudioEngine {
        &self.audio
    }

    pub fn audio_mut(&mut self) -> &mut AudioEngine {
        &mut self.audio
    }

    pub fn playback_mut(&mut self) -> &mut PlaybackEngine {
        &mut self.playback
    }

    pub fn metrics(&self) -> &PerformanceMetrics {
        &self.metrics
    }

    pub fn last_rendered_frame(&self) -> i64 {
        self.last_rendered_frame
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }
}

impl<R: Renderer + 'static> Drop for PreviewRenderer<R> {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::MemoryLoader;
    use crate::entities::{AssetKind, Clip, MediaAsset, Track};
    use crate::render::retained::RetainedRenderer;
    use crate::render::SurfaceContent;
    use std::time::Duration;

    struct Fixture {
        timeline: Arc<TimelineStore>,
        editor: Arc<EditorStore>,
        media: Arc<MediaStore>,
        loader: Arc<MemoryLoader>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                timeline: Arc::new(TimelineStore::new(30.0, 3000)),
                editor: Arc::new(EditorStore::new()),
                media: Arc::new(MediaStore::new()),
                loader: Arc::new(MemoryLoader::new()),
            }
        }

        fn preview(&self) -> PreviewRenderer<RetainedRenderer> {
            let loader: Arc<dyn crate::audio::buffer::BufferLoader> = Arc::clone(&self.loader) as _;
            let audio = AudioEngine::offline(44_100, 2, loader);
            PreviewRenderer::with_sync_loading(
                RetainedRenderer::new(1280, 720),
                Arc::clone(&self.timeline),
                Arc::clone(&self.editor),
                Arc::clone(&self.media),
                audio,
                Quality::Full,
            )
        }

        fn add_video_clip(&self, order: i32, start: i64, duration: i64) -> (Uuid, Uuid) {
            let mut asset = MediaAsset::new(AssetKind::Video, "clip.mp4", "clip");
            asset.width = Some(1920);
            asset.height = Some(1080);
            let asset_id = asset.id;
            self.media.insert(asset);

            let track = Track::new(TrackKind::Video, order, "V");
            let track_id = track.id;
            self.timeline.add_track(track);
            let clip = Clip::new(track_id, asset_id, start, duration);
            let clip_id = clip.id;
            self.timeline.add_clip(clip);
            (clip_id, asset_id)
        }

        fn add_image_overlay(&self, order: i32, start: i64, duration: i64) -> Uuid {
            let mut asset = MediaAsset::new(AssetKind::Image, "logo.png", "logo");
            asset.width = Some(200);
            asset.height = Some(100);
            let asset_id = asset.id;
            self.media.insert(asset);

            let track = Track::new(TrackKind::Video, order, "V-overlay");
            let track_id = track.id;
            self.timeline.add_track(track);
            let clip = Clip::new(track_id, asset_id, start, duration);
            let clip_id = clip.id;
            self.timeline.add_clip(clip);
            clip_id
        }

        fn add_audio_clip(&self, start: i64, duration: i64) -> (Uuid, Uuid) {
            let url = format!("tone-{}.wav", uuid::Uuid::new_v4());
            self.loader
                .insert(&url, AudioBuffer::new(44_100, 1, vec![0.2; 44_100 * 60]));
            let asset = MediaAsset::new(AssetKind::Audio, &url, "tone");
            let asset_id = asset.id;
            self.media.insert(asset);

            let track = Track::new(TrackKind::Audio, 100, "A");
            let track_id = track.id;
            self.timeline.add_track(track);
            let clip = Clip::new(track_id, asset_id, start, duration);
            let clip_id = clip.id;
            self.timeline.add_clip(clip);
            (clip_id, asset_id)
        }
    }

    #[test]
    fn test_initial_frame_rendered_on_construction() {
        let fx = Fixture::new();
        let preview = fx.preview();
        assert!(preview.renderer().present_count() >= 1);
    }

    #[test]
    fn test_primary_video_rendered() {
        let fx = Fixture::new();
        let (_, asset_id) = fx.add_video_clip(0, 0, 90);
        let mut preview = fx.preview();

        preview.render_frame(45);

        let visible = preview.renderer().visible_nodes();
        assert_eq!(visible.len(), 1);
        match &visible[0].1.content {
            SurfaceContent::Video {
                asset_id: shown,
                time_secs,
            } => {
                assert_eq!(*shown, asset_id);
                assert!((*time_secs - 1.5).abs() < 1e-9); // frame 45 @ 30fps
            }
            other => panic!("expected video content, got {other:?}"),
        }
    }

    #[test]
    fn test_overlays_exclude_primary_and_audio() {
        let fx = Fixture::new();
        fx.add_video_clip(0, 0, 90);
        fx.add_image_overlay(1, 0, 90);
        fx.add_audio_clip(0, 90);
        let mut preview = fx.preview();

        preview.render_frame(10);

        // Primary renders through the video pool, the image through the
        // compositor; the audio clip renders nowhere.
        assert_eq!(preview.compositor.active_layer_count(), 1);
        assert_eq!(preview.video_pool.active_count(), 1);
    }

    #[test]
    fn test_audio_scheduled_only_while_playing() {
        let fx = Fixture::new();
        let (clip_id, _) = fx.add_audio_clip(0, 300);
        let mut preview = fx.preview();

        preview.render_frame(30);
        assert_eq!(preview.audio().scheduled_count(), 0); // paused

        preview.play();
        preview.render_frame(30);
        assert_eq!(preview.audio().scheduled_count(), 1);
        let state = preview.audio().source_state(clip_id).unwrap();
        assert!((state.offset - 1.0).abs() < 1e-9); // 30 frames @ 30fps
    }

    #[test]
    fn test_seek_stops_scheduled_audio() {
        let fx = Fixture::new();
        fx.add_audio_clip(0, 300);
        let mut preview = fx.preview();

        preview.play();
        preview.render_frame(30);
        assert_eq!(preview.audio().scheduled_count(), 1);

        preview.seek(200);
        // Offsets were invalidated; the seek render reschedules from the
        // new position
        assert_eq!(preview.timeline.playhead(), 200);
        let state_count = preview.audio().scheduled_count();
        assert_eq!(state_count, 1);
        let clips = preview.audio().scheduled_clips();
        let offset = preview.audio().source_state(clips[0]).unwrap().offset;
        assert!((offset - 200.0 / 30.0).abs() < 1e-6);
    }

    #[test]
    fn test_set_quality_changes_target_and_rerenders() {
        let fx = Fixture::new();
        let mut preview = fx.preview();
        assert_eq!(preview.renderer().target_size(), (1280, 720));

        let before = preview.renderer().present_count();
        preview.set_quality(Quality::Half);
        assert!(preview.renderer().present_count() > before);
        assert_eq!(preview.renderer().target_size(), (640, 360));
    }

    #[test]
    fn test_missing_asset_never_panics() {
        let fx = Fixture::new();
        let track = Track::new(TrackKind::Video, 0, "V");
        let track_id = track.id;
        fx.timeline.add_track(track);
        // Clip referencing an asset that was never registered
        fx.timeline
            .add_clip(Clip::new(track_id, Uuid::new_v4(), 0, 100));

        let mut preview = fx.preview();
        preview.render_frame(50);
        assert!(preview.renderer().visible_nodes().is_empty());
    }

    #[test]
    fn test_primary_visibility_toggles_on_asset_change() {
        let fx = Fixture::new();
        let (_, first_asset) = fx.add_video_clip(0, 0, 50);
        let (_, second_asset) = fx.add_video_clip(1, 50, 50);
        let mut preview = fx.preview();

        preview.render_frame(10);
        preview.render_frame(60);

        // Frame 60: only the lower track's clip ended; the order-1 clip is
        // primary now. Exactly one video surface is visible.
        let surfaces = preview.video_pool.all_surfaces();
        assert_eq!(surfaces.len(), 2);
        let visible: Vec<Uuid> = surfaces
            .iter()
            .filter(|(_, sid)| {
                preview
                    .renderer()
                    .node(*sid)
                    .map(|n| n.placement.visible)
                    .unwrap_or(false)
            })
            .map(|(aid, _)| *aid)
            .collect();
        assert_eq!(visible, vec![second_asset]);
        assert_ne!(first_asset, second_asset);
    }

    #[test]
    fn test_auto_quality_downgrades_once_no_upgrade() {
        let fx = Fixture::new();
        let mut preview = fx.preview();
        fx.editor.set_playing(true);

        // Manufacture a slow window: few frames spread over >0.5s
        preview.metrics.record_frame(Duration::from_millis(40));
        preview.metrics.record_frame(Duration::from_millis(40));
        std::thread::sleep(Duration::from_millis(600));
        preview.metrics.record_frame(Duration::from_millis(40));

        preview.auto_quality_check();
        assert_eq!(fx.editor.quality(), Quality::Half);

        // Healthy fps afterwards never upgrades back
        for _ in 0..30 {
            preview.metrics.record_frame(Duration::from_millis(1));
        }
        std::thread::sleep(Duration::from_millis(550));
        for _ in 0..30 {
            preview.metrics.record_frame(Duration::from_millis(1));
        }
        preview.auto_quality_check();
        assert_eq!(fx.editor.quality(), Quality::Half);
    }

    #[test]
    fn test_playhead_move_rerenders_when_paused() {
        let fx = Fixture::new();
        fx.add_video_clip(0, 0, 300);
        let mut preview = fx.preview();

        let before = preview.renderer().present_count();
        fx.timeline.set_playhead(120);
        preview.tick();
        assert!(preview.renderer().present_count() > before);
        assert_eq!(preview.last_rendered_frame(), 120);
    }

    #[test]
    fn test_dispose_releases_everything() {
        let fx = Fixture::new();
        fx.add_video_clip(0, 0, 90);
        fx.add_image_overlay(1, 0, 90);
        let mut preview = fx.preview();
        preview.render_frame(10);
        assert!(preview.renderer().surface_count() > 0);

        preview.dispose();
        assert!(preview.is_disposed());
        assert_eq!(preview.renderer().surface_count(), 0);
        assert_eq!(preview.audio().scheduled_count(), 0);

        // Post-dispose calls are inert
        preview.render_frame(20);
        preview.tick();
    }

    #[test]
    fn test_background_loading_pumps_completions() {
        let fx = Fixture::new();
        let (clip_id, _) = fx.add_audio_clip(0, 300);
        let fx_loader: Arc<dyn crate::audio::buffer::BufferLoader> = Arc::clone(&fx.loader) as _;
        let audio = AudioEngine::offline(44_100, 2, fx_loader);
        let mut preview = PreviewRenderer::new(
            RetainedRenderer::new(1280, 720),
            Arc::clone(&fx.timeline),
            Arc::clone(&fx.editor),
            Arc::clone(&fx.media),
            audio,
            Quality::Full,
        );

        preview.play();
        preview.render_frame(0); // dispatches the decode job
        assert_eq!(preview.audio().scheduled_count(), 0);

        // Wait for the worker to decode, then pump and re-reconcile
        let deadline = Instant::now() + Duration::from_secs(2);
        while preview.audio().scheduled_count() == 0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
            preview.tick();
            preview.render_frame(0);
        }
        assert!(preview.audio().source_state(clip_id).is_some());
        preview.dispose();
    }
}
