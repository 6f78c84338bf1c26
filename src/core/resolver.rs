//! ClipResolver - answers "which clips are active at frame F".
//!
//! # Architecture
//!
//! Two-level laziness:
//! 1. An interval index (`ClipInterval` entries sorted by start frame),
//!    rebuilt on the first query after any structural store mutation.
//! 2. A per-frame result cache (insertion-order bounded, FIFO eviction -
//!    deliberately not LRU: a hit does not refresh an entry's position).
//!
//! The index scan is linear over start-sorted entries with early exit once
//! `start > frame`. An interval tree would make lookup O(log n); the sort
//! is for scan locality, not asymptotics, and clip counts in a timeline
//! stay small enough that the cache does the heavy lifting.
//!
//! Invalidation is wired through the timeline's change subscription: every
//! structural mutation (clips, tracks, settings) clears the cache and marks
//! the index dirty. Playhead moves do not invalidate.
//!
//! Missing tracks or assets never raise - stale references are filtered
//! out of the index at rebuild time.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use indexmap::IndexMap;
use log::{debug, trace};
use uuid::Uuid;

use crate::entities::{ActiveClip, Clip, Track, TrackKind};
use crate::stores::TimelineStore;

/// Default bound on the per-frame result cache.
pub const DEFAULT_CACHE_CAPACITY: usize = 100;

/// Resolver-internal index entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClipInterval {
    pub clip_id: Uuid,
    pub start_frame: i64,
    /// Exclusive end frame.
    pub end_frame: i64,
    pub track_order: i32,
}

/// Hit/miss counters for the per-frame cache.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheStats {
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn hit_rate(&self) -> f64 {
        let total = self.hits() + self.misses();
        if total == 0 {
            0.0
        } else {
            self.hits() as f64 / total as f64
        }
    }
}

struct ResolverInner {
    /// Start-sorted intervals over clips on visible tracks.
    index: Vec<ClipInterval>,
    /// Clip snapshot taken at rebuild, keyed by id.
    clips: HashMap<Uuid, Clip>,
    /// Visible-track snapshot taken at rebuild, keyed by id.
    tracks: HashMap<Uuid, Track>,
    dirty: bool,
    /// frame -> resolved active set; insertion-ordered for FIFO eviction.
    cache: IndexMap<i64, Arc<[ActiveClip]>>,
    capacity: usize,
}

/// Interval-indexed, cached active-set resolution.
pub struct ClipResolver {
    timeline: Arc<TimelineStore>,
    inner: Mutex<ResolverInner>,
    stats: Arc<CacheStats>,
}

impl ClipResolver {
    pub fn new(timeline: Arc<TimelineStore>) -> Self {
        Self::with_cache_capacity(timeline, DEFAULT_CACHE_CAPACITY)
    }

    pub fn with_cache_capacity(timeline: Arc<TimelineStore>, capacity: usize) -> Self {
        Self {
            timeline,
            inner: Mutex::new(ResolverInner {
                index: Vec::new(),
                clips: HashMap::new(),
                tracks: HashMap::new(),
                dirty: true,
                cache: IndexMap::new(),
                capacity: capacity.max(1),
            }),
            stats: Arc::new(CacheStats::default()),
        }
    }

    /// Create a resolver already wired to the store's change subscription.
    ///
    /// Structural mutations invalidate; the subscription holds only a weak
    /// reference so dropping the resolver does not leak through the store.
    pub fn attach(timeline: &Arc<TimelineStore>) -> Arc<Self> {
        let resolver = Arc::new(Self::new(Arc::clone(timeline)));
        let weak = Arc::downgrade(&resolver);
        timeline.subscribe(move |event| {
            if event.is_structural()
                && let Some(resolver) = weak.upgrade()
            {
                resolver.invalidate_cache();
            }
        });
        resolver
    }

    /// All clips active at `frame`, ascending by track order.
    ///
    /// Hidden tracks are excluded at index-rebuild time. Results are shared
    /// (`Arc<[ActiveClip]>`) so repeated queries and filtered views never
    /// copy the underlying clips.
    pub fn get_active_clips(&self, frame: i64) -> Arc<[ActiveClip]> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if inner.dirty {
            Self::rebuild(&self.timeline, &mut inner);
        }

        if let Some(hit) = inner.cache.get(&frame) {
            // FIFO, not LRU: a hit does not refresh the entry's position.
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
            return Arc::clone(hit);
        }
        self.stats.misses.fetch_add(1, Ordering::Relaxed);

        let resolved = Self::resolve(&inner, frame);
        while inner.cache.len() >= inner.capacity {
            inner.cache.shift_remove_index(0);
        }
        inner.cache.insert(frame, Arc::clone(&resolved));
        resolved
    }

    /// Active clips on tracks of the given kind.
    pub fn get_active_clips_by_kind(&self, frame: i64, kind: TrackKind) -> Vec<ActiveClip> {
        self.get_active_clips(frame)
            .iter()
            .filter(|a| a.track.kind == kind)
            .cloned()
            .collect()
    }

    pub fn get_active_video_clips(&self, frame: i64) -> Vec<ActiveClip> {
        self.get_active_clips_by_kind(frame, TrackKind::Video)
    }

    /// Active audio clips, additionally excluding muted tracks.
    pub fn get_active_audio_clips(&self, frame: i64) -> Vec<ActiveClip> {
        self.get_active_clips(frame)
            .iter()
            .filter(|a| a.track.kind == TrackKind::Audio && !a.track.muted)
            .cloned()
            .collect()
    }

    pub fn get_active_text_clips(&self, frame: i64) -> Vec<ActiveClip> {
        self.get_active_clips_by_kind(frame, TrackKind::Text)
    }

    /// Whether any clip is active at `frame`, without building the result
    /// array or touching the cache.
    pub fn has_active_clips(&self, frame: i64) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if inner.dirty {
            Self::rebuild(&self.timeline, &mut inner);
        }
        for interval in &inner.index {
            if interval.start_frame > frame {
                break;
            }
            if frame < interval.end_frame {
                return true;
            }
        }
        false
    }

    /// Inclusive (first, last) covered frame across all indexed clips, or
    /// `None` when no clip covers any frame.
    pub fn get_active_frame_range(&self) -> Option<(i64, i64)> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if inner.dirty {
            Self::rebuild(&self.timeline, &mut inner);
        }
        let mut range: Option<(i64, i64)> = None;
        for interval in &inner.index {
            if interval.end_frame <= interval.start_frame {
                continue; // zero-length placement covers nothing
            }
            let last = interval.end_frame - 1;
            range = Some(match range {
                Some((min, max)) => (min.min(interval.start_frame), max.max(last)),
                None => (interval.start_frame, last),
            });
        }
        range
    }

    /// Clear the cache and mark the index dirty.
    pub fn invalidate_cache(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.cache.clear();
        inner.dirty = true;
        trace!("resolver invalidated");
    }

    /// Force an index rebuild now instead of on the next query.
    pub fn rebuild_index(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        Self::rebuild(&self.timeline, &mut inner);
    }

    pub fn stats(&self) -> Arc<CacheStats> {
        Arc::clone(&self.stats)
    }

    pub fn cached_frames(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .cache
            .len()
    }

    fn rebuild(timeline: &TimelineStore, inner: &mut ResolverInner) {
        let clips = timeline.clips();
        let tracks = timeline.tracks();

        inner.tracks = tracks
            .iter()
            .filter(|t| !t.hidden)
            .map(|t| (t.id, t.clone()))
            .collect();

        inner.index.clear();
        inner.clips.clear();
        for clip in clips {
            // Clips on hidden or missing tracks are filtered, not an error.
            let Some(track) = inner.tracks.get(&clip.track_id) else {
                continue;
            };
            inner.index.push(ClipInterval {
                clip_id: clip.id,
                start_frame: clip.start_time,
                end_frame: clip.end_time(),
                track_order: track.order,
            });
            inner.clips.insert(clip.id, clip);
        }
        inner.index.sort_by_key(|iv| iv.start_frame);
        inner.dirty = false;
        debug!("resolver index rebuilt: {} intervals", inner.index.len());
    }

    fn resolve(inner: &ResolverInner, frame: i64) -> Arc<[ActiveClip]> {
        let mut hits: Vec<&ClipInterval> = Vec::new();
        for interval in &inner.index {
            if interval.start_frame > frame {
                break;
            }
            if frame < interval.end_frame {
                hits.push(interval);
            }
        }
        // Stable sort keeps index (start-frame) order among same-order tracks.
        hits.sort_by_key(|iv| iv.track_order);

        let resolved: Vec<ActiveClip> = hits
            .into_iter()
            .filter_map(|iv| {
                let clip = inner.clips.get(&iv.clip_id)?;
                let track = inner.tracks.get(&clip.track_id)?;
                Some(ActiveClip::new(clip.clone(), track.clone(), frame))
            })
            .collect();
        resolved.into()
    }
}
