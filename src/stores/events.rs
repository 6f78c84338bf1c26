//! Change notification for the store layer.
//!
//! A deliberately minimal on-change capability: components register a
//! callback and stores invoke every callback synchronously after each
//! mutation. No queueing, no deferred delivery - subscribers that need
//! batching keep their own pending state and drain it on their next tick.
//!
//! Callback order: FIFO (first-subscribed, first-called).

use std::sync::{Arc, RwLock};

/// Events emitted by [`TimelineStore`](super::TimelineStore).
///
/// Structural events (`ClipsChanged`, `TracksChanged`, `SettingsChanged`)
/// invalidate derived state such as the resolver's interval index.
/// `PlayheadChanged` is positional only and leaves derived state valid.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TimelineEvent {
    /// A clip was added, removed or updated.
    ClipsChanged,
    /// A track was added, removed or updated (including hidden/muted flags).
    TracksChanged,
    /// fps / duration / zoom changed.
    SettingsChanged,
    /// The playhead moved.
    PlayheadChanged { old_frame: i64, new_frame: i64 },
}

impl TimelineEvent {
    /// Whether this event invalidates clip/track-derived state.
    pub fn is_structural(&self) -> bool {
        !matches!(self, TimelineEvent::PlayheadChanged { .. })
    }
}

type Callback<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Synchronous subscriber registry shared by the stores.
pub struct ChangeHub<E> {
    subscribers: Arc<RwLock<Vec<Callback<E>>>>,
}

impl<E> Default for ChangeHub<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Clone for ChangeHub<E> {
    fn clone(&self) -> Self {
        Self {
            subscribers: Arc::clone(&self.subscribers),
        }
    }
}

impl<E> ChangeHub<E> {
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Register a callback invoked synchronously on every emission.
    pub fn subscribe<F>(&self, callback: F)
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(Arc::new(callback));
    }

    /// Invoke all callbacks with the event.
    pub fn emit(&self, event: &E) {
        // Clone the callback list so subscribers may re-enter the store.
        let callbacks: Vec<Callback<E>> = self
            .subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        for cb in callbacks {
            cb(event);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};

    #[test]
    fn test_subscribe_emit() {
        let hub: ChangeHub<TimelineEvent> = ChangeHub::new();
        let counter = Arc::new(AtomicI64::new(0));
        let c = Arc::clone(&counter);
        hub.subscribe(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        hub.emit(&TimelineEvent::ClipsChanged);
        hub.emit(&TimelineEvent::TracksChanged);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_structural_classification() {
        assert!(TimelineEvent::ClipsChanged.is_structural());
        assert!(TimelineEvent::TracksChanged.is_structural());
        assert!(TimelineEvent::SettingsChanged.is_structural());
        assert!(
            !TimelineEvent::PlayheadChanged {
                old_frame: 0,
                new_frame: 5
            }
            .is_structural()
        );
    }
}
