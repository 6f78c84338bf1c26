//! Background worker pool for load/decode jobs.
//!
//! The render path never blocks on IO: image reads and audio-buffer decodes
//! are pushed here and their completions are delivered back over channels,
//! drained cooperatively on the next tick.
//!
//! Epoch mechanism: every job can be tagged with the render epoch current
//! at enqueue time. The tag is checked when a worker picks the job up, so
//! work made stale by a newer seek or render pass is skipped before it ever
//! runs. Completions carry the tag too, letting the consumer discard
//! results that raced with a newer frame.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::deque::Injector;
use log::trace;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Shared render-generation counter.
///
/// Bumped by the preview renderer at the start of every render pass and on
/// seek/dispose. Anything holding a smaller value is stale.
#[derive(Clone, Debug, Default)]
pub struct Epoch(Arc<AtomicU64>);

impl Epoch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    pub fn bump(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn is_current(&self, tag: u64) -> bool {
        self.current() == tag
    }
}

/// Fixed-size worker pool fed through a global injector queue.
pub struct Workers {
    injector: Arc<Injector<Job>>,
    handles: Vec<thread::JoinHandle<()>>,
    epoch: Epoch,
    shutdown: Arc<AtomicBool>,
}

impl Workers {
    pub fn new(num_threads: usize, epoch: Epoch) -> Self {
        let injector: Arc<Injector<Job>> = Arc::new(Injector::new());
        let shutdown = Arc::new(AtomicBool::new(false));
        let mut handles = Vec::new();

        for worker_id in 0..num_threads.max(1) {
            let injector = Arc::clone(&injector);
            let shutdown = Arc::clone(&shutdown);
            let handle = thread::Builder::new()
                .name(format!("prevu-worker-{worker_id}"))
                .spawn(move || {
                    trace!("worker {worker_id} started");
                    loop {
                        if let Some(job) = injector.steal().success() {
                            job();
                            continue;
                        }
                        if shutdown.load(Ordering::Relaxed) {
                            break;
                        }
                        // Idle: short sleep instead of spinning
                        thread::sleep(Duration::from_millis(1));
                    }
                    trace!("worker {worker_id} stopped");
                })
                .expect("failed to spawn worker thread");
            handles.push(handle);
        }

        Self {
            injector,
            handles,
            epoch,
            shutdown,
        }
    }

    /// Run a job on a worker thread.
    pub fn execute<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.injector.push(Box::new(f));
    }

    /// Run a job only if the epoch still matches when a worker picks it up.
    ///
    /// The check happens at execution time, not enqueue time, so a seek that
    /// bumps the epoch after enqueue silently cancels the job.
    pub fn execute_with_epoch<F>(&self, tag: u64, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let epoch = self.epoch.clone();
        self.injector.push(Box::new(move || {
            if epoch.is_current(tag) {
                f();
            }
        }));
    }

    pub fn epoch(&self) -> &Epoch {
        &self.epoch
    }
}

impl Drop for Workers {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);

        // Bounded wait; workers between jobs exit within one sleep cycle.
        let deadline = Instant::now() + Duration::from_millis(500);
        let handles = std::mem::take(&mut self.handles);
        for handle in handles {
            while !handle.is_finished() {
                if Instant::now() >= deadline {
                    trace!("worker shutdown timeout, detaching");
                    return;
                }
                thread::sleep(Duration::from_millis(1));
            }
            let _ = handle.join();
        }
    }
}
