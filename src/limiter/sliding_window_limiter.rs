use std::{
    marker::PhantomData,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use parking_lot::Mutex;

use crate::{
    Clock, Limit, MonotonicClock, RateLimiter, Scheduler, Task, WindowDuration,
    limiter::{ExecutedLog, run_deferred},
    store::PendingStore,
};

/// Configuration for [`SlidingWindowLimiter`].
#[derive(Clone, Copy, Debug)]
pub struct SlidingWindowOptions {
    /// Length of the trailing window.
    pub duration: WindowDuration,
    /// Executions admitted per window.
    pub limit: Limit,
}

/// Exact sliding-window limiter: at most `limit` executions in any trailing
/// window of length `duration`.
///
/// # Algorithm
///
/// 1. **Submit:** drop logged executions older than the window. With a free
///    slot and nothing held, log `now` and run the task on the caller thread.
/// 2. **Hold:** otherwise park the task in the store. If no timer is
///    outstanding, arm one for the instant the oldest logged execution leaves
///    the window.
/// 3. **Timer:** release and log held tasks until the window is full or the
///    store is empty. Re-arm while work remains, otherwise go idle. The
///    released batch runs after the limiter lock is dropped.
///
/// Held tasks run on the scheduler's thread. A panicking held task is logged
/// and the remaining batch still runs.
///
/// # Thread Safety
///
/// - One mutex guards the execution log and every admission decision
/// - An `armed` flag keeps at most one timer outstanding
/// - A fresh submission never overtakes held work, so per-key order holds for
///   stores that keep keys FIFO
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
///
/// use holdback::{
///     Limit, RateLimiter, SlidingWindowLimiter, SlidingWindowOptions, ThreadScheduler,
///     WindowDuration,
/// };
/// use holdback::store::{RecencySwapStore, PendingStore};
/// use holdback::{MaxKeys, MaxPerKey};
///
/// let limiter = SlidingWindowLimiter::new(
///     SlidingWindowOptions {
///         duration: WindowDuration::from_millis(500).unwrap(),
///         limit: Limit::try_from(2).unwrap(),
///     },
///     RecencySwapStore::new(
///         MaxKeys::try_from(64).unwrap(),
///         MaxPerKey::try_from(16).unwrap(),
///     ),
///     Arc::new(ThreadScheduler::new()),
/// );
///
/// limiter.submit_fn("user_123", || println!("ran"));
/// assert!(limiter.store().len() <= 1);
/// ```
pub struct SlidingWindowLimiter<K, S> {
    inner: Arc<SlidingWindowInner<K, S>>,
}

struct SlidingWindowInner<K, S> {
    limit: Limit,
    store: S,
    scheduler: Arc<dyn Scheduler>,
    clock: Arc<dyn Clock>,
    armed: AtomicBool,
    log: Mutex<ExecutedLog>,
    _key: PhantomData<fn(K)>,
}

impl<K, S> SlidingWindowLimiter<K, S>
where
    K: Send + 'static,
    S: PendingStore<K, Task> + 'static,
{
    /// Create a limiter that parks overflow in `store` and drains it through
    /// `scheduler`.
    pub fn new(options: SlidingWindowOptions, store: S, scheduler: impl Scheduler) -> Self {
        Self::with_clock(options, store, scheduler, MonotonicClock)
    }

    /// Like [`new`](Self::new), reading time from `clock`.
    pub fn with_clock(
        options: SlidingWindowOptions,
        store: S,
        scheduler: impl Scheduler,
        clock: impl Clock,
    ) -> Self {
        Self {
            inner: Arc::new(SlidingWindowInner {
                limit: options.limit,
                store,
                scheduler: Arc::new(scheduler),
                clock: Arc::new(clock),
                armed: AtomicBool::new(false),
                log: Mutex::new(ExecutedLog::new(options.duration, options.limit)),
                _key: PhantomData,
            }),
        }
    } // end constructor

    /// Executions counted against the current window.
    pub fn executed_in_window(&self) -> usize {
        let now = self.inner.clock.now();
        let mut log = self.inner.log.lock();
        log.trim(now);
        log.len()
    }

    /// The pending store.
    pub fn store(&self) -> &S {
        &self.inner.store
    }
}

impl<K, S> SlidingWindowInner<K, S>
where
    K: Send + 'static,
    S: PendingStore<K, Task> + 'static,
{
    fn submit(self: &Arc<Self>, key: K, task: Task) {
        let now = self.clock.now();
        let mut log = self.log.lock();
        log.trim(now);

        if log.len() < *self.limit && self.store.is_empty() {
            log.record(now);
            drop(log);

            tracing::trace!("task admitted");
            task();
            return;
        }

        self.store.hold(key, task);
        tracing::debug!(held = self.store.len(), "task held");

        if self
            .armed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.arm(self.next_delay(&log, now));
        }
    } // end method submit

    fn next_delay(&self, log: &ExecutedLog, now: Instant) -> Duration {
        if log.len() < *self.limit {
            return Duration::ZERO;
        }

        log.until_slot_frees(now)
    }

    fn arm(self: &Arc<Self>, delay: Duration) {
        tracing::debug!(?delay, "release timer armed");

        let inner = Arc::clone(self);
        self.scheduler
            .schedule_once(delay, Box::new(move || inner.on_timer()));
    }

    fn on_timer(self: &Arc<Self>) {
        let now = self.clock.now();
        let mut released = Vec::new();

        {
            let mut log = self.log.lock();
            log.trim(now);

            while log.len() < *self.limit {
                let Some((_, task)) = self.store.release() else {
                    break;
                };
                log.record(now);
                released.push(task);
            }

            if self.store.is_empty() {
                self.armed.store(false, Ordering::Release);
                tracing::debug!("store drained, limiter idle");
            } else {
                self.arm(self.next_delay(&log, now));
            }
        }

        tracing::trace!(count = released.len(), "held tasks released");
        for task in released {
            run_deferred(task);
        }
    } // end method on_timer
}

impl<K, S> RateLimiter<K> for SlidingWindowLimiter<K, S>
where
    K: Send + 'static,
    S: PendingStore<K, Task> + 'static,
{
    fn submit(&self, key: K, task: Task) {
        self.inner.submit(key, task);
    }
}
