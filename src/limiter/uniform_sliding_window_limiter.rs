use std::{
    marker::PhantomData,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex};

use crate::{
    Clock, Limit, MonotonicClock, RateLimiter, Scheduler, Task, UniformingRate, WindowDuration,
    limiter::{ExecutedLog, run_deferred},
    store::PendingStore,
};

/// Configuration for [`UniformSlidingWindowLimiter`].
#[derive(Clone, Copy, Debug)]
pub struct UniformSlidingWindowOptions {
    /// Length of the trailing window.
    pub duration: WindowDuration,
    /// Executions admitted per window.
    pub limit: Limit,
    /// Blend between releasing as soon as a slot frees (`0`) and releasing
    /// every `duration / limit` (`1`).
    pub uniforming_rate: UniformingRate,
}

/// Sliding-window limiter that spreads held work across the window.
///
/// Admission is the same as [`SlidingWindowLimiter`](crate::SlidingWindowLimiter).
/// The difference is on the release side: each timer fire releases at most one
/// held task, and the next fire is scheduled by
///
/// ```text
/// interval = duration / limit
/// base     = time until the oldest execution leaves the window (0 if a slot is free)
/// delay    = base                                       if base >= interval
///          = base + uniforming_rate * (interval - base) otherwise
/// ```
///
/// With `uniforming_rate = 1` consecutive releases are at least `interval`
/// apart; with `0` they fire as soon as the window allows.
///
/// [`await_drain`](Self::await_drain) blocks until every held task has been
/// released and has finished running.
pub struct UniformSlidingWindowLimiter<K, S> {
    inner: Arc<UniformInner<K, S>>,
}

struct UniformState {
    log: ExecutedLog,
    running: usize,
}

struct UniformInner<K, S> {
    limit: Limit,
    interval: Duration,
    uniforming_rate: UniformingRate,
    store: S,
    scheduler: Arc<dyn Scheduler>,
    clock: Arc<dyn Clock>,
    armed: AtomicBool,
    state: Mutex<UniformState>,
    drained: Condvar,
    _key: PhantomData<fn(K)>,
}

impl<K, S> UniformSlidingWindowLimiter<K, S>
where
    K: Send + 'static,
    S: PendingStore<K, Task> + 'static,
{
    /// Create a limiter that parks overflow in `store` and drains it through
    /// `scheduler`.
    pub fn new(options: UniformSlidingWindowOptions, store: S, scheduler: impl Scheduler) -> Self {
        Self::with_clock(options, store, scheduler, MonotonicClock)
    }

    /// Like [`new`](Self::new), reading time from `clock`.
    pub fn with_clock(
        options: UniformSlidingWindowOptions,
        store: S,
        scheduler: impl Scheduler,
        clock: impl Clock,
    ) -> Self {
        let interval = options.duration.div_f64(*options.limit as f64);

        Self {
            inner: Arc::new(UniformInner {
                limit: options.limit,
                interval,
                uniforming_rate: options.uniforming_rate,
                store,
                scheduler: Arc::new(scheduler),
                clock: Arc::new(clock),
                armed: AtomicBool::new(false),
                state: Mutex::new(UniformState {
                    log: ExecutedLog::new(options.duration, options.limit),
                    running: 0,
                }),
                drained: Condvar::new(),
                _key: PhantomData,
            }),
        }
    } // end constructor

    /// Block until the store is empty and no released task is still running.
    ///
    /// Returns at once when nothing is held. Tasks submitted while waiting
    /// extend the wait.
    pub fn await_drain(&self) {
        let mut state = self.inner.state.lock();
        while !self.inner.is_drained(&state) {
            self.inner.drained.wait(&mut state);
        }
    }

    /// [`await_drain`](Self::await_drain) giving up after `timeout`.
    ///
    /// Returns `true` if the limiter drained in time.
    pub fn await_drain_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.inner.state.lock();

        while !self.inner.is_drained(&state) {
            if self
                .inner
                .drained
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                return self.inner.is_drained(&state);
            }
        }

        true
    }

    /// Time between releases at `uniforming_rate = 1`.
    pub fn uniform_interval(&self) -> Duration {
        self.inner.interval
    }

    /// Executions counted against the current window.
    pub fn executed_in_window(&self) -> usize {
        let now = self.inner.clock.now();
        let mut state = self.inner.state.lock();
        state.log.trim(now);
        state.log.len()
    }

    /// The pending store.
    pub fn store(&self) -> &S {
        &self.inner.store
    }
}

impl<K, S> UniformInner<K, S>
where
    K: Send + 'static,
    S: PendingStore<K, Task> + 'static,
{
    fn is_drained(&self, state: &UniformState) -> bool {
        state.running == 0 && self.store.is_empty()
    }

    fn submit(self: &Arc<Self>, key: K, task: Task) {
        let now = self.clock.now();
        let mut state = self.state.lock();
        state.log.trim(now);

        if state.log.len() < *self.limit && self.store.is_empty() {
            state.log.record(now);
            drop(state);
            self.drained.notify_all();

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
            self.arm(self.next_delay(&state.log, now));
        }
    } // end method submit

    fn next_delay(&self, log: &ExecutedLog, now: Instant) -> Duration {
        let base = if log.len() >= *self.limit {
            log.until_slot_frees(now)
        } else {
            Duration::ZERO
        };

        if base >= self.interval {
            return base;
        }

        base + (self.interval - base).mul_f64(*self.uniforming_rate)
    }

    fn arm(self: &Arc<Self>, delay: Duration) {
        tracing::debug!(?delay, "release timer armed");

        let inner = Arc::clone(self);
        self.scheduler
            .schedule_once(delay, Box::new(move || inner.on_timer()));
    }

    fn on_timer(self: &Arc<Self>) {
        let now = self.clock.now();

        let released = {
            let mut state = self.state.lock();
            state.log.trim(now);

            let released = if state.log.len() < *self.limit {
                self.store.release()
            } else {
                None
            };
            if released.is_some() {
                state.log.record(now);
                state.running += 1;
            }

            if self.store.is_empty() {
                self.armed.store(false, Ordering::Release);
                tracing::debug!("store drained, limiter idle");
            } else {
                self.arm(self.next_delay(&state.log, now));
            }

            released
        };

        let Some((_, task)) = released else {
            self.drained.notify_all();
            return;
        };

        tracing::trace!("held task released");
        run_deferred(task);

        self.state.lock().running -= 1;
        self.drained.notify_all();
    } // end method on_timer
}

impl<K, S> RateLimiter<K> for UniformSlidingWindowLimiter<K, S>
where
    K: Send + 'static,
    S: PendingStore<K, Task> + 'static,
{
    fn submit(&self, key: K, task: Task) {
        self.inner.submit(key, task);
    }
}
