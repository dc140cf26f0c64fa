//! Time sources and timer services the limiters are driven by.
//!
//! A limiter never owns a thread. It asks a [`Scheduler`] for one callback at a
//! time and reads the current instant from a [`Clock`]. [`ThreadScheduler`] and
//! [`MonotonicClock`] cover the common case; with the `tokio` or `smol` feature
//! the timers can run on an async executor instead.

use std::{
    cmp::Ordering,
    collections::BinaryHeap,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::Arc,
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex, MutexGuard};

/// Callback handed to a [`Scheduler`].
pub type Callback = Box<dyn FnOnce() + Send + 'static>;

/// Monotonic source of "now".
pub trait Clock: Send + Sync + 'static {
    /// The current instant. Never goes backwards.
    fn now(&self) -> Instant;
}

/// [`Clock`] backed by [`Instant::now`].
#[derive(Clone, Copy, Debug, Default)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// One-shot timer service.
///
/// Implementations must run `callback` on some other thread or task, never on
/// the caller's stack before `schedule_once` returns: limiters call this while
/// holding their own lock, and the callback takes that same lock.
pub trait Scheduler: Send + Sync + 'static {
    /// Run `callback` once, no earlier than `delay` from now.
    fn schedule_once(&self, delay: Duration, callback: Callback);
}

impl<S: Scheduler + ?Sized> Scheduler for Arc<S> {
    fn schedule_once(&self, delay: Duration, callback: Callback) {
        (**self).schedule_once(delay, callback)
    }
}

struct TimerEntry {
    deadline: Instant,
    seq: u64,
    callback: Callback,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for TimerEntry {}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Reversed so the max-heap pops the earliest deadline first.
impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Default)]
struct TimerState {
    queue: BinaryHeap<TimerEntry>,
    next_seq: u64,
    shutdown: bool,
}

#[derive(Default)]
struct TimerShared {
    state: Mutex<TimerState>,
    wake: Condvar,
}

/// [`Scheduler`] running every callback on one dedicated background thread.
///
/// Callbacks fire in deadline order; ties fire in scheduling order. A panic in
/// a callback is logged and the thread keeps serving. Dropping the scheduler
/// discards callbacks that have not fired yet and joins the thread.
pub struct ThreadScheduler {
    shared: Arc<TimerShared>,
    worker: Option<JoinHandle<()>>,
}

impl ThreadScheduler {
    /// Start the timer thread.
    ///
    /// # Panics
    ///
    /// Panics if the OS refuses to create a thread, like [`std::thread::spawn`].
    pub fn new() -> Self {
        Self::try_new().unwrap_or_else(|err| panic!("failed to spawn timer thread: {err}"))
    }

    /// Start the timer thread, reporting spawn failures.
    pub fn try_new() -> std::io::Result<Self> {
        let shared = Arc::new(TimerShared::default());
        let worker_shared = shared.clone();

        let worker = thread::Builder::new()
            .name("holdback-timer".into())
            .spawn(move || Self::run(&worker_shared))?;

        Ok(Self {
            shared,
            worker: Some(worker),
        })
    } // end constructor

    /// Number of callbacks waiting to fire.
    pub fn pending(&self) -> usize {
        self.shared.state.lock().queue.len()
    }

    fn run(shared: &TimerShared) {
        let mut state = shared.state.lock();

        loop {
            if state.shutdown {
                break;
            }

            let Some(deadline) = state.queue.peek().map(|entry| entry.deadline) else {
                shared.wake.wait(&mut state);
                continue;
            };

            if deadline > Instant::now() {
                shared.wake.wait_until(&mut state, deadline);
                continue;
            }

            let Some(entry) = state.queue.pop() else {
                continue;
            };

            MutexGuard::unlocked(&mut state, || {
                if catch_unwind(AssertUnwindSafe(entry.callback)).is_err() {
                    tracing::error!("timer callback panicked");
                }
            });
        }

        tracing::debug!(discarded = state.queue.len(), "timer thread stopped");
    } // end method run
}

impl Default for ThreadScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for ThreadScheduler {
    fn schedule_once(&self, delay: Duration, callback: Callback) {
        let deadline = Instant::now() + delay;
        let mut state = self.shared.state.lock();
        let seq = state.next_seq;
        state.next_seq += 1;
        state.queue.push(TimerEntry {
            deadline,
            seq,
            callback,
        });
        drop(state);

        self.shared.wake.notify_one();
    }
}

impl Drop for ThreadScheduler {
    fn drop(&mut self) {
        self.shared.state.lock().shutdown = true;
        self.shared.wake.notify_one();

        if let Some(worker) = self.worker.take() {
            // Dropped from inside a callback: the worker is this thread.
            if worker.thread().id() != thread::current().id() {
                let _ = worker.join();
            }
        }
    }
}

/// [`Scheduler`] that sleeps on a Tokio runtime.
///
/// Callbacks run on the runtime's worker threads; held tasks should be short
/// or hand off to `spawn_blocking` themselves.
#[cfg(feature = "tokio")]
#[cfg_attr(docsrs, doc(cfg(feature = "tokio")))]
#[derive(Clone, Debug)]
pub struct TokioScheduler {
    handle: tokio::runtime::Handle,
}

#[cfg(feature = "tokio")]
impl TokioScheduler {
    /// Schedule onto `handle`.
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Schedule onto the runtime of the calling context.
    ///
    /// # Panics
    ///
    /// Panics outside a Tokio runtime, like [`tokio::runtime::Handle::current`].
    pub fn current() -> Self {
        Self::new(tokio::runtime::Handle::current())
    }
}

#[cfg(feature = "tokio")]
impl Scheduler for TokioScheduler {
    fn schedule_once(&self, delay: Duration, callback: Callback) {
        self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            callback();
        });
    }
}

/// [`Scheduler`] on the smol global executor.
#[cfg(feature = "smol")]
#[cfg_attr(docsrs, doc(cfg(feature = "smol")))]
#[derive(Clone, Copy, Debug, Default)]
pub struct SmolScheduler;

#[cfg(feature = "smol")]
impl Scheduler for SmolScheduler {
    fn schedule_once(&self, delay: Duration, callback: Callback) {
        smol::spawn(async move {
            smol::Timer::after(delay).await;
            callback();
        })
        .detach();
    }
}
