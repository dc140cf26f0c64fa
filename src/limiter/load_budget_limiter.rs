use std::{
    marker::PhantomData,
    sync::{
        Arc, Weak,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use crate::{
    LoadRate, MaxLoad, RateLimiter, Scheduler, Task, limiter::run_deferred, store::PendingStore,
};

/// Configuration for [`LoadBudgetLimiter`].
#[derive(Clone, Copy, Debug)]
pub struct LoadBudgetOptions {
    /// Ticks per second.
    pub load_rate: LoadRate,
    /// Ceiling of the load counter.
    pub max_load: MaxLoad,
}

/// Limiter over a bounded load counter.
///
/// Each admitted submission adds one unit of load. A tick every
/// `1 / load_rate` seconds either runs one held task (the load stays where it
/// is, the released task takes over the freed unit) or, when nothing is held,
/// takes one unit off.
///
/// Under sustained overload the limiter settles at `load_rate` executions per
/// second; after an idle spell it admits a burst of up to `max_load`.
///
/// The limiter schedules its own ticks on the given [`Scheduler`]. The timer
/// only holds a weak reference, so ticking stops once the limiter is dropped.
/// [`tick`](Self::tick) can also be called directly.
pub struct LoadBudgetLimiter<K, S> {
    inner: Arc<LoadBudgetInner<K, S>>,
}

struct LoadBudgetInner<K, S> {
    max_load: MaxLoad,
    period: Duration,
    load: AtomicU64,
    store: S,
    scheduler: Arc<dyn Scheduler>,
    _key: PhantomData<fn(K)>,
}

impl<K, S> LoadBudgetLimiter<K, S>
where
    K: Send + 'static,
    S: PendingStore<K, Task> + 'static,
{
    /// Create a limiter and start its tick.
    pub fn new(options: LoadBudgetOptions, store: S, scheduler: impl Scheduler) -> Self {
        let inner = Arc::new(LoadBudgetInner {
            max_load: options.max_load,
            period: options.load_rate.period(),
            load: AtomicU64::new(0),
            store,
            scheduler: Arc::new(scheduler),
            _key: PhantomData,
        });

        tracing::debug!(period = ?inner.period, max_load = *inner.max_load, "load ticker started");
        LoadBudgetInner::schedule_tick(&inner);

        Self { inner }
    } // end constructor

    /// Run one held task, or shed one unit of load when nothing is held.
    ///
    /// A released task runs on the calling thread; a panic in it is logged.
    pub fn tick(&self) {
        self.inner.tick();
    }

    /// Current load.
    pub fn load(&self) -> u64 {
        self.inner.load.load(Ordering::Acquire)
    }

    /// Time between two ticks.
    pub fn period(&self) -> Duration {
        self.inner.period
    }

    /// The pending store.
    pub fn store(&self) -> &S {
        &self.inner.store
    }
}

impl<K, S> LoadBudgetInner<K, S>
where
    K: Send + 'static,
    S: PendingStore<K, Task> + 'static,
{
    fn schedule_tick(this: &Arc<Self>) {
        let weak: Weak<Self> = Arc::downgrade(this);

        this.scheduler.schedule_once(
            this.period,
            Box::new(move || {
                let Some(inner) = weak.upgrade() else {
                    tracing::debug!("limiter dropped, load ticker stopped");
                    return;
                };

                inner.tick();
                Self::schedule_tick(&inner);
            }),
        );
    }

    fn tick(&self) {
        match self.store.release() {
            Some((_, task)) => {
                tracing::trace!("held task released");
                run_deferred(task);
            }
            None => {
                self.try_decrement();
            }
        }
    }

    fn submit(&self, key: K, task: Task) {
        if self.try_increment() {
            tracing::trace!("task admitted");
            task();
            return;
        }

        self.store.hold(key, task);
        tracing::debug!(held = self.store.len(), "task held");
    }

    fn try_increment(&self) -> bool {
        let mut current = self.load.load(Ordering::Acquire);

        loop {
            if current >= *self.max_load {
                return false;
            }

            match self.load.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    fn try_decrement(&self) -> bool {
        let mut current = self.load.load(Ordering::Acquire);

        loop {
            if current == 0 {
                return false;
            }

            match self.load.compare_exchange_weak(
                current,
                current - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }
}

impl<K, S> RateLimiter<K> for LoadBudgetLimiter<K, S>
where
    K: Send + 'static,
    S: PendingStore<K, Task> + 'static,
{
    fn submit(&self, key: K, task: Task) {
        self.inner.submit(key, task);
    }
}
