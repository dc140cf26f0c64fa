//! Rate limiter implementations.
//!
//! Every limiter keeps its admission state behind one mutex, parks overflow in a
//! [`PendingStore`](crate::store::PendingStore) and drives deferred execution
//! with at most one outstanding timer.
//!
//! # Strategies
//!
//! - [`SlidingWindowLimiter`]: at most `limit` executions in any trailing
//!   window; held work bursts out as slots free
//! - [`UniformSlidingWindowLimiter`]: same window, one release per timer fire,
//!   spacing stretched toward `duration / limit`
//! - [`LoadBudgetLimiter`]: bounded load counter drained on a fixed tick
//!
//! # Lock order
//!
//! Limiter lock first, store lock second. Stores never call back into a
//! limiter, and tasks always run with no limiter lock held.

use std::{
    any::Any,
    collections::VecDeque,
    panic::{AssertUnwindSafe, catch_unwind},
    time::{Duration, Instant},
};

use crate::{Limit, Task, WindowDuration, common::PREALLOCATE_MAX};

mod load_budget_limiter;
pub use load_budget_limiter::*;

mod sliding_window_limiter;
pub use sliding_window_limiter::*;

mod uniform_sliding_window_limiter;
pub use uniform_sliding_window_limiter::*;

/// Instants of past executions, oldest first.
///
/// An execution at `t` counts against the window `(now - duration, now]`, so it
/// stops counting once `now - t >= duration`.
pub(crate) struct ExecutedLog {
    duration: Duration,
    executed: VecDeque<Instant>,
}

impl ExecutedLog {
    pub(crate) fn new(duration: WindowDuration, limit: Limit) -> Self {
        Self {
            duration: *duration,
            executed: VecDeque::with_capacity((*limit).min(PREALLOCATE_MAX)),
        }
    }

    pub(crate) fn trim(&mut self, now: Instant) {
        while let Some(&oldest) = self.executed.front()
            && now.saturating_duration_since(oldest) >= self.duration
        {
            self.executed.pop_front();
        }
    }

    pub(crate) fn record(&mut self, now: Instant) {
        self.executed.push_back(now);
    }

    pub(crate) fn len(&self) -> usize {
        self.executed.len()
    }

    /// Time until the oldest logged execution leaves the window.
    pub(crate) fn until_slot_frees(&self, now: Instant) -> Duration {
        self.executed.front().map_or(Duration::ZERO, |&oldest| {
            self.duration
                .saturating_sub(now.saturating_duration_since(oldest))
        })
    }
}

/// Run a held task, logging instead of unwinding into the timer.
pub(crate) fn run_deferred(task: Task) {
    if let Err(payload) = catch_unwind(AssertUnwindSafe(task)) {
        tracing::error!(panic = panic_message(payload.as_ref()), "held task panicked");
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&'static str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
