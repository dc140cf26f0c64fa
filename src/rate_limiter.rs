//! Entry point shared by every limiter.
//!
//! A [`RateLimiter`] accepts keyed tasks and decides, per its policy, whether a
//! task runs right away on the submitting thread or is parked in a
//! [`PendingStore`](crate::store::PendingStore) until capacity frees. Parked
//! tasks run later on the limiter's [`Scheduler`](crate::Scheduler).

use crate::Task;

/// Admission control over keyed tasks.
///
/// Every accepted task runs exactly once, unless the pending store evicts it
/// first. Within one key, tasks run in submission order.
pub trait RateLimiter<K>: Send + Sync {
    /// Run `task` now if the policy admits it, otherwise hold it under `key`.
    ///
    /// An admitted task runs on the calling thread before `submit` returns, so
    /// a panic in it reaches the caller. Held tasks run on the scheduler and
    /// their panics are caught and logged.
    fn submit(&self, key: K, task: Task);

    /// [`submit`](Self::submit) for a closure.
    fn submit_fn<F>(&self, key: K, f: F)
    where
        F: FnOnce() + Send + 'static,
        Self: Sized,
    {
        self.submit(key, Box::new(f));
    }
}
