//! Pending stores: where a limiter parks work it cannot run yet.
//!
//! A store decides two things. Which held item to drop when it is full, and
//! which held item to hand back when the limiter frees a slot.
//!
//! # Strategies
//!
//! - [`RecencySwapStore`]: per-key ring buffers, warmest key served first,
//!   coldest key dropped wholesale under key pressure
//! - [`WeightedRandomStore`]: eviction weighted by backlog, release uniform
//!   across keys
//! - [`FifoStore`]: unbounded queue in submission order
//!
//! Every store serializes its own operations, so one instance can be shared by
//! submitting threads and the timer thread.

use std::collections::VecDeque;

use parking_lot::Mutex;

mod recency_swap_store;
pub use recency_swap_store::*;

mod weighted_random_store;
pub use weighted_random_store::*;

/// Called with every item a bounded store discards.
pub type EvictionHook<K, T> = Box<dyn Fn(K, T) + Send + Sync>;

/// Holding area for work a limiter has deferred.
pub trait PendingStore<K, T>: Send + Sync {
    /// Park `item` under `key`, possibly evicting something else.
    fn hold(&self, key: K, item: T);

    /// Take the next item to run, as chosen by the strategy.
    fn release(&self) -> Option<(K, T)>;

    /// `true` when nothing is held.
    fn is_empty(&self) -> bool;

    /// Number of held items.
    fn len(&self) -> usize;
}

/// Unbounded first-in first-out store.
pub struct FifoStore<K, T> {
    queue: Mutex<VecDeque<(K, T)>>,
}

impl<K, T> FifoStore<K, T> {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
        }
    }
}

impl<K, T> Default for FifoStore<K, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Send, T: Send> PendingStore<K, T> for FifoStore<K, T> {
    fn hold(&self, key: K, item: T) {
        self.queue.lock().push_back((key, item));
    }

    fn release(&self) -> Option<(K, T)> {
        self.queue.lock().pop_front()
    }

    fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    fn len(&self) -> usize {
        self.queue.lock().len()
    }
}
