use std::{
    collections::{BTreeMap, HashMap},
    hash::Hash,
    sync::Arc,
    time::Instant,
};

use parking_lot::Mutex;

use crate::{
    Clock, MaxKeys, MaxPerKey, MonotonicClock, Timestamped,
    common::PREALLOCATE_MAX,
    ds::RingBuffer,
    store::{EvictionHook, PendingStore},
};

/// Position of a key in the recency order: last hold instant, then a sequence
/// number so keys touched within the same instant stay distinct.
type Recency = Timestamped<u64>;

struct KeyQueue<T> {
    recency: Recency,
    buffer: RingBuffer<Timestamped<T>>,
}

struct RecencyState<K, T> {
    order: BTreeMap<Recency, K>,
    queues: HashMap<K, KeyQueue<T>>,
    next_seq: u64,
    len: usize,
}

impl<K, T> RecencyState<K, T> {
    fn next_recency(&mut self, now: Instant) -> Recency {
        let seq = self.next_seq;
        self.next_seq += 1;
        Timestamped::new(seq, now)
    }
}

/// Store bounded by two caps: number of keys and items per key.
///
/// Each key owns a ring buffer of at most `max_per_key` items; a full buffer
/// silently overwrites its oldest item. When a new key arrives while
/// `max_keys` keys are tracked, the key held least recently is dropped with
/// its whole backlog.
///
/// Release serves the key held most recently. A key keeps its place after a
/// release, so repeated releases drain the hot key's backlog until a fresher
/// hold elsewhere overtakes it.
///
/// # Complexity
///
/// `hold` and `release` are O(log k) for k tracked keys.
pub struct RecencySwapStore<K, T> {
    max_keys: MaxKeys,
    max_per_key: MaxPerKey,
    clock: Arc<dyn Clock>,
    on_evict: Option<EvictionHook<K, T>>,
    inner: Mutex<RecencyState<K, T>>,
}

impl<K, T> RecencySwapStore<K, T>
where
    K: Eq + Hash + Clone,
{
    /// Create an empty store.
    pub fn new(max_keys: MaxKeys, max_per_key: MaxPerKey) -> Self {
        Self {
            max_keys,
            max_per_key,
            clock: Arc::new(MonotonicClock),
            on_evict: None,
            inner: Mutex::new(RecencyState {
                order: BTreeMap::new(),
                queues: HashMap::with_capacity((*max_keys).min(PREALLOCATE_MAX)),
                next_seq: 0,
                len: 0,
            }),
        }
    }

    /// Report every discarded item to `hook`: ring overwrites and dropped
    /// cold-key backlogs alike. The hook runs after the store lock is released.
    pub fn with_eviction_hook(mut self, hook: impl Fn(K, T) + Send + Sync + 'static) -> Self {
        self.on_evict = Some(Box::new(hook));
        self
    }

    /// Read hold instants from `clock` instead of the system monotonic clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Number of keys with at least one held item.
    pub fn key_count(&self) -> usize {
        self.inner.lock().queues.len()
    }

    /// Items held under `key`.
    pub fn held_for(&self, key: &K) -> usize {
        self.inner
            .lock()
            .queues
            .get(key)
            .map_or(0, |queue| queue.buffer.len())
    }

    /// When the oldest item still held under `key` was held.
    pub fn oldest_held_at(&self, key: &K) -> Option<Instant> {
        self.inner
            .lock()
            .queues
            .get(key)
            .and_then(|queue| queue.buffer.peek())
            .map(|item| item.timestamp)
    }

    fn report(&self, evicted: Vec<(K, T)>) {
        if evicted.is_empty() {
            return;
        }

        tracing::debug!(count = evicted.len(), "recency store discarded held items");

        if let Some(hook) = &self.on_evict {
            for (key, item) in evicted {
                hook(key, item);
            }
        }
    }
}

impl<K, T> PendingStore<K, T> for RecencySwapStore<K, T>
where
    K: Eq + Hash + Clone + Send,
    T: Send,
{
    fn hold(&self, key: K, item: T) {
        let now = self.clock.now();
        let mut evicted = Vec::new();

        {
            let mut guard = self.inner.lock();
            let state = &mut *guard;
            let recency = state.next_recency(now);

            if let Some(queue) = state.queues.get_mut(&key) {
                let previous = std::mem::replace(&mut queue.recency, recency);
                match queue.buffer.put(Timestamped::new(item, now)) {
                    Some(overwritten) => evicted.push((key.clone(), overwritten.into_inner())),
                    None => state.len += 1,
                }

                state.order.remove(&previous);
                state.order.insert(recency, key);
            } else {
                if state.queues.len() >= *self.max_keys
                    && let Some((_, cold)) = state.order.pop_first()
                {
                    let Some(mut queue) = state.queues.remove(&cold) else {
                        unreachable!("RecencySwapStore::hold: ordered key has no queue");
                    };

                    state.len -= queue.buffer.len();
                    while let Some(dropped) = queue.buffer.pop() {
                        evicted.push((cold.clone(), dropped.into_inner()));
                    }
                }

                let mut buffer = RingBuffer::bounded(self.max_per_key);
                buffer.put(Timestamped::new(item, now));
                state.len += 1;

                state.queues.insert(key.clone(), KeyQueue { recency, buffer });
                state.order.insert(recency, key);
            }
        }

        self.report(evicted);
    } // end method hold

    fn release(&self) -> Option<(K, T)> {
        let mut guard = self.inner.lock();
        let state = &mut *guard;

        let (recency, key) = state.order.pop_last()?;

        let Some(queue) = state.queues.get_mut(&key) else {
            unreachable!("RecencySwapStore::release: ordered key has no queue");
        };
        let Some(item) = queue.buffer.pop() else {
            unreachable!("RecencySwapStore::release: ordered key has an empty queue");
        };
        state.len -= 1;

        if queue.buffer.is_empty() {
            state.queues.remove(&key);
        } else {
            state.order.insert(recency, key.clone());
        }

        Some((key, item.into_inner()))
    } // end method release

    fn is_empty(&self) -> bool {
        self.inner.lock().order.is_empty()
    }

    fn len(&self) -> usize {
        self.inner.lock().len
    }
}
