use std::{
    collections::{HashMap, VecDeque},
    hash::Hash,
};

use parking_lot::Mutex;
use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::{
    MaxStoredItems,
    common::PREALLOCATE_MAX,
    ds::{LinkedSlotList, NodeHandle},
    store::{EvictionHook, PendingStore},
};

/// Dense set of keys supporting O(1) uniform choice and O(1) removal.
struct UniformKeys<K> {
    keys: Vec<K>,
    index: HashMap<K, usize>,
}

impl<K: Eq + Hash + Clone> UniformKeys<K> {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            keys: Vec::with_capacity(capacity),
            index: HashMap::with_capacity(capacity),
        }
    }

    fn insert(&mut self, key: &K) {
        if self.index.contains_key(key) {
            return;
        }

        self.index.insert(key.clone(), self.keys.len());
        self.keys.push(key.clone());
    }

    fn remove(&mut self, key: &K) {
        let Some(position) = self.index.remove(key) else {
            return;
        };

        self.keys.swap_remove(position);
        if let Some(moved) = self.keys.get(position)
            && let Some(slot) = self.index.get_mut(moved)
        {
            *slot = position;
        }
    }

    fn choose<R: Rng>(&self, rng: &mut R) -> Option<&K> {
        if self.keys.is_empty() {
            return None;
        }

        Some(&self.keys[rng.random_range(0..self.keys.len())])
    }
}

struct WeightedEntry<K> {
    key: K,
    locator: NodeHandle,
}

/// One entry per held item, so a uniform index draw picks a key with
/// probability proportional to its backlog.
///
/// Two invariants tie `entries` and `locator` together:
/// 1. for every `i`, `locator[entries[i].key]` links `entries[i].locator`,
///    and that node holds `i`;
/// 2. for every key `k` and every value `i` linked in `locator[k]`,
///    `entries[i].key == k`.
struct WeightedEntries<K> {
    entries: Vec<WeightedEntry<K>>,
    locator: HashMap<K, LinkedSlotList<usize>>,
}

impl<K: Eq + Hash + Clone> WeightedEntries<K> {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            locator: HashMap::with_capacity(capacity),
        }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn contains(&self, key: &K) -> bool {
        self.locator.contains_key(key)
    }

    fn insert(&mut self, key: K) {
        let index = self.entries.len();
        let locator = self.locator.entry(key.clone()).or_default().push_back(index);
        self.entries.push(WeightedEntry { key, locator });
    }

    /// Remove a uniformly drawn entry and return its key.
    fn remove_random<R: Rng>(&mut self, rng: &mut R) -> Option<K> {
        if self.entries.is_empty() {
            return None;
        }

        let index = rng.random_range(0..self.entries.len());
        Some(self.take(index))
    }

    /// Remove one entry belonging to `key`.
    fn remove_one_of(&mut self, key: &K) {
        let Some(index) = self.locator.get(key).and_then(|list| list.back()).copied() else {
            panic!("WeightedRandomStore: released key has no weighted entry");
        };

        self.take(index);
    }

    fn take(&mut self, index: usize) -> K {
        let removed = self.entries.swap_remove(index);

        let Some(list) = self.locator.get_mut(&removed.key) else {
            panic!("WeightedRandomStore: entry {index} has no locator list");
        };
        if list.unlink(removed.locator).is_none() {
            panic!("WeightedRandomStore: entry {index} has a stale locator node");
        }
        if list.is_empty() {
            self.locator.remove(&removed.key);
        }

        if index < self.entries.len() {
            self.relocate(index);
        }

        removed.key
    }

    /// Point the locator node of the entry now sitting at `index` back at it.
    fn relocate(&mut self, index: usize) {
        let moved = &self.entries[index];
        let Some(slot) = self
            .locator
            .get_mut(&moved.key)
            .and_then(|list| list.get_mut(moved.locator))
        else {
            panic!("WeightedRandomStore: moved entry {index} lost its locator node");
        };

        *slot = index;
    }
}

struct WeightedState<K, T, R> {
    uniform: UniformKeys<K>,
    weighted: WeightedEntries<K>,
    queues: HashMap<K, VecDeque<T>>,
    rng: R,
}

impl<K: Eq + Hash + Clone, T, R: Rng> WeightedState<K, T, R> {
    fn dequeue(&mut self, key: &K) -> Option<T> {
        let queue = self.queues.get_mut(key)?;
        let item = queue.pop_front();
        if queue.is_empty() {
            self.queues.remove(key);
        }
        item
    }

    /// Thin a key chosen with probability proportional to its backlog.
    fn evict_weighted(&mut self) -> Option<(K, T)> {
        let key = self.weighted.remove_random(&mut self.rng)?;

        let Some(item) = self.dequeue(&key) else {
            panic!("WeightedRandomStore: weighted entry without a queued item");
        };
        if !self.queues.contains_key(&key) {
            self.uniform.remove(&key);
        }

        Some((key, item))
    }

    fn release(&mut self) -> Option<(K, T)> {
        let key = self.uniform.choose(&mut self.rng)?.clone();

        self.weighted.remove_one_of(&key);
        if !self.weighted.contains(&key) {
            self.uniform.remove(&key);
        }

        let Some(item) = self.dequeue(&key) else {
            panic!("WeightedRandomStore: uniform key without a queued item");
        };

        Some((key, item))
    }

    #[cfg(any(test, debug_assertions))]
    fn debug_validate_invariants(&self) {
        for (index, entry) in self.weighted.entries.iter().enumerate() {
            let list = self
                .weighted
                .locator
                .get(&entry.key)
                .expect("entry key missing from locator");
            assert_eq!(list.get(entry.locator), Some(&index));
        }

        for (key, list) in &self.weighted.locator {
            list.debug_validate_invariants();
            for &index in list {
                assert!(self.weighted.entries[index].key == *key);
            }

            let queued = self.queues.get(key).map_or(0, VecDeque::len);
            assert_eq!(list.len(), queued);
            assert!(self.uniform.index.contains_key(key));
        }

        assert_eq!(self.weighted.locator.len(), self.queues.len());
        assert_eq!(self.uniform.keys.len(), self.queues.len());
        for (position, key) in self.uniform.keys.iter().enumerate() {
            assert_eq!(self.uniform.index.get(key), Some(&position));
        }

        let total: usize = self.queues.values().map(VecDeque::len).sum();
        assert_eq!(total, self.weighted.len());
    }
}

/// Store bounded by total item count, with randomized eviction and release.
///
/// - **Eviction** (store full on `hold`): one held item is dropped from a key
///   chosen with probability proportional to that key's backlog. The key's
///   oldest item goes, and is passed to the eviction hook.
/// - **Release**: a key is chosen uniformly among keys with held items,
///   regardless of backlog, and its oldest item is returned.
///
/// Heavy keys are thinned first while light keys are never starved.
///
/// # Complexity
///
/// `hold` and `release` are amortized O(1). Removing one entry of a given
/// key uses that key's locator list, and the dense entry array is compacted
/// with swap-remove, relocating the locator node of the moved entry.
///
/// # Panics
///
/// A divergence between the internal index structures is a bug in this crate
/// and panics rather than continuing with corrupted state.
pub struct WeightedRandomStore<K, T, R = StdRng> {
    max_total_items: MaxStoredItems,
    on_evict: EvictionHook<K, T>,
    inner: Mutex<WeightedState<K, T, R>>,
}

impl<K, T> WeightedRandomStore<K, T, StdRng>
where
    K: Eq + Hash + Clone,
{
    /// Create an empty store with an OS-seeded random source.
    pub fn new(
        max_total_items: MaxStoredItems,
        on_evict: impl Fn(K, T) + Send + Sync + 'static,
    ) -> Self {
        Self::with_rng(max_total_items, StdRng::from_os_rng(), on_evict)
    }
}

impl<K, T, R> WeightedRandomStore<K, T, R>
where
    K: Eq + Hash + Clone,
    R: Rng,
{
    /// Create an empty store drawing from `rng`.
    pub fn with_rng(
        max_total_items: MaxStoredItems,
        rng: R,
        on_evict: impl Fn(K, T) + Send + Sync + 'static,
    ) -> Self {
        let capacity = (*max_total_items).min(PREALLOCATE_MAX);

        Self {
            max_total_items,
            on_evict: Box::new(on_evict),
            inner: Mutex::new(WeightedState {
                uniform: UniformKeys::with_capacity(capacity),
                weighted: WeightedEntries::with_capacity(capacity),
                queues: HashMap::with_capacity(capacity),
                rng,
            }),
        }
    }

    /// Items held under `key`.
    pub fn held_for(&self, key: &K) -> usize {
        self.inner.lock().queues.get(key).map_or(0, VecDeque::len)
    }

    /// Number of keys with at least one held item.
    pub fn key_count(&self) -> usize {
        self.inner.lock().queues.len()
    }

    #[cfg(any(test, debug_assertions))]
    /// Panics unless the entry array, locator lists, key set and queues agree.
    pub fn debug_validate_invariants(&self) {
        self.inner.lock().debug_validate_invariants();
    }
}

impl<K, T, R> PendingStore<K, T> for WeightedRandomStore<K, T, R>
where
    K: Eq + Hash + Clone + Send,
    T: Send,
    R: Rng + Send,
{
    fn hold(&self, key: K, item: T) {
        let evicted = {
            let mut guard = self.inner.lock();
            let state = &mut *guard;

            let evicted = if state.weighted.len() >= *self.max_total_items {
                state.evict_weighted()
            } else {
                None
            };

            state.weighted.insert(key.clone());
            state.uniform.insert(&key);
            state.queues.entry(key).or_default().push_back(item);

            evicted
        };

        if let Some((key, item)) = evicted {
            tracing::debug!("weighted store evicted a held item");
            (self.on_evict)(key, item);
        }
    } // end method hold

    fn release(&self) -> Option<(K, T)> {
        self.inner.lock().release()
    }

    fn is_empty(&self) -> bool {
        self.inner.lock().queues.is_empty()
    }

    fn len(&self) -> usize {
        self.inner.lock().weighted.len()
    }
}
