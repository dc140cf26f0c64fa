//! Fixed-capacity circular buffer that overwrites its oldest entry when full.
//!
//! ```text
//!   capacity 4, after put(a) put(b) put(c) put(d) put(e)
//!
//!   slots: [ e | b | c | d ]
//!            ▲   ▲
//!            │   └── start (oldest, next pop)
//!            └────── last write, returned `a` as evicted
//! ```
//!
//! [`RingBuffer`] is the single-threaded core; [`ConcurrentRingBuffer`] wraps
//! it behind a mutex for shared use.
use parking_lot::Mutex;

use crate::{HoldbackError, MaxPerKey};

/// Circular buffer with overwrite-oldest semantics. All operations are O(1).
#[derive(Debug)]
pub struct RingBuffer<T> {
    slots: Box<[Option<T>]>,
    start: usize,
    len: usize,
}

impl<T> RingBuffer<T> {
    /// Create an empty buffer holding at most `capacity` values.
    ///
    /// Fails when `capacity` is zero.
    pub fn new(capacity: usize) -> Result<Self, HoldbackError> {
        if capacity == 0 {
            return Err(HoldbackError::InvalidCapacity("ring buffer capacity"));
        }

        Ok(Self::allocate(capacity))
    }

    pub(crate) fn bounded(capacity: MaxPerKey) -> Self {
        Self::allocate(*capacity)
    }

    fn allocate(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            start: 0,
            len: 0,
        }
    }

    /// Append `value` behind the newest entry.
    ///
    /// When the buffer is full the oldest entry is overwritten and returned.
    pub fn put(&mut self, value: T) -> Option<T> {
        let capacity = self.slots.len();
        let position = (self.start + self.len) % capacity;
        let evicted = self.slots[position].replace(value);

        if self.len < capacity {
            self.len += 1;
        } else {
            self.start = (self.start + 1) % capacity;
        }

        evicted
    }

    /// Remove and return the oldest entry.
    pub fn pop(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }

        let value = self.slots[self.start].take();
        self.start = (self.start + 1) % self.slots.len();
        self.len -= 1;
        value
    }

    /// The oldest entry, without removing it.
    pub fn peek(&self) -> Option<&T> {
        if self.len == 0 {
            return None;
        }

        self.slots[self.start].as_ref()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.len
    }

    /// `true` when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// `true` when the next `put` will overwrite.
    pub fn is_full(&self) -> bool {
        self.len == self.slots.len()
    }

    /// Maximum number of stored entries.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Entries from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        let capacity = self.slots.len();
        (0..self.len).filter_map(move |offset| self.slots[(self.start + offset) % capacity].as_ref())
    }
}

/// [`RingBuffer`] guarded by a mutex; every call is serialized.
#[derive(Debug)]
pub struct ConcurrentRingBuffer<T> {
    inner: Mutex<RingBuffer<T>>,
}

impl<T> ConcurrentRingBuffer<T> {
    /// Create an empty buffer holding at most `capacity` values.
    pub fn new(capacity: usize) -> Result<Self, HoldbackError> {
        Ok(Self {
            inner: Mutex::new(RingBuffer::new(capacity)?),
        })
    }

    /// See [`RingBuffer::put`].
    pub fn put(&self, value: T) -> Option<T> {
        self.inner.lock().put(value)
    }

    /// See [`RingBuffer::pop`].
    pub fn pop(&self) -> Option<T> {
        self.inner.lock().pop()
    }

    /// Run `f` on the oldest entry while the lock is held.
    pub fn peek_with<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        self.inner.lock().peek().map(f)
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// `true` when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Maximum number of stored entries.
    pub fn capacity(&self) -> usize {
        self.inner.lock().capacity()
    }
}
