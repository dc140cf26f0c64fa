//! Doubly linked list whose nodes live in a slot arena and are addressed by
//! generation-checked handles.
//!
//! A [`NodeHandle`] stays valid while its node is linked, however the rest of
//! the list changes, which gives O(1) removal of an arbitrary interior node.
//! Once a node is unlinked its slot generation is bumped, so the old handle no
//! longer resolves, even after the slot is recycled for a new node.
//!
//! ```text
//!   slots (Vec<Slot<T>>)
//!   ┌─────┬─────┬──────────────────────────────────────┐
//!   │ idx │ gen │ node                                 │
//!   ├─────┼─────┼──────────────────────────────────────┤
//!   │ 0   │ 0   │ { value: A, prev: None,    next: 2 } │
//!   │ 1   │ 3   │ free                                 │
//!   │ 2   │ 1   │ { value: B, prev: 0,       next: None }
//!   └─────┴─────┴──────────────────────────────────────┘
//!
//!   head ─► [0] ◄──► [2] ◄── tail          free: [1]
//! ```
//!
//! `debug_validate_invariants()` is available in debug/test builds.

/// Stable reference to a node of a [`LinkedSlotList`].
///
/// Handles are plain values and do not own the node. A handle whose node was
/// unlinked resolves to nothing in every list operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeHandle {
    index: usize,
    generation: u64,
}

#[derive(Debug)]
struct Node<T> {
    value: T,
    prev: Option<usize>,
    next: Option<usize>,
}

#[derive(Debug)]
struct Slot<T> {
    generation: u64,
    node: Option<Node<T>>,
}

/// Arena-backed doubly linked list exposing [`NodeHandle`]s.
#[derive(Debug)]
pub struct LinkedSlotList<T> {
    slots: Vec<Slot<T>>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    len: usize,
}

impl<T> LinkedSlotList<T> {
    /// Creates an empty list.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
            len: 0,
        }
    }

    /// Creates an empty list with room for `capacity` nodes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            ..Self::new()
        }
    }

    /// Number of linked nodes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// `true` when no node is linked.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// `true` if `handle` refers to a node currently linked in this list.
    pub fn contains(&self, handle: NodeHandle) -> bool {
        self.resolve(handle).is_some()
    }

    /// Inserts `value` at the front.
    pub fn push_front(&mut self, value: T) -> NodeHandle {
        let index = self.allocate(value);
        self.attach(index, None, self.head);
        self.handle_of(index)
    }

    /// Inserts `value` at the back.
    pub fn push_back(&mut self, value: T) -> NodeHandle {
        let index = self.allocate(value);
        self.attach(index, self.tail, None);
        self.handle_of(index)
    }

    /// Inserts `value` right before `anchor`.
    ///
    /// Returns `None`, leaving the list untouched, when `anchor` is stale.
    pub fn insert_before(&mut self, anchor: NodeHandle, value: T) -> Option<NodeHandle> {
        let anchor = self.resolve(anchor)?;
        let prev = self.node(anchor).prev;
        let index = self.allocate(value);
        self.attach(index, prev, Some(anchor));
        Some(self.handle_of(index))
    }

    /// Inserts `value` right after `anchor`.
    ///
    /// Returns `None`, leaving the list untouched, when `anchor` is stale.
    pub fn insert_after(&mut self, anchor: NodeHandle, value: T) -> Option<NodeHandle> {
        let anchor = self.resolve(anchor)?;
        let next = self.node(anchor).next;
        let index = self.allocate(value);
        self.attach(index, Some(anchor), next);
        Some(self.handle_of(index))
    }

    /// Removes the node behind `handle` and returns its value.
    ///
    /// Unlinking a node that is already gone is a no-op returning `None`.
    pub fn unlink(&mut self, handle: NodeHandle) -> Option<T> {
        let index = self.resolve(handle)?;
        self.detach(index);
        Some(self.release(index))
    }

    /// Value behind `handle`.
    pub fn get(&self, handle: NodeHandle) -> Option<&T> {
        self.resolve(handle).map(|index| &self.node(index).value)
    }

    /// Mutable value behind `handle`.
    pub fn get_mut(&mut self, handle: NodeHandle) -> Option<&mut T> {
        let index = self.resolve(handle)?;
        self.slots[index].node.as_mut().map(|node| &mut node.value)
    }

    /// Value at the front.
    pub fn front(&self) -> Option<&T> {
        self.head.map(|index| &self.node(index).value)
    }

    /// Value at the back.
    pub fn back(&self) -> Option<&T> {
        self.tail.map(|index| &self.node(index).value)
    }

    /// Handle of the front node.
    pub fn front_handle(&self) -> Option<NodeHandle> {
        self.head.map(|index| self.handle_of(index))
    }

    /// Handle of the back node.
    pub fn back_handle(&self) -> Option<NodeHandle> {
        self.tail.map(|index| self.handle_of(index))
    }

    /// Removes and returns the front value.
    pub fn pop_front(&mut self) -> Option<T> {
        let index = self.head?;
        self.detach(index);
        Some(self.release(index))
    }

    /// Removes and returns the back value.
    pub fn pop_back(&mut self) -> Option<T> {
        let index = self.tail?;
        self.detach(index);
        Some(self.release(index))
    }

    /// Iterates values front to back. Every call starts a fresh traversal.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            list: self,
            current: self.head,
            remaining: self.len,
        }
    }

    /// Unlinks every node. Outstanding handles become stale.
    pub fn clear(&mut self) {
        while self.pop_front().is_some() {}
    }

    fn handle_of(&self, index: usize) -> NodeHandle {
        NodeHandle {
            index,
            generation: self.slots[index].generation,
        }
    }

    fn resolve(&self, handle: NodeHandle) -> Option<usize> {
        let slot = self.slots.get(handle.index)?;
        (slot.generation == handle.generation && slot.node.is_some()).then_some(handle.index)
    }

    fn node(&self, index: usize) -> &Node<T> {
        match self.slots[index].node.as_ref() {
            Some(node) => node,
            None => unreachable!("LinkedSlotList: linked index {index} points at a free slot"),
        }
    }

    fn node_mut(&mut self, index: usize) -> &mut Node<T> {
        match self.slots[index].node.as_mut() {
            Some(node) => node,
            None => unreachable!("LinkedSlotList: linked index {index} points at a free slot"),
        }
    }

    fn allocate(&mut self, value: T) -> usize {
        let node = Node {
            value,
            prev: None,
            next: None,
        };

        if let Some(index) = self.free.pop() {
            self.slots[index].node = Some(node);
            index
        } else {
            self.slots.push(Slot {
                generation: 0,
                node: Some(node),
            });
            self.slots.len() - 1
        }
    }

    fn release(&mut self, index: usize) -> T {
        let slot = &mut self.slots[index];
        let Some(node) = slot.node.take() else {
            unreachable!("LinkedSlotList: releasing free slot {index}");
        };
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(index);
        node.value
    }

    // The only places `len` changes.
    fn attach(&mut self, index: usize, prev: Option<usize>, next: Option<usize>) {
        {
            let node = self.node_mut(index);
            node.prev = prev;
            node.next = next;
        }

        match prev {
            Some(prev) => self.node_mut(prev).next = Some(index),
            None => self.head = Some(index),
        }
        match next {
            Some(next) => self.node_mut(next).prev = Some(index),
            None => self.tail = Some(index),
        }

        self.len += 1;
    }

    fn detach(&mut self, index: usize) {
        let (prev, next) = {
            let node = self.node_mut(index);
            (node.prev.take(), node.next.take())
        };

        match prev {
            Some(prev) => self.node_mut(prev).next = next,
            None => self.head = next,
        }
        match next {
            Some(next) => self.node_mut(next).prev = prev,
            None => self.tail = prev,
        }

        self.len -= 1;
    }

    #[cfg(any(test, debug_assertions))]
    /// Panics when links, endpoints or the size counter disagree.
    pub fn debug_validate_invariants(&self) {
        if self.head.is_none() || self.tail.is_none() {
            assert!(self.head.is_none());
            assert!(self.tail.is_none());
            assert_eq!(self.len, 0);
            return;
        }

        let mut seen = std::collections::HashSet::new();
        let mut count = 0usize;
        let mut current = self.head;
        let mut prev = None;

        while let Some(index) = current {
            assert!(seen.insert(index), "cycle through slot {index}");
            let node = self.node(index);
            assert_eq!(node.prev, prev);
            if node.next.is_none() {
                assert_eq!(self.tail, Some(index));
            }

            prev = Some(index);
            current = node.next;
            count += 1;
            assert!(count <= self.len);
        }

        assert_eq!(count, self.len);
        assert_eq!(self.slots.len() - self.free.len(), self.len);
    }
}

impl<T> Default for LinkedSlotList<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Front-to-back iterator over a [`LinkedSlotList`].
pub struct Iter<'a, T> {
    list: &'a LinkedSlotList<T>,
    current: Option<usize>,
    remaining: usize,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.current?;
        let node = self.list.node(index);
        self.current = node.next;
        self.remaining -= 1;
        Some(&node.value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<T> ExactSizeIterator for Iter<'_, T> {}

impl<'a, T> IntoIterator for &'a LinkedSlotList<T> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
