//! Min-heap with arbitrary-element re-prioritization
//!
//! The heap stores only identifiers. Their order comes from a [`Prioritizer`]
//! passed to every operation, which reads the current priority at comparison
//! time. Nothing is snapshotted, so after anything changes an element's
//! priority the caller must call [`MinHeap::re_heapify`] for that element.
//! The heap never notices such changes on its own.

use std::collections::HashMap;
use std::hash::Hash;

use ahash::RandomState;
use docstoredb::{Error, Result};

const INITIAL_CAPACITY: usize = 16;

/// Source of the current priority of a heap element
pub trait Prioritizer<T> {
    /// Priority type; smaller values sit closer to the root
    type Priority: Ord;

    /// Current priority of `item`
    fn priority(&self, item: &T) -> Self::Priority;
}

impl<T, P, F> Prioritizer<T> for F
where
    P: Ord,
    F: Fn(&T) -> P,
{
    type Priority = P;

    fn priority(&self, item: &T) -> P {
        self(item)
    }
}

/// Array-backed binary min-heap with an element -> slot index
pub struct MinHeap<T> {
    elements: Vec<T>,
    positions: HashMap<T, usize, RandomState>,
}

impl<T> MinHeap<T>
where
    T: Hash + Eq + Clone,
{
    /// Create an empty heap
    pub fn new() -> Self {
        Self::with_capacity(INITIAL_CAPACITY)
    }

    /// Create an empty heap with room for `capacity` elements
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            elements: Vec::with_capacity(capacity),
            positions: HashMap::with_capacity_and_hasher(capacity, RandomState::new()),
        }
    }

    /// Add an element; an element already present is re-heapified instead
    pub fn insert<P: Prioritizer<T>>(&mut self, item: T, by: &P) {
        if self.positions.contains_key(&item) {
            self.re_heapify(&item, by);
            return;
        }

        if self.elements.len() == self.elements.capacity() {
            let grow_by = self.elements.capacity().max(INITIAL_CAPACITY);
            self.elements.reserve_exact(grow_by);
        }

        let idx = self.elements.len();
        self.positions.insert(item.clone(), idx);
        self.elements.push(item);
        self.sift_up(idx, by);
    }

    /// Remove and return the element with the smallest priority
    pub fn remove<P: Prioritizer<T>>(&mut self, by: &P) -> Result<T> {
        self.remove_at(0, by).ok_or(Error::EmptyHeap)
    }

    /// Remove a specific element wherever it sits
    pub fn remove_item<P: Prioritizer<T>>(&mut self, item: &T, by: &P) -> Option<T> {
        let idx = *self.positions.get(item)?;
        self.remove_at(idx, by)
    }

    /// Restore heap order around `item` after its priority changed
    ///
    /// Sifts in both directions since the priority may have moved either way.
    /// Does nothing if `item` is not in the heap.
    pub fn re_heapify<P: Prioritizer<T>>(&mut self, item: &T, by: &P) {
        if let Some(&idx) = self.positions.get(item) {
            let idx = self.sift_up(idx, by);
            self.sift_down(idx, by);
        }
    }

    /// Element with the smallest priority
    pub fn peek(&self) -> Option<&T> {
        self.elements.first()
    }

    /// Whether `item` is in the heap
    pub fn contains(&self, item: &T) -> bool {
        self.positions.contains_key(item)
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Whether the heap is empty
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Allocated slots
    pub fn capacity(&self) -> usize {
        self.elements.capacity()
    }

    fn remove_at<P: Prioritizer<T>>(&mut self, idx: usize, by: &P) -> Option<T> {
        let last = self.elements.len().checked_sub(1)?;
        self.swap(idx, last);

        let item = self.elements.pop()?;
        self.positions.remove(&item);

        if idx < self.elements.len() {
            let idx = self.sift_up(idx, by);
            self.sift_down(idx, by);
        }
        Some(item)
    }

    fn sift_up<P: Prioritizer<T>>(&mut self, mut idx: usize, by: &P) -> usize {
        while idx > 0 {
            let parent = (idx - 1) / 2;
            if by.priority(&self.elements[idx]) >= by.priority(&self.elements[parent]) {
                break;
            }
            self.swap(idx, parent);
            idx = parent;
        }
        idx
    }

    fn sift_down<P: Prioritizer<T>>(&mut self, mut idx: usize, by: &P) {
        let len = self.elements.len();
        loop {
            let left = 2 * idx + 1;
            let right = left + 1;
            let mut smallest = idx;

            if left < len && by.priority(&self.elements[left]) < by.priority(&self.elements[smallest]) {
                smallest = left;
            }
            if right < len && by.priority(&self.elements[right]) < by.priority(&self.elements[smallest]) {
                smallest = right;
            }
            if smallest == idx {
                return;
            }
            self.swap(idx, smallest);
            idx = smallest;
        }
    }

    fn swap(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        self.elements.swap(a, b);
        if let Some(pos) = self.positions.get_mut(&self.elements[a]) {
            *pos = a;
        }
        if let Some(pos) = self.positions.get_mut(&self.elements[b]) {
            *pos = b;
        }
    }
}

impl<T> Default for MinHeap<T>
where
    T: Hash + Eq + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
