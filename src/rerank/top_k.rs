//! Top-K selection for reranking.
//!
//! Keeps the k smallest `(distance, ordinal)` keys seen so far in a
//! max-heap. Including the ordinal in the key makes the order total, so
//! equal distances always resolve to the earlier record and partial heaps
//! built on different threads merge to the same answer.

use crate::types::RecordOrdinal;
use ordered_float::OrderedFloat;
use std::collections::BinaryHeap;

/// One entry: distance, record ordinal, and the entry's slot in the
/// caller's candidate slice.
pub type TopKEntry = (f64, RecordOrdinal, usize);

/// A max-heap based top-k tracker.
#[derive(Debug, Clone)]
pub struct TopK {
    /// Max-heap keyed by (distance, ordinal); the worst kept entry is on top.
    heap: BinaryHeap<(OrderedFloat<f64>, RecordOrdinal, usize)>,

    /// Maximum capacity.
    k: usize,
}

impl TopK {
    /// Create a new top-k tracker.
    pub fn new(k: usize) -> Self {
        Self {
            heap: BinaryHeap::with_capacity(k.saturating_add(1).min(1 << 16)),
            k,
        }
    }

    /// Get the current size.
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Get the capacity (k).
    pub fn capacity(&self) -> usize {
        self.k
    }

    /// Worst kept key once full, `None` before.
    pub fn threshold(&self) -> Option<(f64, RecordOrdinal)> {
        if self.heap.len() >= self.k {
            self.heap.peek().map(|(d, o, _)| (d.0, *o))
        } else {
            None
        }
    }

    /// Try to push an entry. Returns true if it was kept.
    pub fn push(&mut self, distance: f64, ordinal: RecordOrdinal, slot: usize) -> bool {
        if self.k == 0 {
            return false;
        }
        let key = (OrderedFloat(distance), ordinal, slot);
        if self.heap.len() < self.k {
            self.heap.push(key);
            return true;
        }
        match self.heap.peek() {
            Some(top) if (key.0, key.1) < (top.0, top.1) => {
                self.heap.pop();
                self.heap.push(key);
                true
            }
            _ => false,
        }
    }

    /// Fold another tracker into this one.
    pub fn merge(mut self, other: TopK) -> TopK {
        for (d, o, s) in other.heap {
            self.push(d.0, o, s);
        }
        self
    }

    /// Drain results sorted ascending by (distance, ordinal).
    pub fn into_sorted(self) -> Vec<TopKEntry> {
        self.heap
            .into_sorted_vec()
            .into_iter()
            .map(|(d, o, s)| (d.0, o, s))
            .collect()
    }
}
