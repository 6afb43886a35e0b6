//! A two-way map between keys and floating-point priorities.
//!
//! The refinement queue needs two access paths that plain heaps do not give
//! together: pop the entry with the smallest priority (the worst face), and
//! remove an arbitrary entry by key when local retriangulation destroys the
//! face it names. `PriorityMap` pairs an ordered set of `(priority, key)`
//! tuples with a reverse index from key to priority.
//!
//! Ties between equal priorities break on the key, ascending, which makes
//! extraction deterministic for a fixed sequence of operations.

use ordered_float::OrderedFloat;
use std::collections::BTreeSet;

use crate::core::collections::FastHashMap;

/// Ordered key-to-priority map with extract-min and remove-by-key.
///
/// # Examples
///
/// ```
/// use mesh2d::mesh::priority_map::PriorityMap;
///
/// let mut queue: PriorityMap<u32> = PriorityMap::new();
/// queue.insert(7, 0.5);
/// queue.insert(3, 0.1);
/// queue.insert(9, 0.9);
/// assert_eq!(queue.pop_front(), Some((3, 0.1)));
/// assert!(queue.remove(&9));
/// assert!(!queue.remove(&9));
/// assert_eq!(queue.len(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct PriorityMap<K: Copy + Ord + std::hash::Hash> {
    ordered: BTreeSet<(OrderedFloat<f64>, K)>,
    index: FastHashMap<K, OrderedFloat<f64>>,
}

impl<K: Copy + Ord + std::hash::Hash> Default for PriorityMap<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Copy + Ord + std::hash::Hash> PriorityMap<K> {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self {
            ordered: BTreeSet::new(),
            index: FastHashMap::default(),
        }
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// True iff the map holds no entry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Inserts `key` with `priority`, overwriting any previous entry for the
    /// same key.
    pub fn insert(&mut self, key: K, priority: f64) {
        let priority = OrderedFloat(priority);
        if let Some(old) = self.index.insert(key, priority) {
            self.ordered.remove(&(old, key));
        }
        self.ordered.insert((priority, key));
    }

    /// Removes the entry for `key`. Returns whether it was present.
    pub fn remove(&mut self, key: &K) -> bool {
        match self.index.remove(key) {
            Some(priority) => {
                self.ordered.remove(&(priority, *key));
                true
            }
            None => false,
        }
    }

    /// Priority currently associated with `key`.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<f64> {
        self.index.get(key).map(|p| p.0)
    }

    /// True iff `key` has an entry.
    #[must_use]
    pub fn contains(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    /// The entry with the smallest priority, without removing it.
    #[must_use]
    pub fn front(&self) -> Option<(K, f64)> {
        self.ordered.iter().next().map(|&(p, k)| (k, p.0))
    }

    /// Removes and returns the entry with the smallest priority.
    pub fn pop_front(&mut self) -> Option<(K, f64)> {
        let &(priority, key) = self.ordered.iter().next()?;
        self.ordered.remove(&(priority, key));
        self.index.remove(&key);
        Some((key, priority.0))
    }

    /// Removes every entry.
    pub fn clear(&mut self) {
        self.ordered.clear();
        self.index.clear();
    }

    /// Entries in priority order (ties by key, ascending).
    pub fn iter(&self) -> impl Iterator<Item = (K, f64)> + '_ {
        self.ordered.iter().map(|&(p, k)| (k, p.0))
    }
}
