//! Collection aliases used throughout the crate.
//!
//! Internal bookkeeping (conflict-zone visit sets, the reverse index of the
//! bad-face queue, cluster maps) never hashes attacker-controlled keys, so a
//! fast non-cryptographic hasher is the right default.

use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

/// `HashMap` with the fast `FxHasher`. Internal, trusted keys only.
pub type FastHashMap<K, V> = FxHashMap<K, V>;

/// `HashSet` with the fast `FxHasher`. Internal, trusted keys only.
pub type FastHashSet<T> = FxHashSet<T>;

/// Inline-first buffer for the short sequences triangulation traversals
/// produce (vertex stars, conflict-zone boundaries of a handful of edges).
pub type SmallBuffer<T, const N: usize> = SmallVec<[T; N]>;

/// Creates a [`FastHashMap`] with at least the given capacity.
#[must_use]
pub fn fast_hash_map_with_capacity<K, V>(capacity: usize) -> FastHashMap<K, V> {
    FastHashMap::with_capacity_and_hasher(capacity, rustc_hash::FxBuildHasher::default())
}

/// Creates a [`FastHashSet`] with at least the given capacity.
#[must_use]
pub fn fast_hash_set_with_capacity<T>(capacity: usize) -> FastHashSet<T> {
    FastHashSet::with_capacity_and_hasher(capacity, rustc_hash::FxBuildHasher::default())
}
