//! Exact binary search with next-greater semantics.

use std::cmp::Ordering;

/// Performs an exact binary search on a sorted slice.
///
/// The second return value indicates whether a matching value was found. If
/// so, the first return value is its index within `values`.
///
/// If the value was not found, the returned index is the position of the
/// *next greater* element, i.e. the slot where the key would be inserted to
/// preserve order. For a slice of length `n` this index lies in `[0, n]`,
/// with `n` meaning the key exceeds every element. An empty slice yields
/// `(0, false)`.
pub fn binary<T: Ord>(key: &T, values: &[T]) -> (usize, bool) {
    let mut low = 0;
    let mut high = values.len();

    while low < high {
        let mid = low + (high - low) / 2;
        match values[mid].cmp(key) {
            Ordering::Equal => return (mid, true),
            Ordering::Less => low = mid + 1,
            Ordering::Greater => high = mid,
        }
    }

    (low, false)
}
