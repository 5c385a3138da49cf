//! Parallel execution utilities.
//!
//! The filter stage is an embarrassingly parallel map over records; these
//! helpers pick rayon or a plain iterator based on input size and always
//! return results in input order.

use rayon::prelude::*;

/// Minimum number of items before parallelization is beneficial.
/// Below this threshold, sequential execution is faster due to reduced overhead.
pub const MIN_PARALLEL_SIZE: usize = 1024;

/// Number of items each rayon task handles in a chunked reduction.
pub const REDUCE_CHUNK_SIZE: usize = 4096;

/// Map over `items`, in parallel once there are at least `threshold` of them.
#[inline]
pub fn maybe_parallel_map_threshold<T, U, F>(items: &[T], threshold: usize, f: F) -> Vec<U>
where
    T: Sync,
    U: Send,
    F: Fn(&T) -> U + Sync + Send,
{
    if items.len() >= threshold {
        items.par_iter().map(&f).collect()
    } else {
        items.iter().map(f).collect()
    }
}

/// Indexed map: `f` also receives the item's position in `items`.
#[inline]
pub fn maybe_parallel_map_indexed<T, U, F>(items: &[T], threshold: usize, f: F) -> Vec<U>
where
    T: Sync,
    U: Send,
    F: Fn(usize, &T) -> U + Sync + Send,
{
    if items.len() >= threshold {
        items.par_iter().enumerate().map(|(i, t)| f(i, t)).collect()
    } else {
        items.iter().enumerate().map(|(i, t)| f(i, t)).collect()
    }
}

/// Reduce `items` chunk by chunk: each chunk folds into its own
/// accumulator, then accumulators merge pairwise.
///
/// `merge` must be associative; chunk order is not preserved.
pub fn chunked_reduce<T, A, I, F, M>(items: &[T], threshold: usize, init: I, fold: F, merge: M) -> A
where
    T: Sync,
    A: Send,
    I: Fn() -> A + Sync + Send,
    F: Fn(&mut A, &T) + Sync + Send,
    M: Fn(A, A) -> A + Sync + Send,
{
    if items.len() < threshold {
        let mut acc = init();
        items.iter().for_each(|t| fold(&mut acc, t));
        return acc;
    }
    items
        .par_chunks(REDUCE_CHUNK_SIZE)
        .map(|chunk| {
            let mut acc = init();
            chunk.iter().for_each(|t| fold(&mut acc, t));
            acc
        })
        .reduce(&init, &merge)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_maybe_parallel_preserves_order() {
        let items: Vec<usize> = (0..5000).collect();
        let seq = maybe_parallel_map_threshold(&items, usize::MAX, |x| x + 1);
        let par = maybe_parallel_map_threshold(&items, 0, |x| x + 1);
        assert_eq!(seq, par);
    }

    #[test]
    fn test_indexed_map() {
        let items = vec!["a", "b", "c"];
        let out = maybe_parallel_map_indexed(&items, 0, |i, s| format!("{i}{s}"));
        assert_eq!(out, vec!["0a", "1b", "2c"]);
    }

    #[test]
    fn test_chunked_reduce_sum() {
        let items: Vec<u64> = (1..=10_000).collect();
        let expected: u64 = items.iter().sum();
        for threshold in [0, usize::MAX] {
            let total = chunked_reduce(&items, threshold, || 0u64, |acc, x| *acc += x, |a, b| a + b);
            assert_eq!(total, expected);
        }
    }
}
