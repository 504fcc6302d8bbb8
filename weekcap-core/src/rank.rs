//! Top-K ranking shared by the weekly aggregator and the rolling smoother.

use std::cmp::Ordering;

/// An item that can be ranked by a single descending metric.
pub trait Ranked {
    /// Identity used to break ties deterministically.
    fn rank_name(&self) -> &str;

    /// The metric the list is sorted by (descending).
    fn rank_metric(&self) -> f64;
}

/// Sort descending by metric, ties broken by name ascending, then keep the
/// first `k` items.
///
/// Metrics are compared with `total_cmp`, so a NaN can never panic the sort.
pub fn rank_top_k<T: Ranked>(mut items: Vec<T>, k: usize) -> Vec<T> {
    items.sort_by(|a, b| compare_desc(a, b));
    items.truncate(k);
    items
}

fn compare_desc<T: Ranked>(a: &T, b: &T) -> Ordering {
    b.rank_metric()
        .total_cmp(&a.rank_metric())
        .then_with(|| a.rank_name().cmp(b.rank_name()))
}

/// True if `items` is sorted descending by metric (ties allowed).
pub fn is_ranked<T: Ranked>(items: &[T]) -> bool {
    items
        .windows(2)
        .all(|w| w[0].rank_metric() >= w[1].rank_metric())
}
