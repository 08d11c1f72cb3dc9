//! Time series helpers for holder/swap charts and DEX transaction feeds.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One datum of a chart, `t` in unix milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub t: i64,
    pub v: i64,
}

impl Point {
    pub fn new(t: i64, v: i64) -> Self {
        Self { t, v }
    }
}

/// Sums series point-wise on equal timestamps. Result is ascending by `t`.
pub fn merge_series<I>(series: I) -> Vec<Point>
where
    I: IntoIterator<Item = Vec<Point>>,
{
    let mut merged: BTreeMap<i64, i64> = BTreeMap::new();
    for points in series {
        for point in points {
            *merged.entry(point.t).or_insert(0) += point.v;
        }
    }

    merged.into_iter().map(|(t, v)| Point { t, v }).collect()
}

/// Anything carrying a transaction timestamp.
pub trait Timed {
    fn time(&self) -> i64;
}

/// Combines per-pair transaction lists into one newest-first feed.
///
/// The floor is the smallest of the lists' last timestamps; anything older is
/// dropped. Empty lists do not take part in the floor.
pub fn floor_and_sort<T: Timed>(lists: Vec<Vec<T>>) -> Vec<T> {
    let floor = lists
        .iter()
        .filter_map(|list| list.last().map(Timed::time))
        .min();

    let Some(floor) = floor else {
        return Vec::new();
    };

    let mut merged: Vec<T> = lists
        .into_iter()
        .flatten()
        .filter(|tx| tx.time() >= floor)
        .collect();
    merged.sort_by(|a, b| b.time().cmp(&a.time()));
    merged
}
