//! Order statistics over sorted value counts.
//!
//! Chunks and grids that can describe their contents as a sorted value → count
//! map get median, mode and deviation without materializing every cell.

use std::collections::{BTreeMap, BTreeSet};

use crate::value::CellValue;

/// Median of the values described by `counts`, or `None` when empty.
///
/// For an even population the median is the mean of the two middle values.
pub fn median_of_counts<V: CellValue>(counts: &BTreeMap<V, u64>) -> Option<f64> {
    let n: u64 = counts.values().sum();
    if n == 0 {
        return None;
    }
    let upper_rank = n / 2;
    let lower_rank = if n % 2 == 0 { upper_rank - 1 } else { upper_rank };

    let mut lower = None;
    let mut seen = 0u64;
    for (value, &count) in counts {
        seen += count;
        if lower.is_none() && seen > lower_rank {
            lower = Some(value.to_f64());
        }
        if seen > upper_rank {
            let upper = value.to_f64();
            return lower.map(|low| (low + upper) / 2.0);
        }
    }
    None
}

/// Median of an already sorted slice, or `None` when empty.
pub fn median_of_sorted<V: CellValue>(sorted: &[V]) -> Option<f64> {
    let n = sorted.len();
    if n == 0 {
        return None;
    }
    let upper = sorted[n / 2].to_f64();
    if n % 2 == 0 {
        Some((sorted[n / 2 - 1].to_f64() + upper) / 2.0)
    } else {
        Some(upper)
    }
}

/// Every value sharing the highest count.
pub fn modes_of_counts<V: CellValue>(counts: &BTreeMap<V, u64>) -> BTreeSet<V> {
    let Some(&best) = counts.values().max() else {
        return BTreeSet::new();
    };
    counts
        .iter()
        .filter(|&(_, &count)| count == best)
        .map(|(value, _)| value.clone())
        .collect()
}

/// Population standard deviation around `mean` of the values in `counts`.
pub fn standard_deviation_of_counts<V: CellValue>(counts: &BTreeMap<V, u64>, mean: f64) -> f64 {
    let n: u64 = counts.values().sum();
    if n == 0 {
        return 0.0;
    }
    let squares: f64 = counts
        .iter()
        .map(|(value, &count)| {
            let diff = value.to_f64() - mean;
            diff * diff * count as f64
        })
        .sum();
    (squares / n as f64).sqrt()
}
