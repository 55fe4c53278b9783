//! Quantile classification of grid values.
//!
//! Every non-zero data value is placed in one of `n` ordered classes so that the
//! classes hold contiguous, non-overlapping value ranges with near-equal cell
//! counts. The classes are filled in a single pass over the values in any
//! order. When a class holds enough cells without its largest value, the cells
//! of that value move up into the next class.

use std::collections::BTreeMap;

use gridstore_core::{relieve_pressure, CellValue, ChunkCells, ChunkSource, MemoryManager};
use serde::Serialize;
use tracing::debug;

use crate::error::{Result, StatsError};

/// Per-class extremes and value counts. Only non-empty classes have entries.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct QuantileClassMap<V: Ord> {
    pub min: BTreeMap<usize, V>,
    pub max: BTreeMap<usize, V>,
    pub counts: BTreeMap<usize, BTreeMap<V, u64>>,
}

impl<V: CellValue> QuantileClassMap<V> {
    /// Number of non-empty classes.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Cells in `class`.
    pub fn population(&self, class: usize) -> u64 {
        self.counts.get(&class).map_or(0, |counts| counts.values().sum())
    }

    /// The class holding `value`, if any class does.
    pub fn class_of(&self, value: &V) -> Option<usize> {
        self.counts
            .iter()
            .find(|(_, counts)| counts.contains_key(value))
            .map(|(class, _)| *class)
    }
}

#[derive(Debug)]
struct Class<V> {
    counts: BTreeMap<V, u64>,
    total: u64,
}

impl<V: CellValue> Class<V> {
    fn new() -> Self {
        Self {
            counts: BTreeMap::new(),
            total: 0,
        }
    }

    fn max(&self) -> Option<&V> {
        self.counts.keys().next_back()
    }

    fn add(&mut self, value: V, count: u64) {
        *self.counts.entry(value).or_insert(0) += count;
        self.total += count;
    }
}

/// Incremental classifier over a known total population.
#[derive(Debug)]
pub struct Classifier<V> {
    classes: Vec<Class<V>>,
    targets: Vec<u64>,
    /// Highest class holding any value.
    fill: usize,
}

impl<V: CellValue> Classifier<V> {
    /// Prepare `n_classes` classes for `total` values.
    ///
    /// Class `i` targets `total / n + (i < total % n)` cells rather than
    /// `ceil(total / n)`. The targets sum to `total`, so with distinct values
    /// the last class also ends within one cell of `ceil(total / n)`.
    pub fn new(n_classes: usize, total: u64) -> Result<Self> {
        if n_classes == 0 {
            return Err(StatsError::NoClasses);
        }
        let k = n_classes as u64;
        let targets = (0..k)
            .map(|i| total / k + u64::from(i < total % k))
            .collect();
        Ok(Self {
            classes: (0..n_classes).map(|_| Class::new()).collect(),
            targets,
            fill: 0,
        })
    }

    pub fn insert(&mut self, value: V) {
        let mut class = self.fill;
        while class > 0 && self.classes[class - 1].max().is_some_and(|max| value <= *max) {
            class -= 1;
        }
        self.classes[class].add(value, 1);
        self.rebalance(class);
    }

    /// Move the largest value of `class` upwards while the class meets its
    /// target without it. Recursion depth is bounded by the number of classes.
    fn rebalance(&mut self, class: usize) {
        if class + 1 >= self.classes.len() {
            return;
        }
        loop {
            let current = &mut self.classes[class];
            if current.counts.len() <= 1 {
                return;
            }
            let Some((_, &top_count)) = current.counts.last_key_value() else {
                return;
            };
            if current.total - top_count < self.targets[class] {
                return;
            }
            let Some((top, count)) = current.counts.pop_last() else {
                return;
            };
            current.total -= count;
            self.classes[class + 1].add(top, count);
            self.fill = self.fill.max(class + 1);
            self.rebalance(class + 1);
        }
    }

    pub fn finish(self) -> QuantileClassMap<V> {
        let mut result = QuantileClassMap {
            min: BTreeMap::new(),
            max: BTreeMap::new(),
            counts: BTreeMap::new(),
        };
        for (i, class) in self.classes.into_iter().enumerate() {
            let (Some(min), Some(max)) = (class.counts.keys().next(), class.counts.keys().next_back())
            else {
                continue;
            };
            result.min.insert(i, min.clone());
            result.max.insert(i, max.clone());
            result.counts.insert(i, class.counts);
        }
        result
    }
}

/// Classify every non-zero data value of `source` into `n_classes` classes.
///
/// # Examples
///
/// ```
/// use gridstore_stats::Classifier;
///
/// let mut classifier = Classifier::new(2, 4).unwrap();
/// for v in [4, 1, 3, 2] {
///     classifier.insert(v);
/// }
/// let classes = classifier.finish();
/// assert_eq!((classes.min[&0], classes.max[&0]), (1, 2));
/// assert_eq!((classes.min[&1], classes.max[&1]), (3, 4));
/// ```
pub fn quantile_class_map<V, S>(
    source: &S,
    n_classes: usize,
    memory: &dyn MemoryManager,
) -> Result<QuantileClassMap<V>>
where
    V: CellValue,
    S: ChunkSource<V> + ?Sized,
{
    if n_classes == 0 {
        return Err(StatsError::NoClasses);
    }
    let no_data = source.no_data_value();
    let zero = V::zero_value();
    let ids = source.chunk_ids();

    let mut total = 0u64;
    for &id in &ids {
        relieve_pressure(memory)?;
        if let Some(chunk) = source.chunk(id) {
            let zeros = if zero == no_data { 0 } else { chunk.count_of(&zero) };
            total += chunk.n() - zeros;
        }
    }
    debug!("classifying {} values into {} quantile classes", total, n_classes);

    let mut classifier = Classifier::new(n_classes, total)?;
    for &id in &ids {
        relieve_pressure(memory)?;
        let Some(chunk) = source.chunk(id) else {
            continue;
        };
        for value in chunk.unordered_values() {
            if value != no_data && value != zero {
                classifier.insert(value);
            }
        }
    }
    Ok(classifier.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::tests::TestGrid;
    use gridstore_core::{ChunkKind, NoMemoryManager};

    fn lcg_values(seed: u64, len: usize) -> Vec<i32> {
        let mut state = seed;
        let mut values: Vec<i32> = (1..=len as i32).collect();
        // Fisher-Yates shuffle so the insertion order is arbitrary.
        for i in (1..values.len()).rev() {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let j = (state >> 33) as usize % (i + 1);
            values.swap(i, j);
        }
        values
    }

    fn assert_contiguous(classes: &QuantileClassMap<i32>) {
        let mut previous_max = None;
        for (class, counts) in &classes.counts {
            let min = classes.min[class];
            let max = classes.max[class];
            assert_eq!(counts.keys().next(), Some(&min));
            assert_eq!(counts.keys().next_back(), Some(&max));
            if let Some(previous) = previous_max {
                assert!(previous < min, "class {class} overlaps the class below");
            }
            previous_max = Some(max);
        }
    }

    #[test]
    fn test_population_bound_for_distinct_values() {
        for (len, k) in [(100, 7), (64, 8), (10, 3), (5, 5)] {
            for seed in [1, 2, 3] {
                let mut classifier = Classifier::new(k, len as u64).unwrap();
                for v in lcg_values(seed, len) {
                    classifier.insert(v);
                }
                let classes = classifier.finish();
                assert_eq!(classes.len(), k);
                assert_contiguous(&classes);
                let ceil = (len as u64).div_ceil(k as u64);
                for class in 0..k {
                    let population = classes.population(class);
                    assert!(population.abs_diff(ceil) <= 1, "class {class} holds {population}");
                }
            }
        }
    }

    #[test]
    fn test_targets_spread_remainder_over_first_classes() {
        let classifier = Classifier::<i32>::new(4, 10).unwrap();
        assert_eq!(classifier.targets, vec![3, 3, 2, 2]);
        assert_eq!(classifier.targets.iter().sum::<u64>(), 10);
    }

    #[test]
    fn test_sorted_and_reversed_input() {
        for values in [(1..=12).collect::<Vec<i32>>(), (1..=12).rev().collect()] {
            let mut classifier = Classifier::new(3, 12).unwrap();
            for v in values {
                classifier.insert(v);
            }
            let classes = classifier.finish();
            assert_eq!(classes.min.values().copied().collect::<Vec<_>>(), vec![1, 5, 9]);
            assert_eq!(classes.max.values().copied().collect::<Vec<_>>(), vec![4, 8, 12]);
        }
    }

    #[test]
    fn test_duplicates_stay_in_one_class() {
        let mut classifier = Classifier::new(2, 7).unwrap();
        for v in [9, 1, 9, 2, 3, 9, 4] {
            classifier.insert(v);
        }
        let classes = classifier.finish();
        assert_contiguous(&classes);
        assert_eq!(classes.class_of(&9), Some(1));
        assert_eq!(classes.population(0), 4);
        assert_eq!(classes.population(1), 3);
    }

    #[test]
    fn test_fewer_values_than_classes() {
        let mut classifier = Classifier::new(4, 2).unwrap();
        classifier.insert(9);
        classifier.insert(2);
        let classes = classifier.finish();
        assert_eq!(classes.len(), 2);
        assert_contiguous(&classes);
        assert_eq!(classes.class_of(&2), Some(0));
    }

    #[test]
    fn test_zero_classes_is_an_error() {
        assert_eq!(Classifier::<i32>::new(0, 10).unwrap_err(), StatsError::NoClasses);
        let grid = TestGrid::new(ChunkKind::Map);
        assert_eq!(
            quantile_class_map(&grid, 0, &NoMemoryManager).unwrap_err(),
            StatsError::NoClasses
        );
    }

    #[test]
    fn test_grid_classification_skips_zero_and_no_data() {
        let mut grid = TestGrid::new(ChunkKind::Map);
        let mut col = 0;
        for v in [0, 0, 5, 1, 4, 2, 3, 6, -9999] {
            grid.set(col / 8, col % 8, v);
            col += 1;
        }
        let classes = quantile_class_map(&grid, 3, &NoMemoryManager).unwrap();
        assert_eq!(classes.len(), 3);
        assert_eq!(classes.class_of(&0), None);
        assert_eq!(classes.min.values().copied().collect::<Vec<_>>(), vec![1, 3, 5]);
        assert_eq!(classes.max.values().copied().collect::<Vec<_>>(), vec![2, 4, 6]);
        assert_contiguous(&classes);
    }

    #[test]
    fn test_serializes_per_class() {
        let mut classifier = Classifier::new(2, 2).unwrap();
        classifier.insert(7);
        classifier.insert(1);
        let json = serde_json::to_value(classifier.finish()).unwrap();
        assert_eq!(json["min"]["0"], 1);
        assert_eq!(json["max"]["1"], 7);
        assert_eq!(json["counts"]["1"]["7"], 1);
    }
}
