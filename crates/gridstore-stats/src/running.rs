use gridstore_core::{exact_count, exact_to_f64, CellValue, Chunk, ChunkCells};
use num_rational::BigRational;
use num_traits::Zero;

/// Running count, exact sum and extremes of the data cells seen so far.
///
/// `n_min`/`n_max` count the cells currently equal to the extremes. When the
/// last cell holding an extreme is removed the extreme becomes stale: every
/// remaining value is still on the right side of it, but it may no longer be
/// attained. A stale extreme is repaired by a later value that reaches or passes
/// it, or by a rescan.
#[derive(Clone, Debug, PartialEq)]
pub struct RunningStats<V: CellValue> {
    no_data_value: V,
    n: u64,
    sum: BigRational,
    min: Option<V>,
    max: Option<V>,
    n_min: u64,
    n_max: u64,
    stale_min: bool,
    stale_max: bool,
}

impl<V: CellValue> RunningStats<V> {
    /// Empty statistics for a grid with the given no-data value.
    pub fn new(no_data_value: V) -> Self {
        Self {
            no_data_value,
            n: 0,
            sum: BigRational::zero(),
            min: None,
            max: None,
            n_min: 0,
            n_max: 0,
            stale_min: false,
            stale_max: false,
        }
    }

    pub fn no_data_value(&self) -> &V {
        &self.no_data_value
    }

    /// Number of data cells.
    pub fn n(&self) -> u64 {
        self.n
    }

    /// Exact sum of the data cells.
    pub fn sum(&self) -> &BigRational {
        &self.sum
    }

    /// Smallest data value, or no-data when there is none.
    pub fn min(&self) -> V {
        self.min.clone().unwrap_or_else(|| self.no_data_value.clone())
    }

    /// Largest data value, or no-data when there is none.
    pub fn max(&self) -> V {
        self.max.clone().unwrap_or_else(|| self.no_data_value.clone())
    }

    /// Cells currently equal to the minimum.
    pub fn n_min(&self) -> u64 {
        self.n_min
    }

    pub fn n_max(&self) -> u64 {
        self.n_max
    }

    /// Mean of the data cells, or no-data when there are none.
    pub fn mean(&self) -> f64 {
        if self.n == 0 {
            return self.no_data_value.to_f64();
        }
        exact_to_f64(&(&self.sum / exact_count(self.n)))
    }

    /// Whether an extreme went stale and only a rescan can restore it.
    pub fn needs_rescan(&self) -> bool {
        self.stale_min || self.stale_max
    }

    /// Account for a cell now holding `value`. No-data is ignored.
    pub fn add(&mut self, value: &V) {
        self.add_many(value, 1);
    }

    /// Account for a cell that no longer holds `value`. No-data is ignored.
    pub fn remove(&mut self, value: &V) {
        self.remove_many(value, 1);
    }

    /// Account for `count` more cells holding `value`.
    pub fn add_many(&mut self, value: &V, count: u64) {
        if count == 0 || *value == self.no_data_value {
            return;
        }
        self.n += count;
        self.sum += value.to_exact() * exact_count(count);
        self.merge_min(value, count);
        self.merge_max(value, count);
    }

    /// Account for `count` fewer cells holding `value`.
    pub fn remove_many(&mut self, value: &V, count: u64) {
        if count == 0 || *value == self.no_data_value {
            return;
        }
        self.n = self.n.saturating_sub(count);
        self.sum -= value.to_exact() * exact_count(count);
        if self.n == 0 {
            self.reset_extremes();
            return;
        }
        if self.min.as_ref() == Some(value) {
            self.n_min = self.n_min.saturating_sub(count);
            self.stale_min |= self.n_min == 0;
        }
        if self.max.as_ref() == Some(value) {
            self.n_max = self.n_max.saturating_sub(count);
            self.stale_max |= self.n_max == 0;
        }
    }

    /// Fold in the data cells of a chunk using its closed-form aggregates.
    pub fn merge_chunk(&mut self, chunk: &Chunk<V>) {
        let n = chunk.n();
        if n == 0 {
            return;
        }
        self.n += n;
        self.sum += chunk.sum();
        let min = chunk.min();
        let n_min = chunk.count_of(&min);
        self.merge_min(&min, n_min);
        let max = chunk.max();
        let n_max = chunk.count_of(&max);
        self.merge_max(&max, n_max);
    }

    /// Take out the data cells of a chunk that was previously merged.
    pub fn unmerge_chunk(&mut self, chunk: &Chunk<V>) {
        let n = chunk.n();
        if n == 0 {
            return;
        }
        self.n = self.n.saturating_sub(n);
        self.sum -= chunk.sum();
        if self.n == 0 {
            self.reset_extremes();
            return;
        }
        if let Some(min) = self.min.clone() {
            self.n_min = self.n_min.saturating_sub(chunk.count_of(&min));
            self.stale_min |= self.n_min == 0;
        }
        if let Some(max) = self.max.clone() {
            self.n_max = self.n_max.saturating_sub(chunk.count_of(&max));
            self.stale_max |= self.n_max == 0;
        }
    }

    /// Forget everything seen so far.
    pub fn reset(&mut self) {
        self.n = 0;
        self.sum = BigRational::zero();
        self.reset_extremes();
    }

    fn reset_extremes(&mut self) {
        self.min = None;
        self.max = None;
        self.n_min = 0;
        self.n_max = 0;
        self.stale_min = false;
        self.stale_max = false;
    }

    fn merge_min(&mut self, value: &V, count: u64) {
        match &self.min {
            Some(min) if value > min => {}
            Some(min) if value == min => {
                self.n_min += count;
                self.stale_min = false;
            }
            _ => {
                self.min = Some(value.clone());
                self.n_min = count;
                self.stale_min = false;
            }
        }
    }

    fn merge_max(&mut self, value: &V, count: u64) {
        match &self.max {
            Some(max) if value < max => {}
            Some(max) if value == max => {
                self.n_max += count;
                self.stale_max = false;
            }
            _ => {
                self.max = Some(value.clone());
                self.n_max = count;
                self.stale_max = false;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridstore_core::{ChunkId, MapChunk};

    #[test]
    fn test_add_tracks_extremes_and_multiplicity() {
        let mut stats = RunningStats::new(-1);
        for v in [4, 2, 9, 2, -1, 9, 9] {
            stats.add(&v);
        }
        assert_eq!(stats.n(), 6);
        assert_eq!(stats.sum(), &exact_count(35));
        assert_eq!((stats.min(), stats.n_min()), (2, 2));
        assert_eq!((stats.max(), stats.n_max()), (9, 3));
        assert!(!stats.needs_rescan());
    }

    #[test]
    fn test_removing_last_extreme_goes_stale() {
        let mut stats = RunningStats::new(-1);
        for v in [1, 5, 5, 8] {
            stats.add(&v);
        }
        stats.remove(&5);
        assert!(!stats.needs_rescan());
        stats.remove(&8);
        assert!(stats.needs_rescan());
        assert_eq!(stats.n(), 2);

        // A value at the stale bound makes it attained again.
        stats.add(&8);
        assert!(!stats.needs_rescan());
        assert_eq!((stats.max(), stats.n_max()), (8, 1));
    }

    #[test]
    fn test_new_extreme_repairs_staleness() {
        let mut stats = RunningStats::new(-1);
        stats.add(&3);
        stats.add(&6);
        stats.remove(&3);
        assert!(stats.needs_rescan());
        stats.add(&2);
        assert!(!stats.needs_rescan());
        assert_eq!(stats.min(), 2);
    }

    #[test]
    fn test_empty_stats_report_no_data() {
        let mut stats = RunningStats::new(-9999);
        assert_eq!(stats.min(), -9999);
        assert_eq!(stats.max(), -9999);
        assert_eq!(stats.mean(), -9999.0);
        stats.add(&4);
        stats.remove(&4);
        assert_eq!(stats.n(), 0);
        assert_eq!(stats.min(), -9999);
        assert!(!stats.needs_rescan());
    }

    #[test]
    fn test_merge_and_unmerge_chunk() {
        let mut map = MapChunk::new(ChunkId::new(0, 0), 4, 4, -9999, 0);
        map.set_cell(0, 0, 5).unwrap();
        map.set_cell(0, 1, 5).unwrap();
        map.set_cell(1, 1, -9999).unwrap();
        let chunk = Chunk::Map(map);

        let mut stats = RunningStats::new(-9999);
        stats.merge_chunk(&chunk);
        assert_eq!(stats.n(), 15);
        assert_eq!(stats.sum(), &exact_count(10));
        assert_eq!((stats.min(), stats.n_min()), (0, 13));
        assert_eq!((stats.max(), stats.n_max()), (5, 2));

        stats.add(&7);
        stats.unmerge_chunk(&chunk);
        assert_eq!(stats.n(), 1);
        assert_eq!(stats.max(), 7);
        assert!(stats.needs_rescan(), "min 0 is no longer attained");
    }
}
