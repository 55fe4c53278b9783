use std::collections::BTreeMap;
use std::mem;

use num_rational::BigRational;
use num_traits::Zero;

use super::{ChunkCells, ChunkId};
use crate::aggregate::median_of_sorted;
use crate::error::Result;
use crate::iter::RowMajorIter;
use crate::memory::{try_with_capacity, MemoryManager};
use crate::value::CellValue;

/// Dense chunk with one slot per cell.
#[derive(Clone, Debug)]
pub struct ArrayChunk<V: CellValue> {
    id: ChunkId,
    rows: usize,
    cols: usize,
    no_data_value: V,
    /// Row-major cell values, `rows * cols` long until cleared.
    values: Vec<V>,
    cache_up_to_date: bool,
}

impl<V: CellValue> ArrayChunk<V> {
    /// Create a chunk with every cell set to no-data.
    pub fn new(id: ChunkId, rows: usize, cols: usize, no_data_value: V) -> Self {
        Self {
            id,
            rows,
            cols,
            values: vec![no_data_value.clone(); rows * cols],
            no_data_value,
            cache_up_to_date: false,
        }
    }

    /// Create a chunk holding a copy of every cell of `source`.
    pub fn from_cells(source: &impl ChunkCells<V>, id: ChunkId) -> Self {
        let (rows, cols) = (source.rows(), source.cols());
        let mut values = Vec::with_capacity(rows * cols);
        for row in 0..rows {
            for col in 0..cols {
                values.push(source.get_cell(row, col));
            }
        }
        Self {
            id,
            rows,
            cols,
            no_data_value: source.no_data_value().clone(),
            values,
            cache_up_to_date: false,
        }
    }

    /// Row-major cell values.
    pub fn values(&self) -> &[V] {
        &self.values
    }

    fn data(&self) -> impl Iterator<Item = &V> + '_ {
        self.values.iter().filter(move |v| **v != self.no_data_value)
    }
}

impl<V: CellValue> ChunkCells<V> for ArrayChunk<V> {
    fn id(&self) -> ChunkId {
        self.id
    }

    fn rows(&self) -> usize {
        self.rows
    }

    fn cols(&self) -> usize {
        self.cols
    }

    fn no_data_value(&self) -> &V {
        &self.no_data_value
    }

    fn get_cell(&self, row: usize, col: usize) -> V {
        self.values[row * self.cols + col].clone()
    }

    fn set_cell(&mut self, row: usize, col: usize, value: V) -> Result<V> {
        let slot = &mut self.values[row * self.cols + col];
        if *slot != value {
            self.cache_up_to_date = false;
        }
        Ok(mem::replace(slot, value))
    }

    fn init_cell(&mut self, row: usize, col: usize, value: V) -> Result<()> {
        self.values[row * self.cols + col] = value;
        Ok(())
    }

    fn iter(&self) -> RowMajorIter<'_, V> {
        RowMajorIter::over_slice(&self.values, self.rows, self.cols)
    }

    fn n(&self) -> u64 {
        self.data().count() as u64
    }

    fn sum(&self) -> BigRational {
        self.data()
            .fold(BigRational::zero(), |acc, value| acc + value.to_exact())
    }

    fn min(&self) -> V {
        self.data()
            .min()
            .cloned()
            .unwrap_or_else(|| self.no_data_value.clone())
    }

    fn max(&self) -> V {
        self.data()
            .max()
            .cloned()
            .unwrap_or_else(|| self.no_data_value.clone())
    }

    fn count_of(&self, value: &V) -> u64 {
        if *value == self.no_data_value {
            return 0;
        }
        self.values.iter().filter(|v| *v == value).count() as u64
    }

    fn value_counts(&self) -> BTreeMap<V, u64> {
        let mut counts = BTreeMap::new();
        for value in self.data() {
            *counts.entry(value.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// Sorts a copy of the data cells.
    fn median(&self, memory: &dyn MemoryManager) -> Result<f64> {
        let mut sorted = try_with_capacity(self.n() as usize, memory)?;
        sorted.extend(self.data().cloned());
        sorted.sort_unstable();
        Ok(median_of_sorted(&sorted).unwrap_or_else(|| self.no_data_value.to_f64()))
    }

    fn standard_deviation(&self) -> f64 {
        let n = self.n();
        if n == 0 {
            return self.no_data_value.to_f64();
        }
        let mean = self.mean();
        let squares: f64 = self
            .data()
            .map(|value| {
                let diff = value.to_f64() - mean;
                diff * diff
            })
            .sum();
        (squares / n as f64).sqrt()
    }

    fn worth_clearing(&self) -> bool {
        !self.values.is_empty()
    }

    fn cache_up_to_date(&self) -> bool {
        self.cache_up_to_date
    }

    fn set_cache_up_to_date(&mut self, up_to_date: bool) {
        self.cache_up_to_date = up_to_date;
    }

    fn clear(&mut self) {
        self.values = Vec::new();
    }

    fn heap_size(&self) -> usize {
        self.values.capacity() * mem::size_of::<V>()
            + self.values.iter().map(CellValue::heap_bytes).sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::NoMemoryManager;
    use crate::value::exact_count;
    use ordered_float::OrderedFloat;

    fn chunk() -> ArrayChunk<i32> {
        ArrayChunk::new(ChunkId::new(0, 0), 3, 4, -9999)
    }

    #[test]
    fn test_new_is_no_data() {
        let chunk = chunk();
        assert_eq!(chunk.values().len(), 12);
        assert!(chunk.iter().all(|v| v == -9999));
        assert_eq!(chunk.n(), 0);
        assert_eq!(chunk.sum(), BigRational::zero());
        assert_eq!(chunk.max(), -9999);
        assert_eq!(chunk.standard_deviation(), -9999.0);
    }

    #[test]
    fn test_set_cell_returns_previous() {
        let mut chunk = chunk();
        chunk.set_cache_up_to_date(true);

        assert_eq!(chunk.set_cell(1, 2, 4).unwrap(), -9999);
        assert!(!chunk.cache_up_to_date());
        assert_eq!(chunk.get_cell(1, 2), 4);

        chunk.set_cache_up_to_date(true);
        assert_eq!(chunk.set_cell(1, 2, 4).unwrap(), 4);
        assert!(chunk.cache_up_to_date(), "unchanged value keeps the cache valid");
    }

    #[test]
    fn test_aggregates() {
        let mut chunk = chunk();
        for (i, value) in [3, 1, 4, 1, 5].into_iter().enumerate() {
            chunk.set_cell(0, i % 4, value).unwrap();
            if i == 4 {
                chunk.set_cell(2, 3, value).unwrap();
            }
        }
        // Row 0 ends as 5, 1, 4, 1 and (2, 3) holds 5.
        assert_eq!(chunk.n(), 5);
        assert_eq!(chunk.sum(), exact_count(16));
        assert_eq!(chunk.min(), 1);
        assert_eq!(chunk.max(), 5);
        assert_eq!(chunk.count_of(&1), 2);
        assert_eq!(chunk.count_of(&-9999), 0);
        assert_eq!(chunk.mean(), 3.2);
        assert_eq!(chunk.median(&NoMemoryManager).unwrap(), 4.0);
        assert_eq!(chunk.mode().into_iter().collect::<Vec<_>>(), vec![1, 5]);
    }

    #[test]
    fn test_standard_deviation_matches_counts() {
        let mut chunk: ArrayChunk<OrderedFloat<f64>> =
            ArrayChunk::new(ChunkId::new(0, 0), 2, 4, OrderedFloat(-1.0));
        for (i, v) in [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0].into_iter().enumerate() {
            chunk.set_cell(i / 4, i % 4, OrderedFloat(v)).unwrap();
        }
        assert!((chunk.standard_deviation() - 2.0).abs() < 1e-12);
        let by_counts = crate::aggregate::standard_deviation_of_counts(&chunk.value_counts(), chunk.mean());
        assert!((chunk.standard_deviation() - by_counts).abs() < 1e-12);
    }

    #[test]
    fn test_from_cells_copies() {
        let mut source = chunk();
        source.set_cell(2, 0, 11).unwrap();
        let copy = ArrayChunk::from_cells(&source, ChunkId::new(5, 5));
        assert_eq!(copy.id(), ChunkId::new(5, 5));
        assert_eq!(copy.get_cell(2, 0), 11);
        assert_eq!(copy.values(), source.values());
    }

    #[test]
    fn test_clear_drops_storage() {
        let mut chunk = chunk();
        assert!(chunk.worth_clearing());
        assert!(chunk.heap_size() >= 12 * 4);
        chunk.clear();
        assert!(!chunk.worth_clearing());
        assert_eq!(chunk.heap_size(), 0);
    }
}
