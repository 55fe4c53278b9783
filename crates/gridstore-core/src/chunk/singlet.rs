use std::collections::{BTreeMap, BTreeSet};

use num_rational::BigRational;
use num_traits::Zero;

use super::{exact_product, ChunkCells, ChunkId};
use crate::error::{ChunkError, Result};
use crate::iter::RowMajorIter;
use crate::memory::MemoryManager;
use crate::value::CellValue;

/// Chunk in which every cell holds the same value.
///
/// Writing a different value fails with [`ChunkError::ReencodeRequired`]; the
/// owning grid then converts the chunk to another encoding and retries.
#[derive(Clone, Debug)]
pub struct SingletChunk<V: CellValue> {
    id: ChunkId,
    rows: usize,
    cols: usize,
    no_data_value: V,
    value: V,
    cache_up_to_date: bool,
}

impl<V: CellValue> SingletChunk<V> {
    pub fn new(id: ChunkId, rows: usize, cols: usize, no_data_value: V, value: V) -> Self {
        Self {
            id,
            rows,
            cols,
            no_data_value,
            value,
            cache_up_to_date: false,
        }
    }

    pub fn value(&self) -> &V {
        &self.value
    }

    fn has_data(&self) -> bool {
        self.value != self.no_data_value && self.n_cells() > 0
    }

    fn accept(&self, value: V) -> Result<()> {
        if value == self.value {
            return Ok(());
        }
        Err(ChunkError::ReencodeRequired {
            id: self.id,
            value: format!("{:?}", self.value),
            attempted: format!("{value:?}"),
        })
    }
}

impl<V: CellValue> ChunkCells<V> for SingletChunk<V> {
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

    fn get_cell(&self, _row: usize, _col: usize) -> V {
        self.value.clone()
    }

    fn set_cell(&mut self, _row: usize, _col: usize, value: V) -> Result<V> {
        self.accept(value)?;
        Ok(self.value.clone())
    }

    fn init_cell(&mut self, _row: usize, _col: usize, value: V) -> Result<()> {
        self.accept(value)
    }

    fn iter(&self) -> RowMajorIter<'_, V> {
        RowMajorIter::constant(&self.value, self.rows, self.cols)
    }

    fn n(&self) -> u64 {
        if self.value == self.no_data_value {
            0
        } else {
            self.n_cells() as u64
        }
    }

    fn sum(&self) -> BigRational {
        if !self.has_data() {
            return BigRational::zero();
        }
        exact_product(&self.value, self.n())
    }

    fn min(&self) -> V {
        self.value.clone()
    }

    fn max(&self) -> V {
        self.value.clone()
    }

    fn count_of(&self, value: &V) -> u64 {
        if *value == self.value {
            self.n()
        } else {
            0
        }
    }

    fn value_counts(&self) -> BTreeMap<V, u64> {
        if !self.has_data() {
            return BTreeMap::new();
        }
        BTreeMap::from([(self.value.clone(), self.n())])
    }

    fn mean(&self) -> f64 {
        self.value.to_f64()
    }

    fn median(&self, _memory: &dyn MemoryManager) -> Result<f64> {
        Ok(self.value.to_f64())
    }

    fn mode(&self) -> BTreeSet<V> {
        if !self.has_data() {
            return BTreeSet::new();
        }
        BTreeSet::from([self.value.clone()])
    }

    fn standard_deviation(&self) -> f64 {
        if self.has_data() {
            0.0
        } else {
            self.no_data_value.to_f64()
        }
    }

    fn worth_clearing(&self) -> bool {
        false
    }

    fn cache_up_to_date(&self) -> bool {
        self.cache_up_to_date
    }

    fn set_cache_up_to_date(&mut self, up_to_date: bool) {
        self.cache_up_to_date = up_to_date;
    }

    fn clear(&mut self) {}

    fn heap_size(&self) -> usize {
        self.value.heap_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::NoMemoryManager;
    use crate::value::exact_count;

    fn sevens() -> SingletChunk<i32> {
        SingletChunk::new(ChunkId::new(0, 0), 4, 4, -9999, 7)
    }

    #[test]
    fn test_uniform_aggregates() {
        let chunk = sevens();
        assert_eq!(chunk.n(), 16);
        assert_eq!(chunk.sum(), exact_count(112));
        assert_eq!(chunk.min(), 7);
        assert_eq!(chunk.max(), 7);
        assert_eq!(chunk.mean(), 7.0);
        assert_eq!(chunk.median(&NoMemoryManager).unwrap(), 7.0);
        assert_eq!(chunk.standard_deviation(), 0.0);
        assert_eq!(chunk.mode().into_iter().collect::<Vec<_>>(), vec![7]);
        assert_eq!(chunk.count_of(&7), 16);
        assert_eq!(chunk.count_of(&8), 0);
        assert_eq!(chunk.iter().count(), 16);
        assert!(chunk.iter().all(|v| v == 7));
    }

    #[test]
    fn test_same_value_write_is_accepted() {
        let mut chunk = sevens();
        assert_eq!(chunk.set_cell(2, 3, 7).unwrap(), 7);
        chunk.init_cell(0, 0, 7).unwrap();
        assert_eq!(chunk.get_cell(2, 3), 7);
    }

    #[test]
    fn test_different_value_requires_reencode() {
        let mut chunk = sevens();
        let err = chunk.set_cell(1, 1, 8).unwrap_err();
        assert_eq!(
            err,
            ChunkError::ReencodeRequired {
                id: ChunkId::new(0, 0),
                value: "7".to_string(),
                attempted: "8".to_string(),
            }
        );
        assert_eq!(chunk.get_cell(1, 1), 7);
        assert!(chunk.init_cell(0, 0, -9999).is_err());
    }

    #[test]
    fn test_no_data_singlet() {
        let chunk = SingletChunk::new(ChunkId::new(0, 0), 4, 4, -9999, -9999);
        assert_eq!(chunk.n(), 0);
        assert_eq!(chunk.sum(), BigRational::zero());
        assert_eq!(chunk.min(), -9999);
        assert_eq!(chunk.mean(), -9999.0);
        assert_eq!(chunk.standard_deviation(), -9999.0);
        assert!(chunk.mode().is_empty());
        assert!(chunk.value_counts().is_empty());
        assert_eq!(chunk.count_of(&-9999), 0);
    }

    #[test]
    fn test_never_worth_clearing() {
        let mut chunk = sevens();
        assert!(!chunk.worth_clearing());
        chunk.clear();
        assert_eq!(chunk.get_cell(0, 0), 7);
        assert_eq!(chunk.heap_size(), 0);
    }
}
