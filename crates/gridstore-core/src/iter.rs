//! Iteration over chunk cell values.
//!
//! Iterators are single-pass; call `iter()` again for another pass.

use std::collections::{btree_map, HashSet};
use std::iter::FusedIterator;

use crate::bitset::OffsetBitset;
use crate::chunk::CellId;
use crate::value::CellValue;

enum Cells<'a, V> {
    Slice(&'a [V]),
    Dense(Vec<V>),
    Constant(&'a V),
}

impl<V: CellValue> Cells<'_, V> {
    fn at(&self, pos: usize) -> V {
        match self {
            Cells::Slice(values) => values[pos].clone(),
            Cells::Dense(values) => values[pos].clone(),
            Cells::Constant(value) => (*value).clone(),
        }
    }
}

/// Cursor over `[0, rows) x [0, cols)`, column fastest.
pub struct RowMajorIter<'a, V> {
    cells: Cells<'a, V>,
    rows: usize,
    cols: usize,
    row: usize,
    col: usize,
}

impl<'a, V: CellValue> RowMajorIter<'a, V> {
    /// Iterate a dense row-major slice of `rows * cols` values.
    pub fn over_slice(values: &'a [V], rows: usize, cols: usize) -> Self {
        Self::with_cells(Cells::Slice(values), rows, cols)
    }

    /// Iterate an owned, materialized row-major vector.
    pub fn over_dense(values: Vec<V>, rows: usize, cols: usize) -> Self {
        Self::with_cells(Cells::Dense(values), rows, cols)
    }

    /// Iterate `rows * cols` copies of one value.
    pub fn constant(value: &'a V, rows: usize, cols: usize) -> Self {
        Self::with_cells(Cells::Constant(value), rows, cols)
    }

    fn with_cells(cells: Cells<'a, V>, rows: usize, cols: usize) -> Self {
        // An empty column range would never advance the row.
        let rows = if cols == 0 { 0 } else { rows };
        Self {
            cells,
            rows,
            cols,
            row: 0,
            col: 0,
        }
    }

    /// Local `(row, col)` of the value the next call to `next` returns.
    pub fn position(&self) -> Option<(usize, usize)> {
        (self.row < self.rows).then_some((self.row, self.col))
    }

    fn remaining(&self) -> usize {
        if self.row >= self.rows {
            return 0;
        }
        (self.rows - self.row) * self.cols - self.col
    }
}

impl<V: CellValue> Iterator for RowMajorIter<'_, V> {
    type Item = V;

    fn next(&mut self) -> Option<V> {
        if self.row >= self.rows {
            return None;
        }
        let value = self.cells.at(self.row * self.cols + self.col);
        self.col += 1;
        if self.col == self.cols {
            self.col = 0;
            self.row += 1;
        }
        Some(value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.remaining();
        (remaining, Some(remaining))
    }
}

impl<V: CellValue> ExactSizeIterator for RowMajorIter<'_, V> {}

impl<V: CellValue> FusedIterator for RowMajorIter<'_, V> {}

/// Values of a map chunk in bucket order rather than cell order.
///
/// Yields the implicit default cells first, then each bitset bucket, then each
/// hash bucket. No-data cells are skipped.
pub struct AspatialIter<'a, V> {
    default_value: &'a V,
    defaults_left: usize,
    bitset_buckets: btree_map::Iter<'a, V, OffsetBitset>,
    hash_buckets: btree_map::Iter<'a, V, HashSet<CellId>>,
    current: Option<(&'a V, usize)>,
}

impl<'a, V: CellValue> AspatialIter<'a, V> {
    pub(crate) fn new(
        default_value: &'a V,
        defaults_left: usize,
        bitset_buckets: btree_map::Iter<'a, V, OffsetBitset>,
        hash_buckets: btree_map::Iter<'a, V, HashSet<CellId>>,
    ) -> Self {
        Self {
            default_value,
            defaults_left,
            bitset_buckets,
            hash_buckets,
            current: None,
        }
    }
}

impl<V: CellValue> Iterator for AspatialIter<'_, V> {
    type Item = V;

    fn next(&mut self) -> Option<V> {
        if self.defaults_left > 0 {
            self.defaults_left -= 1;
            return Some(self.default_value.clone());
        }
        loop {
            if let Some((value, left)) = &mut self.current {
                if *left > 0 {
                    *left -= 1;
                    return Some((*value).clone());
                }
            }
            self.current = match self.bitset_buckets.next() {
                Some((value, bits)) => Some((value, bits.count())),
                None => Some(self.hash_buckets.next().map(|(value, cells)| (value, cells.len()))?),
            };
        }
    }
}

impl<V: CellValue> FusedIterator for AspatialIter<'_, V> {}

/// Values of any chunk, in the cheapest order its encoding offers.
pub enum ChunkValues<'a, V> {
    RowMajor(RowMajorIter<'a, V>),
    Aspatial(AspatialIter<'a, V>),
}

impl<V: CellValue> Iterator for ChunkValues<'_, V> {
    type Item = V;

    fn next(&mut self) -> Option<V> {
        match self {
            ChunkValues::RowMajor(iter) => iter.next(),
            ChunkValues::Aspatial(iter) => iter.next(),
        }
    }
}
