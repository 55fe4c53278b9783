//! Hybrid sparse/dense chunk.
//!
//! Every linear position `pos = row * cols + col` is in exactly one of four
//! categories:
//! 1. no-data: bit set in `no_data`;
//! 2. bitset-bucketed: bit set in `in_bitset_bucket`, value owned by the
//!    [`OffsetBitset`] in `bitset_buckets` whose bit for `pos` is set;
//! 3. hash-bucketed: bit set in `in_hash_bucket`, value owned by the cell set
//!    in `hash_buckets` containing the cell;
//! 4. default: none of the three bits set, value is `default_value`.
//!
//! A value other than the default and no-data owns at most one bucket, in one
//! of the two bucket maps. Empty buckets are removed.

use std::collections::{BTreeMap, HashSet};
use std::mem;

use bitvec::vec::BitVec;
use num_rational::BigRational;
use num_traits::Zero;

use super::{exact_product, CellId, ChunkCells, ChunkId};
use crate::bitset::OffsetBitset;
use crate::error::Result;
use crate::iter::{AspatialIter, RowMajorIter};
use crate::memory::{try_with_capacity, MemoryManager};
use crate::value::CellValue;

/// Share of non-default, non-no-data cells at or above which a new value gets
/// a bitset bucket instead of a hash bucket.
pub const BITSET_BUCKET_THRESHOLD: f64 = 0.5;

/// Chunk storing a default value implicitly and every other value in a bucket.
#[derive(Clone, Debug)]
pub struct MapChunk<V: CellValue> {
    id: ChunkId,
    rows: usize,
    cols: usize,
    no_data_value: V,
    default_value: V,
    no_data: BitVec,
    in_bitset_bucket: BitVec,
    in_hash_bucket: BitVec,
    bitset_buckets: BTreeMap<V, OffsetBitset>,
    hash_buckets: BTreeMap<V, HashSet<CellId>>,
    /// Highest position initialised so far, plus one.
    initialised: usize,
    cache_up_to_date: bool,
}

impl<V: CellValue> MapChunk<V> {
    /// Create a chunk whose every cell holds `default_value`.
    pub fn new(id: ChunkId, rows: usize, cols: usize, no_data_value: V, default_value: V) -> Self {
        let n_cells = rows * cols;
        Self {
            id,
            rows,
            cols,
            no_data_value,
            default_value,
            no_data: BitVec::repeat(false, n_cells),
            in_bitset_bucket: BitVec::repeat(false, n_cells),
            in_hash_bucket: BitVec::repeat(false, n_cells),
            bitset_buckets: BTreeMap::new(),
            hash_buckets: BTreeMap::new(),
            initialised: 0,
            cache_up_to_date: false,
        }
    }

    /// Create a chunk holding a copy of every cell of `source`.
    pub fn from_cells(source: &impl ChunkCells<V>, id: ChunkId, default_value: V) -> Self {
        let mut chunk = Self::new(
            id,
            source.rows(),
            source.cols(),
            source.no_data_value().clone(),
            default_value,
        );
        for row in 0..source.rows() {
            for col in 0..source.cols() {
                chunk.install(row, col, source.get_cell(row, col));
            }
        }
        chunk
    }

    /// Value implied for cells outside every bucket and the no-data set.
    pub fn default_value(&self) -> &V {
        &self.default_value
    }

    /// Values owned by bitset buckets, ascending.
    pub fn bitset_bucket_values(&self) -> impl Iterator<Item = &V> + '_ {
        self.bitset_buckets.keys()
    }

    /// Values owned by hash buckets, ascending.
    pub fn hash_bucket_values(&self) -> impl Iterator<Item = &V> + '_ {
        self.hash_buckets.keys()
    }

    /// Cells holding no-data, explicit or implied by the default.
    pub fn no_data_count(&self) -> usize {
        let implicit = if self.default_value == self.no_data_value {
            self.default_count()
        } else {
            0
        };
        self.no_data.count_ones() + implicit
    }

    /// Number of cells holding the default value implicitly.
    pub fn default_count(&self) -> usize {
        self.n_cells()
            - self.no_data.count_ones()
            - self.in_bitset_bucket.count_ones()
            - self.in_hash_bucket.count_ones()
    }

    /// Values in bucket order: defaults, bitset buckets, hash buckets. No-data
    /// cells are skipped.
    pub fn aspatial_iter(&self) -> AspatialIter<'_, V> {
        let defaults = if self.default_value == self.no_data_value {
            0
        } else {
            self.default_count()
        };
        AspatialIter::new(
            &self.default_value,
            defaults,
            self.bitset_buckets.iter(),
            self.hash_buckets.iter(),
        )
    }

    /// Cells as a `rows x cols` matrix.
    pub fn to_dense_array(&self, memory: &dyn MemoryManager) -> Result<Vec<Vec<V>>> {
        let flat = self.to_array_including_no_data(memory)?;
        let mut matrix = try_with_capacity(self.rows, memory)?;
        if self.cols > 0 {
            matrix.extend(flat.chunks(self.cols).map(<[V]>::to_vec));
        }
        Ok(matrix)
    }

    /// Every cell in row-major order.
    pub fn to_array_including_no_data(&self, memory: &dyn MemoryManager) -> Result<Vec<V>> {
        let mut values = try_with_capacity(self.n_cells(), memory)?;
        self.fill_dense(&mut values);
        Ok(values)
    }

    /// Data cells in row-major order.
    pub fn to_array_excluding_no_data(&self, memory: &dyn MemoryManager) -> Result<Vec<V>> {
        let mut dense = self.to_array_including_no_data(memory)?;
        dense.retain(|value| *value != self.no_data_value);
        Ok(dense)
    }

    /// Check the four-way partition of positions. Used by tests.
    pub fn is_consistent(&self) -> bool {
        let n_cells = self.n_cells();
        let mut owners = vec![0u8; n_cells];
        for pos in self.no_data.iter_ones() {
            owners[pos] += 1;
        }
        for (value, bits) in &self.bitset_buckets {
            if bits.is_empty() || self.hash_buckets.contains_key(value) {
                return false;
            }
            if *value == self.default_value || *value == self.no_data_value {
                return false;
            }
            for pos in bits.iter_ones() {
                if pos >= n_cells || !self.in_bitset_bucket[pos] {
                    return false;
                }
                owners[pos] += 1;
            }
        }
        for (value, cells) in &self.hash_buckets {
            if cells.is_empty() || *value == self.default_value || *value == self.no_data_value {
                return false;
            }
            for cell in cells {
                let pos = self.position(cell.row as usize, cell.col as usize);
                if !self.in_hash_bucket[pos] {
                    return false;
                }
                owners[pos] += 1;
            }
        }
        let flagged = self.in_bitset_bucket.count_ones() + self.in_hash_bucket.count_ones();
        let bucketed: usize = self.bitset_buckets.values().map(OffsetBitset::count).sum::<usize>()
            + self.hash_buckets.values().map(HashSet::len).sum::<usize>();
        flagged == bucketed && owners.iter().all(|&owners| owners <= 1)
    }

    fn position(&self, row: usize, col: usize) -> usize {
        row * self.cols + col
    }

    fn fill_dense(&self, values: &mut Vec<V>) {
        values.clear();
        values.resize(self.n_cells(), self.default_value.clone());
        for pos in self.no_data.iter_ones() {
            values[pos] = self.no_data_value.clone();
        }
        for (value, bits) in &self.bitset_buckets {
            for pos in bits.iter_ones() {
                values[pos] = value.clone();
            }
        }
        for (value, cells) in &self.hash_buckets {
            for cell in cells {
                values[self.position(cell.row as usize, cell.col as usize)] = value.clone();
            }
        }
    }

    /// Whether a value seen for the first time should get a bitset bucket.
    fn prefers_bitset(&self, pos: usize) -> bool {
        let seen = self.initialised.max(pos + 1);
        let valued = self.in_bitset_bucket.count_ones() + self.in_hash_bucket.count_ones();
        valued as f64 / seen as f64 >= BITSET_BUCKET_THRESHOLD
    }

    /// Record `value` at a position that currently holds the default value.
    fn install(&mut self, row: usize, col: usize, value: V) {
        let pos = self.position(row, col);
        self.initialised = self.initialised.max(pos + 1);
        if value == self.default_value {
            return;
        }
        if value == self.no_data_value {
            self.no_data.set(pos, true);
            return;
        }
        if let Some(bits) = self.bitset_buckets.get_mut(&value) {
            bits.insert(pos);
            self.in_bitset_bucket.set(pos, true);
            return;
        }
        if let Some(cells) = self.hash_buckets.get_mut(&value) {
            cells.insert(CellId::new(row, col));
            self.in_hash_bucket.set(pos, true);
            return;
        }
        if self.prefers_bitset(pos) {
            let mut bits = OffsetBitset::new(pos);
            bits.insert(pos);
            self.bitset_buckets.insert(value, bits);
            self.in_bitset_bucket.set(pos, true);
        } else {
            self.hash_buckets.insert(value, HashSet::from([CellId::new(row, col)]));
            self.in_hash_bucket.set(pos, true);
        }
    }

    /// Remove whatever owns the position, leaving it as a default cell.
    fn retire(&mut self, row: usize, col: usize) {
        let pos = self.position(row, col);
        if self.no_data[pos] {
            self.no_data.set(pos, false);
        } else if self.in_bitset_bucket[pos] {
            self.in_bitset_bucket.set(pos, false);
            let owner = self
                .bitset_buckets
                .iter_mut()
                .find(|(_, bits)| bits.contains(pos));
            if let Some((value, bits)) = owner {
                bits.remove(pos);
                if bits.is_empty() {
                    let value = value.clone();
                    self.bitset_buckets.remove(&value);
                }
            }
        } else if self.in_hash_bucket[pos] {
            self.in_hash_bucket.set(pos, false);
            let cell = CellId::new(row, col);
            let owner = self
                .hash_buckets
                .iter_mut()
                .find(|(_, cells)| cells.contains(&cell));
            if let Some((value, cells)) = owner {
                cells.remove(&cell);
                if cells.is_empty() {
                    let value = value.clone();
                    self.hash_buckets.remove(&value);
                }
            }
        }
    }

    fn counts_default(&self) -> bool {
        self.default_value != self.no_data_value && self.default_count() > 0
    }
}

impl<V: CellValue> ChunkCells<V> for MapChunk<V> {
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
        let pos = self.position(row, col);
        if self.no_data[pos] {
            return self.no_data_value.clone();
        }
        if self.in_bitset_bucket[pos] {
            if let Some(value) = self
                .bitset_buckets
                .iter()
                .find_map(|(value, bits)| bits.contains(pos).then_some(value))
            {
                return value.clone();
            }
        }
        if self.in_hash_bucket[pos] {
            let cell = CellId::new(row, col);
            if let Some(value) = self
                .hash_buckets
                .iter()
                .find_map(|(value, cells)| cells.contains(&cell).then_some(value))
            {
                return value.clone();
            }
        }
        self.default_value.clone()
    }

    fn set_cell(&mut self, row: usize, col: usize, value: V) -> Result<V> {
        let previous = self.get_cell(row, col);
        if previous == value {
            return Ok(previous);
        }
        self.retire(row, col);
        self.install(row, col, value);
        self.cache_up_to_date = false;
        Ok(previous)
    }

    fn init_cell(&mut self, row: usize, col: usize, value: V) -> Result<()> {
        self.install(row, col, value);
        Ok(())
    }

    /// Backed by a materialized dense copy of the chunk.
    fn iter(&self) -> RowMajorIter<'_, V> {
        let mut values = Vec::with_capacity(self.n_cells());
        self.fill_dense(&mut values);
        RowMajorIter::over_dense(values, self.rows, self.cols)
    }

    fn n(&self) -> u64 {
        (self.n_cells() - self.no_data_count()) as u64
    }

    fn sum(&self) -> BigRational {
        let mut sum = BigRational::zero();
        for (value, bits) in &self.bitset_buckets {
            sum += exact_product(value, bits.count() as u64);
        }
        for (value, cells) in &self.hash_buckets {
            sum += exact_product(value, cells.len() as u64);
        }
        if self.default_value != self.no_data_value {
            sum += exact_product(&self.default_value, self.default_count() as u64);
        }
        sum
    }

    fn min(&self) -> V {
        let candidates = [
            self.bitset_buckets.keys().next(),
            self.hash_buckets.keys().next(),
            self.counts_default().then_some(&self.default_value),
        ];
        candidates
            .into_iter()
            .flatten()
            .min()
            .cloned()
            .unwrap_or_else(|| self.no_data_value.clone())
    }

    fn max(&self) -> V {
        let candidates = [
            self.bitset_buckets.keys().next_back(),
            self.hash_buckets.keys().next_back(),
            self.counts_default().then_some(&self.default_value),
        ];
        candidates
            .into_iter()
            .flatten()
            .max()
            .cloned()
            .unwrap_or_else(|| self.no_data_value.clone())
    }

    fn count_of(&self, value: &V) -> u64 {
        if *value == self.no_data_value {
            return 0;
        }
        if *value == self.default_value {
            return self.default_count() as u64;
        }
        if let Some(bits) = self.bitset_buckets.get(value) {
            return bits.count() as u64;
        }
        self.hash_buckets
            .get(value)
            .map_or(0, |cells| cells.len() as u64)
    }

    fn value_counts(&self) -> BTreeMap<V, u64> {
        let mut counts: BTreeMap<V, u64> = self
            .bitset_buckets
            .iter()
            .map(|(value, bits)| (value.clone(), bits.count() as u64))
            .collect();
        counts.extend(
            self.hash_buckets
                .iter()
                .map(|(value, cells)| (value.clone(), cells.len() as u64)),
        );
        if self.counts_default() {
            counts.insert(self.default_value.clone(), self.default_count() as u64);
        }
        counts
    }

    fn worth_clearing(&self) -> bool {
        !self.no_data.is_empty()
    }

    fn cache_up_to_date(&self) -> bool {
        self.cache_up_to_date
    }

    fn set_cache_up_to_date(&mut self, up_to_date: bool) {
        self.cache_up_to_date = up_to_date;
    }

    fn clear(&mut self) {
        self.no_data = BitVec::new();
        self.in_bitset_bucket = BitVec::new();
        self.in_hash_bucket = BitVec::new();
        self.bitset_buckets = BTreeMap::new();
        self.hash_buckets = BTreeMap::new();
    }

    fn heap_size(&self) -> usize {
        let flags = (self.no_data.capacity()
            + self.in_bitset_bucket.capacity()
            + self.in_hash_bucket.capacity())
            / 8;
        let entry = mem::size_of::<V>();
        let bitsets: usize = self
            .bitset_buckets
            .iter()
            .map(|(value, bits)| {
                entry + value.heap_bytes() + mem::size_of::<OffsetBitset>() + bits.heap_size()
            })
            .sum();
        let hashes: usize = self
            .hash_buckets
            .iter()
            .map(|(value, cells)| {
                entry + value.heap_bytes() + cells.capacity() * (mem::size_of::<CellId>() + 1)
            })
            .sum();
        flags + bitsets + hashes
    }
}
