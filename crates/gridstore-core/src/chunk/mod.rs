//! Chunk encodings.
//!
//! A grid is partitioned into rectangular chunks and each chunk picks its own
//! encoding:
//! - [`ArrayChunk`]: one slot per cell, O(1) everything.
//! - [`MapChunk`]: a default value plus sorted value buckets, for chunks dominated
//!   by one value.
//! - [`SingletChunk`]: one value for every cell.
//!
//! All three implement [`ChunkCells`]; [`Chunk`] wraps them so a grid can hold a
//! mix, and [`ChunkKind`] is the factory that builds them.

mod array;
mod map;
mod singlet;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use num_rational::BigRational;
use num_traits::Zero;
use serde::{Deserialize, Serialize};

use crate::aggregate::{median_of_counts, modes_of_counts, standard_deviation_of_counts};
use crate::context::GridContext;
use crate::error::{ChunkError, Result};
use crate::iter::{ChunkValues, RowMajorIter};
use crate::memory::MemoryManager;
use crate::value::{exact_count, exact_to_f64, CellValue};

pub use array::ArrayChunk;
pub use map::{MapChunk, BITSET_BUCKET_THRESHOLD};
pub use singlet::SingletChunk;

/// Location of a chunk within its grid.
///
/// Ordered row-major so chunk maps iterate deterministically.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChunkId {
    /// Chunk row (global row / chunk rows)
    pub row: u32,
    /// Chunk column (global col / chunk cols)
    pub col: u32,
}

impl ChunkId {
    pub const fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

/// Location of a cell within its chunk.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CellId {
    pub row: u32,
    pub col: u32,
}

impl CellId {
    pub const fn new(row: usize, col: usize) -> Self {
        Self {
            row: row as u32,
            col: col as u32,
        }
    }
}

/// The cell contract shared by every chunk encoding.
///
/// Coordinates are local to the chunk and must be in range; chunks do not
/// validate them. Aggregates ignore no-data cells, and aggregates over a chunk
/// without data return the no-data value.
pub trait ChunkCells<V: CellValue> {
    fn id(&self) -> ChunkId;

    fn rows(&self) -> usize;

    fn cols(&self) -> usize;

    fn no_data_value(&self) -> &V;

    fn n_cells(&self) -> usize {
        self.rows() * self.cols()
    }

    fn get_cell(&self, row: usize, col: usize) -> V;

    /// Write a cell and return the value it replaced.
    fn set_cell(&mut self, row: usize, col: usize, value: V) -> Result<V>;

    /// Write a cell during construction, when there is no previous value to
    /// retire.
    fn init_cell(&mut self, row: usize, col: usize, value: V) -> Result<()>;

    /// Cell values in row-major order.
    fn iter(&self) -> RowMajorIter<'_, V>;

    /// Number of cells holding something other than no-data.
    fn n(&self) -> u64;

    /// Exact sum of all data cells.
    fn sum(&self) -> BigRational;

    fn min(&self) -> V;

    fn max(&self) -> V;

    /// Number of data cells equal to `value`. Always 0 for no-data.
    fn count_of(&self, value: &V) -> u64;

    /// Sorted data values with their cell counts.
    fn value_counts(&self) -> BTreeMap<V, u64>;

    fn mean(&self) -> f64 {
        let n = self.n();
        if n == 0 {
            return self.no_data_value().to_f64();
        }
        exact_to_f64(&(self.sum() / exact_count(n)))
    }

    fn median(&self, _memory: &dyn MemoryManager) -> Result<f64> {
        Ok(median_of_counts(&self.value_counts()).unwrap_or_else(|| self.no_data_value().to_f64()))
    }

    /// Most frequent data values; empty when the chunk holds no data.
    fn mode(&self) -> BTreeSet<V> {
        modes_of_counts(&self.value_counts())
    }

    /// Population standard deviation of the data cells.
    fn standard_deviation(&self) -> f64 {
        if self.n() == 0 {
            return self.no_data_value().to_f64();
        }
        standard_deviation_of_counts(&self.value_counts(), self.mean())
    }

    /// Whether clearing this chunk frees a meaningful amount of memory.
    fn worth_clearing(&self) -> bool;

    /// Whether a persisted copy of this chunk matches its in-memory state.
    fn cache_up_to_date(&self) -> bool;

    fn set_cache_up_to_date(&mut self, up_to_date: bool);

    /// Drop the backing storage. A cleared chunk must not be read again.
    fn clear(&mut self);

    /// Approximate heap bytes held by the chunk.
    fn heap_size(&self) -> usize;
}

/// A chunk in any of the three encodings.
#[derive(Clone, Debug)]
pub enum Chunk<V: CellValue> {
    Array(ArrayChunk<V>),
    Map(MapChunk<V>),
    Singlet(SingletChunk<V>),
}

macro_rules! dispatch {
    ($self:ident, $chunk:ident => $body:expr) => {
        match $self {
            Chunk::Array($chunk) => $body,
            Chunk::Map($chunk) => $body,
            Chunk::Singlet($chunk) => $body,
        }
    };
}

impl<V: CellValue> Chunk<V> {
    pub fn kind(&self) -> ChunkKind {
        match self {
            Chunk::Array(_) => ChunkKind::Array,
            Chunk::Map(_) => ChunkKind::Map,
            Chunk::Singlet(_) => ChunkKind::Singlet,
        }
    }

    /// Data values in whatever order is cheapest for the encoding.
    ///
    /// Map chunks iterate their buckets a-spatially and skip no-data cells;
    /// the other encodings yield every cell in row-major order.
    pub fn unordered_values(&self) -> ChunkValues<'_, V> {
        match self {
            Chunk::Map(chunk) => ChunkValues::Aspatial(chunk.aspatial_iter()),
            other => ChunkValues::RowMajor(other.iter()),
        }
    }

    pub fn as_map(&self) -> Option<&MapChunk<V>> {
        match self {
            Chunk::Map(chunk) => Some(chunk),
            _ => None,
        }
    }
}

impl<V: CellValue> ChunkCells<V> for Chunk<V> {
    fn id(&self) -> ChunkId {
        dispatch!(self, c => c.id())
    }

    fn rows(&self) -> usize {
        dispatch!(self, c => c.rows())
    }

    fn cols(&self) -> usize {
        dispatch!(self, c => c.cols())
    }

    fn no_data_value(&self) -> &V {
        dispatch!(self, c => c.no_data_value())
    }

    fn get_cell(&self, row: usize, col: usize) -> V {
        dispatch!(self, c => c.get_cell(row, col))
    }

    fn set_cell(&mut self, row: usize, col: usize, value: V) -> Result<V> {
        dispatch!(self, c => c.set_cell(row, col, value))
    }

    fn init_cell(&mut self, row: usize, col: usize, value: V) -> Result<()> {
        dispatch!(self, c => c.init_cell(row, col, value))
    }

    fn iter(&self) -> RowMajorIter<'_, V> {
        dispatch!(self, c => c.iter())
    }

    fn n(&self) -> u64 {
        dispatch!(self, c => c.n())
    }

    fn sum(&self) -> BigRational {
        dispatch!(self, c => c.sum())
    }

    fn min(&self) -> V {
        dispatch!(self, c => c.min())
    }

    fn max(&self) -> V {
        dispatch!(self, c => c.max())
    }

    fn count_of(&self, value: &V) -> u64 {
        dispatch!(self, c => c.count_of(value))
    }

    fn value_counts(&self) -> BTreeMap<V, u64> {
        dispatch!(self, c => c.value_counts())
    }

    fn mean(&self) -> f64 {
        dispatch!(self, c => c.mean())
    }

    fn median(&self, memory: &dyn MemoryManager) -> Result<f64> {
        dispatch!(self, c => c.median(memory))
    }

    fn mode(&self) -> BTreeSet<V> {
        dispatch!(self, c => c.mode())
    }

    fn standard_deviation(&self) -> f64 {
        dispatch!(self, c => c.standard_deviation())
    }

    fn worth_clearing(&self) -> bool {
        dispatch!(self, c => c.worth_clearing())
    }

    fn cache_up_to_date(&self) -> bool {
        dispatch!(self, c => c.cache_up_to_date())
    }

    fn set_cache_up_to_date(&mut self, up_to_date: bool) {
        dispatch!(self, c => c.set_cache_up_to_date(up_to_date))
    }

    fn clear(&mut self) {
        dispatch!(self, c => c.clear())
    }

    fn heap_size(&self) -> usize {
        dispatch!(self, c => c.heap_size())
    }
}

/// Chunk encoding, and the factory for it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkKind {
    Array,
    #[default]
    Map,
    Singlet,
}

impl ChunkKind {
    /// Create a chunk of this kind holding only no-data.
    ///
    /// # Examples
    ///
    /// ```
    /// use gridstore_core::{ChunkCells, ChunkId, ChunkKind, GridContext, GridDimensions};
    ///
    /// struct Raster(GridDimensions);
    ///
    /// impl GridContext<i32> for Raster {
    ///     fn dimensions(&self) -> &GridDimensions {
    ///         &self.0
    ///     }
    ///     fn no_data_value(&self) -> i32 {
    ///         -9999
    ///     }
    /// }
    ///
    /// let raster = Raster(GridDimensions::new(10, 10, 4, 4));
    /// let chunk = ChunkKind::Array.create(&raster, ChunkId::new(2, 2));
    /// assert_eq!((chunk.rows(), chunk.cols()), (2, 2));
    /// assert_eq!(chunk.get_cell(1, 1), -9999);
    /// assert_eq!(chunk.n(), 0);
    /// ```
    pub fn create<V: CellValue, G: GridContext<V>>(self, grid: &G, id: ChunkId) -> Chunk<V> {
        let (rows, cols) = grid.chunk_extent(id);
        let no_data = grid.no_data_value();
        match self {
            ChunkKind::Array => Chunk::Array(ArrayChunk::new(id, rows, cols, no_data)),
            ChunkKind::Map => Chunk::Map(MapChunk::new(id, rows, cols, no_data.clone(), no_data)),
            ChunkKind::Singlet => Chunk::Singlet(SingletChunk::new(id, rows, cols, no_data.clone(), no_data)),
        }
    }

    /// Create a chunk of this kind holding a copy of `source`'s cells.
    ///
    /// `default_value` only matters for map chunks; without one, the most
    /// frequent cell value of `source` (no-data included) is used. Fails with
    /// [`ChunkError::NotUniform`] when asked for a singlet from a chunk holding
    /// more than one value.
    pub fn create_from<V: CellValue>(
        self,
        source: &Chunk<V>,
        id: ChunkId,
        default_value: Option<V>,
    ) -> Result<Chunk<V>> {
        match self {
            ChunkKind::Array => Ok(Chunk::Array(ArrayChunk::from_cells(source, id))),
            ChunkKind::Map => {
                let default_value = default_value.unwrap_or_else(|| most_common_cell(source));
                Ok(Chunk::Map(MapChunk::from_cells(source, id, default_value)))
            }
            ChunkKind::Singlet => {
                let value = uniform_value(source).ok_or(ChunkError::NotUniform(source.id()))?;
                let (rows, cols) = (source.rows(), source.cols());
                let no_data = source.no_data_value().clone();
                Ok(Chunk::Singlet(SingletChunk::new(id, rows, cols, no_data, value)))
            }
        }
    }
}

impl fmt::Display for ChunkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChunkKind::Array => write!(f, "array"),
            ChunkKind::Map => write!(f, "map"),
            ChunkKind::Singlet => write!(f, "singlet"),
        }
    }
}

impl FromStr for ChunkKind {
    type Err = ChunkError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "array" => Ok(ChunkKind::Array),
            "map" => Ok(ChunkKind::Map),
            "singlet" => Ok(ChunkKind::Singlet),
            _ => Err(ChunkError::UnknownKind(s.to_string())),
        }
    }
}

/// Most frequent cell value, counting no-data cells too.
pub(crate) fn most_common_cell<V: CellValue>(source: &Chunk<V>) -> V {
    let no_data_count = source.n_cells() as u64 - source.n();
    let mut best = (source.no_data_value().clone(), no_data_count);
    for (value, count) in source.value_counts() {
        if count > best.1 {
            best = (value, count);
        }
    }
    best.0
}

/// The single value held by every cell, if there is one.
pub(crate) fn uniform_value<V: CellValue>(source: &Chunk<V>) -> Option<V> {
    let n = source.n();
    if n == 0 {
        return Some(source.no_data_value().clone());
    }
    if n != source.n_cells() as u64 {
        return None;
    }
    let min = source.min();
    (min == source.max()).then_some(min)
}

/// Exact `value * count`.
pub(crate) fn exact_product<V: CellValue>(value: &V, count: u64) -> BigRational {
    if count == 0 {
        return BigRational::zero();
    }
    value.to_exact() * exact_count(count)
}
