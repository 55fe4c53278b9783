use std::collections::{BTreeMap, BTreeSet};

use gridstore_core::{
    CellValue, Chunk, ChunkCells, ChunkError, ChunkId, ChunkKind, ChunkSource, GridContext,
    GridDimensions, MemoryManager, NoMemoryManager,
};
use gridstore_stats::{
    median, mode, quantile_class_map, standard_deviation, value_counts, GridStatistics,
    QuantileClassMap, RunningStats, StatsMode,
};
use tracing::{debug, info, warn};

use crate::budget::MemoryBudget;
use crate::config::{validate_dimensions, GridConfig};
use crate::error::{GridError, Result};

/// Chunks and no-data value borrowed apart from the rest of the grid, so
/// statistics can be refreshed while they read the chunks.
struct ChunkView<'a, V: CellValue> {
    chunks: &'a BTreeMap<ChunkId, Chunk<V>>,
    no_data_value: &'a V,
}

impl<V: CellValue> ChunkSource<V> for ChunkView<'_, V> {
    fn no_data_value(&self) -> V {
        self.no_data_value.clone()
    }

    fn chunk_ids(&self) -> Vec<ChunkId> {
        self.chunks.keys().copied().collect()
    }

    fn chunk(&self, id: ChunkId) -> Option<&Chunk<V>> {
        self.chunks.get(&id)
    }
}

fn memory_of(budget: &Option<MemoryBudget>) -> &dyn MemoryManager {
    match budget {
        Some(budget) => budget,
        None => &NoMemoryManager,
    }
}

/// An in-memory grid of chunks.
///
/// Chunks are created on first write; a chunk id without a chunk reads as
/// no-data. Global coordinates are validated here, once, before they reach a
/// chunk.
///
/// # Examples
///
/// ```
/// use gridstore_grid::{Grid, GridConfig};
///
/// let config = GridConfig {
///     n_rows: 4,
///     n_cols: 4,
///     ..GridConfig::default()
/// };
/// let mut grid = Grid::new(&config, -9999).unwrap();
/// grid.set_cell(0, 0, 5).unwrap();
/// grid.set_cell(0, 1, 5).unwrap();
/// assert_eq!(grid.get_cell(3, 3).unwrap(), -9999);
///
/// let stats = grid.statistics().unwrap();
/// assert_eq!(stats.n(), 2);
/// assert_eq!(stats.mean(), 5.0);
/// ```
#[derive(Debug)]
pub struct Grid<V: CellValue> {
    dimensions: GridDimensions,
    no_data_value: V,
    chunk_kind: ChunkKind,
    chunks: BTreeMap<ChunkId, Chunk<V>>,
    stats: GridStatistics<V>,
    budget: Option<MemoryBudget>,
}

impl<V: CellValue> Grid<V> {
    /// Create an empty grid from a validated configuration, with a memory
    /// budget when one is configured.
    pub fn new(config: &GridConfig, no_data_value: V) -> Result<Self> {
        let mut grid = Self::with_dimensions(
            config.dimensions(),
            no_data_value,
            config.chunk_kind,
            config.stats_mode,
        )?;
        grid.budget = config.memory_budget_bytes.map(MemoryBudget::new);
        Ok(grid)
    }

    /// Create an empty grid with explicit geometry. Fails with
    /// [`GridError::InvalidConfig`] for an empty grid or chunk extent.
    pub fn with_dimensions(
        dimensions: GridDimensions,
        no_data_value: V,
        chunk_kind: ChunkKind,
        stats_mode: StatsMode,
    ) -> Result<Self> {
        validate_dimensions(&dimensions)?;
        Ok(Self {
            dimensions,
            stats: GridStatistics::new(stats_mode, no_data_value.clone()),
            no_data_value,
            chunk_kind,
            chunks: BTreeMap::new(),
            budget: None,
        })
    }

    /// Encoding given to newly created chunks.
    pub fn chunk_kind(&self) -> ChunkKind {
        self.chunk_kind
    }

    /// Whether statistics are kept eagerly or recomputed on demand.
    pub fn stats_mode(&self) -> StatsMode {
        self.stats.mode()
    }

    /// The memory budget, if the grid was configured with one.
    pub fn budget(&self) -> Option<&MemoryBudget> {
        self.budget.as_ref()
    }

    /// Held chunks in id order.
    pub fn chunks(&self) -> impl Iterator<Item = &Chunk<V>> + '_ {
        self.chunks.values()
    }

    /// Read a cell by global coordinate. Cells of absent chunks read as no-data.
    pub fn get_cell(&self, row: u64, col: u64) -> Result<V> {
        self.check_bounds(row, col)?;
        let id = self.dimensions.chunk_id_of(row, col);
        let (local_row, local_col) = self.dimensions.to_local(row, col);
        Ok(self
            .chunks
            .get(&id)
            .map_or_else(|| self.no_data_value.clone(), |chunk| chunk.get_cell(local_row, local_col)))
    }

    /// Write a cell and return the value it replaced.
    ///
    /// A singlet chunk asked to hold a second value is re-encoded as a map
    /// chunk and the write is retried.
    pub fn set_cell(&mut self, row: u64, col: u64, value: V) -> Result<V> {
        self.check_bounds(row, col)?;
        let id = self.dimensions.chunk_id_of(row, col);
        let (local_row, local_col) = self.dimensions.to_local(row, col);
        if !self.chunks.contains_key(&id) {
            let chunk = self.chunk_kind.create(&*self, id);
            debug!("Created {} chunk {}", chunk.kind(), id);
            self.track(id, &chunk);
            self.chunks.insert(id, chunk);
        }
        let chunk = self.chunks.get_mut(&id).ok_or(GridError::UnknownChunk(id))?;
        let old = match chunk.set_cell(local_row, local_col, value.clone()) {
            Ok(old) => old,
            Err(ChunkError::ReencodeRequired { .. }) => {
                debug!("Re-encoding chunk {} from {} to map", id, chunk.kind());
                let mut reencoded = ChunkKind::Map.create_from(&*chunk, id, None)?;
                let old = reencoded.set_cell(local_row, local_col, value.clone())?;
                *chunk = reencoded;
                if let Some(budget) = self.budget.as_mut() {
                    budget.on_chunk_loaded(id, chunk.heap_size());
                }
                old
            }
            Err(err) => return Err(err.into()),
        };
        self.stats.on_write(&old, &value);
        Ok(old)
    }

    /// Install a chunk, returning the one it replaces.
    pub fn insert_chunk(&mut self, chunk: Chunk<V>) -> Result<Option<Chunk<V>>> {
        let id = chunk.id();
        if !self.dimensions.contains_chunk(id) {
            return Err(GridError::ChunkOutOfRange(id));
        }
        let expected = self.dimensions.chunk_extent(id);
        let actual = (chunk.rows(), chunk.cols());
        if expected != actual {
            return Err(GridError::ExtentMismatch {
                id,
                expected,
                actual,
            });
        }
        if chunk.no_data_value() != &self.no_data_value {
            return Err(GridError::NoDataMismatch(id));
        }
        self.track(id, &chunk);
        self.stats.on_chunk_added(&chunk);
        let previous = self.chunks.insert(id, chunk);
        if let Some(previous) = &previous {
            self.stats.on_chunk_removed(previous);
        }
        Ok(previous)
    }

    /// Take a chunk out of the grid. Its cells read as no-data afterwards.
    pub fn remove_chunk(&mut self, id: ChunkId) -> Option<Chunk<V>> {
        let chunk = self.chunks.remove(&id)?;
        self.stats.on_chunk_removed(&chunk);
        if let Some(budget) = self.budget.as_mut() {
            budget.on_chunk_unloaded(&id);
        }
        Some(chunk)
    }

    /// Re-encode a chunk with the smallest encoding for its contents and
    /// return that encoding.
    pub fn optimise_chunk(&mut self, id: ChunkId) -> Result<ChunkKind> {
        let chunk = self.chunks.get(&id).ok_or(GridError::UnknownChunk(id))?;
        let kind = preferred_kind(chunk);
        if kind != chunk.kind() {
            debug!("Re-encoding chunk {} from {} to {}", id, chunk.kind(), kind);
            let reencoded = kind.create_from(chunk, id, None)?;
            self.track(id, &reencoded);
            self.chunks.insert(id, reencoded);
        }
        Ok(kind)
    }

    /// Re-encode every chunk with its preferred encoding. Returns the heap
    /// bytes saved.
    pub fn compact(&mut self) -> Result<usize> {
        let before = self.heap_size();
        let ids: Vec<ChunkId> = self.chunks.keys().copied().collect();
        for id in ids {
            self.optimise_chunk(id)?;
        }
        let saved = before.saturating_sub(self.heap_size());
        info!("Compacted {} chunks, saved {} bytes", self.chunks.len(), saved);
        Ok(saved)
    }

    /// Approximate heap bytes held by all chunks.
    pub fn heap_size(&self) -> usize {
        self.chunks.values().map(ChunkCells::heap_size).sum()
    }

    /// Count, exact sum and extremes of the data cells, refreshed if needed.
    pub fn statistics(&mut self) -> Result<&RunningStats<V>> {
        self.prepare_scan()?;
        let view = ChunkView {
            chunks: &self.chunks,
            no_data_value: &self.no_data_value,
        };
        Ok(self.stats.current(&view, memory_of(&self.budget))?)
    }

    /// Mean of the data cells, or no-data when there are none.
    pub fn mean(&mut self) -> Result<f64> {
        Ok(self.statistics()?.mean())
    }

    /// Population standard deviation of the data cells.
    pub fn standard_deviation(&mut self) -> Result<f64> {
        self.prepare_scan()?;
        Ok(standard_deviation(&*self, memory_of(&self.budget))?)
    }

    /// Median of the data cells; the mean of the two middle values for an even
    /// count.
    pub fn median(&mut self) -> Result<f64> {
        self.prepare_scan()?;
        Ok(median(&*self, memory_of(&self.budget))?)
    }

    /// Most frequent data values; empty when the grid holds no data.
    pub fn mode(&mut self) -> Result<BTreeSet<V>> {
        self.prepare_scan()?;
        Ok(mode(&*self, memory_of(&self.budget))?)
    }

    /// Number of cells holding each data value.
    pub fn value_counts(&mut self) -> Result<BTreeMap<V, u64>> {
        self.prepare_scan()?;
        Ok(value_counts(&*self, memory_of(&self.budget))?)
    }

    /// Split the non-zero data values into `n_classes` contiguous classes of
    /// near-equal population.
    pub fn quantile_class_map(&mut self, n_classes: usize) -> Result<QuantileClassMap<V>> {
        self.prepare_scan()?;
        Ok(quantile_class_map(&*self, n_classes, memory_of(&self.budget))?)
    }

    fn check_bounds(&self, row: u64, col: u64) -> Result<()> {
        if self.dimensions.contains(row, col) {
            return Ok(());
        }
        Err(GridError::OutOfBounds {
            row,
            col,
            n_rows: self.dimensions.n_rows,
            n_cols: self.dimensions.n_cols,
        })
    }

    fn track(&mut self, id: ChunkId, chunk: &Chunk<V>) {
        if let Some(budget) = self.budget.as_mut() {
            budget.on_chunk_loaded(id, chunk.heap_size());
        }
    }

    /// Refresh chunk usage and compact once if the budget is exceeded.
    fn prepare_scan(&mut self) -> Result<()> {
        let Some(budget) = self.budget.as_mut() else {
            return Ok(());
        };
        for (id, chunk) in &self.chunks {
            budget.on_chunk_loaded(*id, chunk.heap_size());
        }
        if !budget.is_over_budget() {
            return Ok(());
        }
        info!("Memory budget exceeded by {} bytes, compacting", budget.overage());
        self.compact()?;
        if let Some(budget) = &self.budget {
            if budget.is_over_budget() {
                warn!(
                    "Still {} bytes over budget after compaction, scanning resident chunks anyway",
                    budget.overage()
                );
            }
        }
        Ok(())
    }
}

/// Smallest encoding for the contents of `chunk`: singlet when every cell is
/// equal, map when one value covers at least half the cells, array otherwise.
fn preferred_kind<V: CellValue>(chunk: &Chunk<V>) -> ChunkKind {
    let n_cells = chunk.n_cells() as u64;
    let no_data = n_cells - chunk.n();
    let counts = chunk.value_counts();
    let uniform = match counts.len() {
        0 => true,
        1 => no_data == 0,
        _ => false,
    };
    if uniform {
        return ChunkKind::Singlet;
    }
    let most_common = counts.values().copied().max().unwrap_or(0).max(no_data);
    if most_common * 2 >= n_cells {
        ChunkKind::Map
    } else {
        ChunkKind::Array
    }
}

impl<V: CellValue> GridContext<V> for Grid<V> {
    fn dimensions(&self) -> &GridDimensions {
        &self.dimensions
    }

    fn no_data_value(&self) -> V {
        self.no_data_value.clone()
    }
}

impl<V: CellValue> ChunkSource<V> for Grid<V> {
    fn no_data_value(&self) -> V {
        self.no_data_value.clone()
    }

    fn chunk_ids(&self) -> Vec<ChunkId> {
        self.chunks.keys().copied().collect()
    }

    fn chunk(&self, id: ChunkId) -> Option<&Chunk<V>> {
        self.chunks.get(&id)
    }
}
