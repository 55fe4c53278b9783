//! Grid-wide scans over a [`ChunkSource`].
//!
//! Every scan visits the chunks in id order and gives the memory manager a
//! chance to free memory before each chunk. Chunks missing from the source
//! hold only no-data and contribute nothing.

use std::collections::{BTreeMap, BTreeSet};

use gridstore_core::aggregate::{median_of_counts, modes_of_counts, standard_deviation_of_counts};
use gridstore_core::{relieve_pressure, CellValue, Chunk, ChunkCells, ChunkSource, MemoryManager};
use tracing::debug;

use crate::error::Result;
use crate::running::RunningStats;

/// Visit every chunk held by `source`.
pub(crate) fn for_each_chunk<V, S, F>(source: &S, memory: &dyn MemoryManager, mut visit: F) -> Result<()>
where
    V: CellValue,
    S: ChunkSource<V> + ?Sized,
    F: FnMut(&Chunk<V>),
{
    for id in source.chunk_ids() {
        relieve_pressure(memory)?;
        if let Some(chunk) = source.chunk(id) {
            visit(chunk);
        }
    }
    Ok(())
}

/// Recompute count, sum and extremes from scratch.
pub fn full_scan<V, S>(source: &S, memory: &dyn MemoryManager) -> Result<RunningStats<V>>
where
    V: CellValue,
    S: ChunkSource<V> + ?Sized,
{
    let mut stats = RunningStats::new(source.no_data_value());
    for_each_chunk(source, memory, |chunk| stats.merge_chunk(chunk))?;
    debug!("full scan of {} grid: n={}", V::KIND, stats.n());
    Ok(stats)
}

/// Sorted data values of the whole grid with their cell counts.
pub fn value_counts<V, S>(source: &S, memory: &dyn MemoryManager) -> Result<BTreeMap<V, u64>>
where
    V: CellValue,
    S: ChunkSource<V> + ?Sized,
{
    let mut counts = BTreeMap::new();
    for_each_chunk(source, memory, |chunk| {
        for (value, count) in chunk.value_counts() {
            *counts.entry(value).or_insert(0) += count;
        }
    })?;
    Ok(counts)
}

/// Median of every data cell; no-data when the grid holds none.
pub fn median<V, S>(source: &S, memory: &dyn MemoryManager) -> Result<f64>
where
    V: CellValue,
    S: ChunkSource<V> + ?Sized,
{
    let counts = value_counts(source, memory)?;
    Ok(median_of_counts(&counts).unwrap_or_else(|| source.no_data_value().to_f64()))
}

/// Most frequent data values; empty when the grid holds no data.
pub fn mode<V, S>(source: &S, memory: &dyn MemoryManager) -> Result<BTreeSet<V>>
where
    V: CellValue,
    S: ChunkSource<V> + ?Sized,
{
    Ok(modes_of_counts(&value_counts(source, memory)?))
}

/// Population standard deviation of every data cell; no-data when the grid
/// holds none.
pub fn standard_deviation<V, S>(source: &S, memory: &dyn MemoryManager) -> Result<f64>
where
    V: CellValue,
    S: ChunkSource<V> + ?Sized,
{
    let stats = full_scan(source, memory)?;
    if stats.n() == 0 {
        return Ok(source.no_data_value().to_f64());
    }
    let counts = value_counts(source, memory)?;
    Ok(standard_deviation_of_counts(&counts, stats.mean()))
}
