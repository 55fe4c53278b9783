use std::fmt;
use std::str::FromStr;

use gridstore_core::{CellValue, Chunk, ChunkSource, MemoryManager};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, StatsError};
use crate::running::RunningStats;
use crate::scan::full_scan;

/// How a grid keeps its count, sum and extremes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatsMode {
    /// Maintained on every write.
    Updated,
    /// Recomputed by a full scan on demand.
    #[default]
    NotUpdated,
}

impl fmt::Display for StatsMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatsMode::Updated => write!(f, "updated"),
            StatsMode::NotUpdated => write!(f, "not_updated"),
        }
    }
}

impl FromStr for StatsMode {
    type Err = StatsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "updated" => Ok(StatsMode::Updated),
            "not_updated" => Ok(StatsMode::NotUpdated),
            _ => Err(StatsError::UnknownMode(s.to_string())),
        }
    }
}

/// Statistics maintained incrementally as cells are written.
///
/// Writes that overwrite the last cell holding an extreme leave that extreme
/// stale; [`UpdatedStats::refresh`] then falls back to one full scan.
#[derive(Clone, Debug)]
pub struct UpdatedStats<V: CellValue> {
    stats: RunningStats<V>,
}

impl<V: CellValue> UpdatedStats<V> {
    pub fn new(no_data_value: V) -> Self {
        Self {
            stats: RunningStats::new(no_data_value),
        }
    }

    /// Record that a cell changed from `old` to `new`.
    pub fn on_write(&mut self, old: &V, new: &V) {
        if old == new {
            return;
        }
        self.stats.remove(old);
        self.stats.add(new);
    }

    pub fn on_chunk_added(&mut self, chunk: &Chunk<V>) {
        self.stats.merge_chunk(chunk);
    }

    pub fn on_chunk_removed(&mut self, chunk: &Chunk<V>) {
        self.stats.unmerge_chunk(chunk);
    }

    /// Restore stale extremes with a full scan if needed.
    pub fn refresh<S>(&mut self, source: &S, memory: &dyn MemoryManager) -> Result<&RunningStats<V>>
    where
        S: ChunkSource<V> + ?Sized,
    {
        if self.stats.needs_rescan() {
            debug!("updated statistics lost an extreme, rescanning");
            self.stats = full_scan(source, memory)?;
        }
        Ok(&self.stats)
    }

    /// Current values; extremes may be stale, see [`RunningStats::needs_rescan`].
    pub fn stats(&self) -> &RunningStats<V> {
        &self.stats
    }
}

/// Statistics recomputed by a full scan, at most once per batch of writes.
#[derive(Clone, Debug)]
pub struct NotUpdatedStats<V: CellValue> {
    stats: RunningStats<V>,
    up_to_date: bool,
}

impl<V: CellValue> NotUpdatedStats<V> {
    pub fn new(no_data_value: V) -> Self {
        Self {
            stats: RunningStats::new(no_data_value),
            up_to_date: false,
        }
    }

    /// Whether no write happened since the last scan.
    pub fn is_up_to_date(&self) -> bool {
        self.up_to_date
    }

    /// Mark the statistics as needing a rescan.
    pub fn invalidate(&mut self) {
        self.up_to_date = false;
    }

    /// Rescan if anything changed since the last scan. Returns whether a scan
    /// ran; calling it again without an intervening write does nothing.
    pub fn update<S>(&mut self, source: &S, memory: &dyn MemoryManager) -> Result<bool>
    where
        S: ChunkSource<V> + ?Sized,
    {
        if self.up_to_date {
            return Ok(false);
        }
        self.stats = full_scan(source, memory)?;
        self.up_to_date = true;
        Ok(true)
    }

    /// Values as of the last scan.
    pub fn stats(&self) -> &RunningStats<V> {
        &self.stats
    }
}

/// The statistics a grid carries, in either mode.
#[derive(Clone, Debug)]
pub enum GridStatistics<V: CellValue> {
    Updated(UpdatedStats<V>),
    NotUpdated(NotUpdatedStats<V>),
}

impl<V: CellValue> GridStatistics<V> {
    pub fn new(mode: StatsMode, no_data_value: V) -> Self {
        match mode {
            StatsMode::Updated => GridStatistics::Updated(UpdatedStats::new(no_data_value)),
            StatsMode::NotUpdated => GridStatistics::NotUpdated(NotUpdatedStats::new(no_data_value)),
        }
    }

    /// Which engine is in use.
    pub fn mode(&self) -> StatsMode {
        match self {
            GridStatistics::Updated(_) => StatsMode::Updated,
            GridStatistics::NotUpdated(_) => StatsMode::NotUpdated,
        }
    }

    pub fn on_write(&mut self, old: &V, new: &V) {
        match self {
            GridStatistics::Updated(stats) => stats.on_write(old, new),
            GridStatistics::NotUpdated(stats) if old != new => stats.invalidate(),
            GridStatistics::NotUpdated(_) => {}
        }
    }

    pub fn on_chunk_added(&mut self, chunk: &Chunk<V>) {
        match self {
            GridStatistics::Updated(stats) => stats.on_chunk_added(chunk),
            GridStatistics::NotUpdated(stats) => stats.invalidate(),
        }
    }

    pub fn on_chunk_removed(&mut self, chunk: &Chunk<V>) {
        match self {
            GridStatistics::Updated(stats) => stats.on_chunk_removed(chunk),
            GridStatistics::NotUpdated(stats) => stats.invalidate(),
        }
    }

    /// Bring the statistics up to date and return them.
    pub fn current<S>(&mut self, source: &S, memory: &dyn MemoryManager) -> Result<&RunningStats<V>>
    where
        S: ChunkSource<V> + ?Sized,
    {
        match self {
            GridStatistics::Updated(stats) => stats.refresh(source, memory),
            GridStatistics::NotUpdated(stats) => {
                stats.update(source, memory)?;
                Ok(stats.stats())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::tests::TestGrid;
    use gridstore_core::{ChunkKind, NoMemoryManager};

    #[test]
    fn test_mode_parse_and_serde() {
        assert_eq!("updated".parse::<StatsMode>().unwrap(), StatsMode::Updated);
        assert_eq!("Not-Updated".parse::<StatsMode>().unwrap(), StatsMode::NotUpdated);
        assert!(matches!("eager".parse::<StatsMode>(), Err(StatsError::UnknownMode(_))));
        assert_eq!(serde_json::to_string(&StatsMode::NotUpdated).unwrap(), "\"not_updated\"");
        assert_eq!(StatsMode::Updated.to_string(), "updated");
    }

    #[test]
    fn test_updated_stats_follow_writes() {
        let mut grid = TestGrid::new(ChunkKind::Map);
        let mut stats = GridStatistics::new(StatsMode::Updated, -9999);
        for (row, col, value) in [(0, 0, 3), (1, 5, 8), (3, 7, 3)] {
            let old = grid.set(row, col, value);
            stats.on_write(&old, &value);
        }
        let current = stats.current(&grid, &NoMemoryManager).unwrap();
        assert_eq!(current.n(), 3);
        assert_eq!(current.min(), 3);
        assert_eq!(current.max(), 8);

        // Overwriting the only 8 forces a rescan for the new maximum.
        let old = grid.set(1, 5, 1);
        stats.on_write(&old, &1);
        let current = stats.current(&grid, &NoMemoryManager).unwrap();
        assert_eq!((current.min(), current.max()), (1, 3));
        assert_eq!(current.n_max(), 2);
    }

    #[test]
    fn test_updated_matches_full_scan() {
        let mut grid = TestGrid::new(ChunkKind::Array);
        let mut stats = UpdatedStats::new(-9999);
        let mut seed = 11u64;
        for _ in 0..200 {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
            let row = (seed >> 40) % 4;
            let col = (seed >> 20) % 8;
            let value = if seed % 7 == 0 { -9999 } else { ((seed >> 10) % 5) as i32 };
            let old = grid.set(row, col, value);
            stats.on_write(&old, &value);
        }
        let scanned = full_scan(&grid, &NoMemoryManager).unwrap();
        let refreshed = stats.refresh(&grid, &NoMemoryManager).unwrap();
        assert_eq!(refreshed.n(), scanned.n());
        assert_eq!(refreshed.sum(), scanned.sum());
        assert_eq!(refreshed.min(), scanned.min());
        assert_eq!(refreshed.max(), scanned.max());
    }

    #[test]
    fn test_lazy_update_is_idempotent() {
        let mut grid = TestGrid::new(ChunkKind::Map);
        let mut stats = NotUpdatedStats::new(-9999);
        grid.set(2, 2, 6);

        assert!(stats.update(&grid, &NoMemoryManager).unwrap());
        assert!(stats.is_up_to_date());
        let first = stats.stats().clone();
        assert!(!stats.update(&grid, &NoMemoryManager).unwrap());
        assert_eq!(stats.stats(), &first);
        assert_eq!(first.n(), 1);

        // A write the grid did not report is invisible until invalidation.
        grid.set(2, 3, 7);
        assert!(!stats.update(&grid, &NoMemoryManager).unwrap());
        assert_eq!(stats.stats().n(), 1);
        stats.invalidate();
        assert!(stats.update(&grid, &NoMemoryManager).unwrap());
        assert_eq!(stats.stats().n(), 2);
    }

    #[test]
    fn test_lazy_ignores_no_op_writes() {
        let grid = TestGrid::new(ChunkKind::Map);
        let mut stats = GridStatistics::new(StatsMode::NotUpdated, -9999);
        stats.current(&grid, &NoMemoryManager).unwrap();
        stats.on_write(&5, &5);
        let GridStatistics::NotUpdated(lazy) = &stats else {
            panic!("expected lazy statistics");
        };
        assert!(lazy.is_up_to_date());
        assert_eq!(stats.mode(), StatsMode::NotUpdated);
    }
}
