//! What the chunk layer needs to know about the grid that owns it.

use crate::chunk::{Chunk, ChunkId};
use crate::value::CellValue;

/// Extent of a grid in cells and the nominal extent of its chunks.
///
/// Chunks in the last chunk row or column are smaller when the grid extent is
/// not a multiple of the chunk extent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GridDimensions {
    pub n_rows: u64,
    pub n_cols: u64,
    pub chunk_rows: usize,
    pub chunk_cols: usize,
}

impl GridDimensions {
    /// # Examples
    ///
    /// ```
    /// use gridstore_core::{ChunkId, GridDimensions};
    ///
    /// let dims = GridDimensions::new(100, 70, 32, 32);
    /// assert_eq!(dims.n_chunk_rows(), 4);
    /// assert_eq!(dims.n_chunk_cols(), 3);
    /// assert_eq!(dims.chunk_extent(ChunkId::new(3, 2)), (4, 6));
    /// ```
    pub const fn new(n_rows: u64, n_cols: u64, chunk_rows: usize, chunk_cols: usize) -> Self {
        Self {
            n_rows,
            n_cols,
            chunk_rows,
            chunk_cols,
        }
    }

    /// Chunk rows, counting a short last row.
    pub fn n_chunk_rows(&self) -> u32 {
        self.n_rows.div_ceil(self.chunk_rows as u64) as u32
    }

    /// Chunk columns, counting a short last column.
    pub fn n_chunk_cols(&self) -> u32 {
        self.n_cols.div_ceil(self.chunk_cols as u64) as u32
    }

    /// Chunk ids the grid can address, whether or not they are held.
    pub fn n_chunks(&self) -> u64 {
        u64::from(self.n_chunk_rows()) * u64::from(self.n_chunk_cols())
    }

    pub fn n_cells(&self) -> u64 {
        self.n_rows * self.n_cols
    }

    /// Whether the global cell coordinate is inside the grid.
    pub fn contains(&self, row: u64, col: u64) -> bool {
        row < self.n_rows && col < self.n_cols
    }

    /// Whether the chunk id addresses a chunk of this grid.
    pub fn contains_chunk(&self, id: ChunkId) -> bool {
        id.row < self.n_chunk_rows() && id.col < self.n_chunk_cols()
    }

    /// Rows and columns of the chunk, accounting for a short last row or column.
    pub fn chunk_extent(&self, id: ChunkId) -> (usize, usize) {
        let first_row = u64::from(id.row) * self.chunk_rows as u64;
        let first_col = u64::from(id.col) * self.chunk_cols as u64;
        let rows = (self.n_rows.saturating_sub(first_row)).min(self.chunk_rows as u64);
        let cols = (self.n_cols.saturating_sub(first_col)).min(self.chunk_cols as u64);
        (rows as usize, cols as usize)
    }

    /// Chunk holding the global cell.
    pub fn chunk_id_of(&self, row: u64, col: u64) -> ChunkId {
        ChunkId::new(
            (row / self.chunk_rows as u64) as u32,
            (col / self.chunk_cols as u64) as u32,
        )
    }

    /// Position of the global cell inside its chunk.
    pub fn to_local(&self, row: u64, col: u64) -> (usize, usize) {
        (
            (row % self.chunk_rows as u64) as usize,
            (col % self.chunk_cols as u64) as usize,
        )
    }

    /// Global coordinate of a cell given by chunk and local position.
    pub fn to_global(&self, id: ChunkId, local_row: usize, local_col: usize) -> (u64, u64) {
        (
            u64::from(id.row) * self.chunk_rows as u64 + local_row as u64,
            u64::from(id.col) * self.chunk_cols as u64 + local_col as u64,
        )
    }

    /// Every chunk id in row-major order.
    pub fn chunk_ids(&self) -> impl Iterator<Item = ChunkId> {
        let n_cols = self.n_chunk_cols();
        (0..self.n_chunk_rows()).flat_map(move |row| (0..n_cols).map(move |col| ChunkId::new(row, col)))
    }
}

/// The grid as seen by a chunk factory.
pub trait GridContext<V: CellValue> {
    fn dimensions(&self) -> &GridDimensions;

    /// Sentinel meaning "no observation" for this grid.
    fn no_data_value(&self) -> V;

    fn chunk_extent(&self, id: ChunkId) -> (usize, usize) {
        self.dimensions().chunk_extent(id)
    }
}

/// The grid as seen by the statistics engine: a no-data value and the chunks
/// that are currently held in memory.
///
/// A chunk id without a chunk holds only no-data cells.
pub trait ChunkSource<V: CellValue> {
    fn no_data_value(&self) -> V;

    /// Ids of the chunks held, in ascending order.
    fn chunk_ids(&self) -> Vec<ChunkId>;

    fn chunk(&self, id: ChunkId) -> Option<&Chunk<V>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_counts() {
        let dims = GridDimensions::new(64, 64, 16, 16);
        assert_eq!(dims.n_chunk_rows(), 4);
        assert_eq!(dims.n_chunk_cols(), 4);
        assert_eq!(dims.n_chunks(), 16);
        assert_eq!(dims.n_cells(), 4096);

        let dims = GridDimensions::new(65, 17, 16, 16);
        assert_eq!(dims.n_chunk_rows(), 5);
        assert_eq!(dims.n_chunk_cols(), 2);
    }

    #[test]
    fn test_trailing_chunk_extent() {
        let dims = GridDimensions::new(65, 17, 16, 16);
        assert_eq!(dims.chunk_extent(ChunkId::new(0, 0)), (16, 16));
        assert_eq!(dims.chunk_extent(ChunkId::new(4, 0)), (1, 16));
        assert_eq!(dims.chunk_extent(ChunkId::new(0, 1)), (16, 1));
        assert_eq!(dims.chunk_extent(ChunkId::new(4, 1)), (1, 1));
    }

    #[test]
    fn test_local_and_global() {
        let dims = GridDimensions::new(100, 100, 16, 16);
        assert_eq!(dims.chunk_id_of(17, 33), ChunkId::new(1, 2));
        assert_eq!(dims.to_local(17, 33), (1, 1));
        assert_eq!(dims.to_global(ChunkId::new(1, 2), 1, 1), (17, 33));
        assert_eq!(dims.to_global(ChunkId::new(0, 0), 15, 15), (15, 15));
    }

    #[test]
    fn test_contains() {
        let dims = GridDimensions::new(10, 20, 4, 4);
        assert!(dims.contains(9, 19));
        assert!(!dims.contains(10, 0));
        assert!(dims.contains_chunk(ChunkId::new(2, 4)));
        assert!(!dims.contains_chunk(ChunkId::new(3, 0)));
    }

    #[test]
    fn test_chunk_ids_row_major() {
        let dims = GridDimensions::new(8, 12, 4, 4);
        let ids: Vec<_> = dims.chunk_ids().collect();
        assert_eq!(ids.len(), 6);
        assert_eq!(ids[0], ChunkId::new(0, 0));
        assert_eq!(ids[2], ChunkId::new(0, 2));
        assert_eq!(ids[3], ChunkId::new(1, 0));
    }
}
