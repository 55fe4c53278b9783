pub mod aggregate;
pub mod bitset;
pub mod chunk;
pub mod context;
pub mod error;
pub mod iter;
pub mod memory;
pub mod value;

pub use bitset::OffsetBitset;
pub use chunk::{
    ArrayChunk, CellId, Chunk, ChunkCells, ChunkId, ChunkKind, MapChunk, SingletChunk,
    BITSET_BUCKET_THRESHOLD,
};
pub use context::{ChunkSource, GridContext, GridDimensions};
pub use error::{ChunkError, Result};
pub use iter::{AspatialIter, ChunkValues, RowMajorIter};
pub use memory::{
    relieve_pressure, try_with_capacity, MemoryManager, NoMemoryManager, MAX_ALLOCATION_RETRIES,
};
pub use value::{exact_count, exact_to_f64, CellValue, F32, F64};
