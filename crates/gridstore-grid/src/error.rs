use gridstore_core::{ChunkError, ChunkId};
use gridstore_stats::StatsError;
use thiserror::Error;

/// Grid error type
#[derive(Error, Debug)]
pub enum GridError {
    #[error("cell ({row}, {col}) is outside the {n_rows}x{n_cols} grid")]
    OutOfBounds {
        row: u64,
        col: u64,
        n_rows: u64,
        n_cols: u64,
    },

    #[error("chunk {0} is outside the grid")]
    ChunkOutOfRange(ChunkId),

    #[error("chunk {0} is not held by the grid")]
    UnknownChunk(ChunkId),

    #[error("chunk {id} is {actual:?} but the grid expects {expected:?} (rows, cols)")]
    ExtentMismatch {
        id: ChunkId,
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("chunk {0} uses a different no-data value than the grid")]
    NoDataMismatch(ChunkId),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),

    #[error(transparent)]
    Chunk(#[from] ChunkError),

    #[error(transparent)]
    Stats(#[from] StatsError),
}

pub type Result<T> = std::result::Result<T, GridError>;
