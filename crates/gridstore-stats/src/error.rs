use gridstore_core::ChunkError;
use thiserror::Error;

/// Errors raised while computing statistics.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StatsError {
    #[error(transparent)]
    Chunk(#[from] ChunkError),

    #[error("quantile classification needs at least one class")]
    NoClasses,

    #[error("unknown statistics mode: {0}")]
    UnknownMode(String),
}

pub type Result<T> = std::result::Result<T, StatsError>;
