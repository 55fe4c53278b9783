use thiserror::Error;

use crate::chunk::ChunkId;

/// Errors raised by chunk operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChunkError {
    /// A singlet chunk was asked to hold a second distinct value. The caller
    /// must replace the chunk with an array or map encoding.
    #[error("chunk {id} holds the single value {value}; writing {attempted} requires re-encoding")]
    ReencodeRequired {
        id: ChunkId,
        value: String,
        attempted: String,
    },

    #[error("chunk {0} holds more than one value and cannot be encoded as a singlet")]
    NotUniform(ChunkId),

    #[error("unknown chunk kind: {0}")]
    UnknownKind(String),

    /// The memory manager could not free anything while an allocation or scan
    /// was waiting on it.
    #[error("out of memory: {0}")]
    OutOfMemory(String),
}

pub type Result<T> = std::result::Result<T, ChunkError>;
