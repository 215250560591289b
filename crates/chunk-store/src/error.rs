//! Storage error types.

use chunkdrop_protocol::ProtocolError;

/// Errors produced by chunk storage, verification and merge.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("chunk {name} does not belong to file {file_hash}")]
    ChunkHashMismatch { name: String, file_hash: String },

    #[error("chunk exceeds {limit} bytes")]
    ChunkTooLarge { limit: u64 },

    #[error("invalid chunk size: {0}")]
    InvalidChunkSize(u64),

    #[error("no chunks stored for {0}")]
    NamespaceNotFound(String),

    #[error("chunk {index} is missing")]
    MissingChunk { index: u64 },

    #[error("unexpected chunk {index} beyond the declared count")]
    UnexpectedChunk { index: u64 },

    #[error("chunk {index} is {actual} bytes, expected {expected}")]
    ChunkSizeMismatch {
        index: u64,
        expected: u64,
        actual: u64,
    },

    #[error("merge already running for {0}")]
    MergeInProgress(String),
}
