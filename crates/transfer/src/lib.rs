//! Client side of chunked uploads: planning, hashing and progress.
//!
//! A file is split into fixed-size chunks by [`ChunkPlan`], hashed as a
//! whole by a [`ContentHasher`] running in its own task, and its upload
//! progress is aggregated per chunk by [`ChunkProgress`].

mod chunked;
mod hasher;
mod progress;
mod types;

pub use chunked::ChunkReader;
pub use hasher::{ContentHasher, HashEvent, HashHandle};
pub use progress::{ChunkProgress, SpeedCalculator};
pub use types::{Chunk, ChunkPlan, ChunkSpan};

pub use chunkdrop_protocol::constants::DEFAULT_CHUNK_SIZE;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid chunk size: {0}")]
    InvalidChunkSize(u64),

    #[error("not a regular file: {0}")]
    NotAFile(String),

    #[error("short read on chunk {index}: expected {expected} bytes, got {actual}")]
    ShortRead {
        index: u64,
        expected: u64,
        actual: u64,
    },

    #[error("hashing task failed: {0}")]
    HashTask(String),

    #[error(transparent)]
    Protocol(#[from] chunkdrop_protocol::ProtocolError),
}
