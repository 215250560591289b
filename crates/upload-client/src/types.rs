use std::collections::BTreeSet;

use chunkdrop_protocol::FileHash;
use chunkdrop_protocol::constants::DEFAULT_CHUNK_SIZE;

/// Default number of chunk uploads in flight.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Default server endpoint.
pub const DEFAULT_ENDPOINT: &str = "http://localhost:3000";

/// Client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base URL of the upload server.
    pub endpoint: String,
    /// Planned chunk size in bytes.
    pub chunk_size: u64,
    /// Chunk uploads in flight at once (minimum 1).
    pub concurrency: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

/// Server-side state of an upload, as reported by verify.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifyResult {
    /// `false` once the merged file exists.
    pub should_upload: bool,
    /// Indices of chunks the server already holds.
    pub uploaded: BTreeSet<u64>,
}

/// What happened to one planned chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkOutcome {
    /// Already stored server-side; not sent.
    Skipped { index: u64 },
    Uploaded { index: u64, bytes: u64 },
    Failed { index: u64, error: String },
    Cancelled { index: u64 },
}

impl ChunkOutcome {
    pub fn index(&self) -> u64 {
        match self {
            ChunkOutcome::Skipped { index }
            | ChunkOutcome::Uploaded { index, .. }
            | ChunkOutcome::Failed { index, .. }
            | ChunkOutcome::Cancelled { index } => *index,
        }
    }

    /// Returns `true` if the server holds this chunk.
    pub fn is_stored(&self) -> bool {
        matches!(
            self,
            ChunkOutcome::Skipped { .. } | ChunkOutcome::Uploaded { .. }
        )
    }
}

/// Result of a finished `upload_file`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSummary {
    pub file_hash: FileHash,
    pub file_size: u64,
    pub chunks: usize,
    /// Chunks sent in this run.
    pub uploaded: usize,
    /// Chunks the server already had.
    pub skipped: usize,
    /// The server already had the merged file; nothing was sent.
    pub already_complete: bool,
}

/// Progress event emitted during an upload.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadEvent {
    /// `processed` of `total` chunks hashed.
    HashProgress { processed: usize, total: usize },
    HashCompleted { file_hash: FileHash },
    /// Verify answered; `already_stored` chunks will be skipped.
    Verified {
        should_upload: bool,
        already_stored: usize,
    },
    /// Bytes of one chunk handed to the network so far.
    ChunkProgress { index: u64, loaded: u64, total: u64 },
    ChunkUploaded { index: u64 },
    ChunkFailed { index: u64, error: String },
    /// Aggregate upload progress in `[0.0, 1.0]`; never decreases.
    Progress { fraction: f64, bytes_per_second: f64 },
    Merged { file_hash: FileHash },
    /// The server already had the merged file.
    AlreadyComplete { file_hash: FileHash },
    Completed { file_hash: FileHash },
    Failed { error: String },
    Cancelled,
}
