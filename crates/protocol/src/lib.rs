//! Wire protocol types for chunked, resumable uploads.
//!
//! Shared by the upload client and the receiving server: JSON bodies for
//! `/verify` and `/merge`, multipart field names for chunk uploads, and the
//! structured chunk key that is serialized to a storage name only at the
//! storage boundary.

pub mod constants;
pub mod messages;
pub mod types;
pub mod validation;

pub use messages::{MergeRequest, MergeResponse, VerifyRequest, VerifyResponse};
pub use types::{ChunkKey, FileHash};
pub use validation::{extension_of, validate_file_hash};

/// Errors produced when parsing or validating protocol values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("invalid file hash: {0}")]
    InvalidFileHash(String),

    #[error("invalid chunk name: {0}")]
    InvalidChunkName(String),

    #[error("invalid filename: {0}")]
    InvalidFilename(String),
}
