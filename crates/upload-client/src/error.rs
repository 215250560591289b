//! Upload error types.

use chunkdrop_protocol::ProtocolError;
use chunkdrop_transfer::TransferError;

/// Errors produced while uploading a file.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("server error {status}: {body}")]
    Server { status: u16, body: String },

    #[error("merge rejected (code {code}): {message}")]
    MergeRejected { code: i32, message: String },

    #[error("{} chunk(s) failed to upload: {:?}", .0.len(), .0)]
    ChunksFailed(Vec<u64>),

    #[error("cancelled")]
    Cancelled,
}
