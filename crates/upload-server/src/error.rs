use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chunkdrop_protocol::ProtocolError;
use chunkdrop_store::StoreError;

/// Errors produced by the upload server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("multipart error: {0}")]
    Multipart(#[from] MultipartError),

    #[error("missing multipart field: {0}")]
    MissingField(&'static str),
}

impl ServerError {
    /// HTTP status reported to the client.
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServerError::Protocol(_) | ServerError::MissingField(_) => StatusCode::BAD_REQUEST,
            ServerError::Multipart(e) => e.status(),
            ServerError::Store(e) => match e {
                StoreError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
                StoreError::ChunkTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
                StoreError::Protocol(_)
                | StoreError::ChunkHashMismatch { .. }
                | StoreError::InvalidChunkSize(_) => StatusCode::BAD_REQUEST,
                StoreError::NamespaceNotFound(_)
                | StoreError::MissingChunk { .. }
                | StoreError::UnexpectedChunk { .. }
                | StoreError::ChunkSizeMismatch { .. }
                | StoreError::MergeInProgress(_) => StatusCode::CONFLICT,
            },
        }
    }
}

/// Plain-text error body with the mapped status.
impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::warn!(error = %self, %status, "request rejected");
        }
        (status, self.to_string()).into_response()
    }
}
