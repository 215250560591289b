use std::pin::pin;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Multipart, State};
use axum::response::{IntoResponse, Response};
use chunkdrop_protocol::constants::{
    CHUNK_RECEIVED_MESSAGE, FIELD_CHUNK, FIELD_FILE_HASH, FIELD_FILENAME, FIELD_HASH,
};
use chunkdrop_protocol::{FileHash, MergeRequest, MergeResponse, VerifyRequest, VerifyResponse};
use futures_util::TryStreamExt;
use tokio_util::io::StreamReader;
use tracing::{debug, info};

use crate::ServerError;
use crate::server::AppState;

/// `POST /verify`
pub(crate) async fn verify(
    State(state): State<AppState>,
    Json(req): Json<VerifyRequest>,
) -> Result<Json<VerifyResponse>, ServerError> {
    let file_hash = FileHash::parse(req.file_hash)?;
    let outcome = state.verify.verify(&req.filename, &file_hash).await?;
    Ok(Json(outcome.into()))
}

/// `POST /merge`
///
/// Failures are reported as `{code: 1, message}` alongside the error status.
pub(crate) async fn merge(State(state): State<AppState>, Json(req): Json<MergeRequest>) -> Response {
    match run_merge(&state, req).await {
        Ok(()) => Json(MergeResponse::success()).into_response(),
        Err(e) => {
            let status = e.status();
            tracing::warn!(error = %e, %status, "merge failed");
            (status, Json(MergeResponse::failure(e.to_string()))).into_response()
        }
    }
}

async fn run_merge(state: &AppState, req: MergeRequest) -> Result<(), ServerError> {
    let file_hash = FileHash::parse(req.file_hash)?;
    info!(
        %file_hash,
        filename = %req.filename,
        chunk_size = req.size,
        chunk_count = ?req.chunk_count,
        "merge requested"
    );
    state
        .merge
        .merge(&req.filename, &file_hash, req.size, req.chunk_count)
        .await?;
    Ok(())
}

/// `POST /` with a multipart body: `hash`, `fileHash`, `filename` and the
/// `chunk` file part.
///
/// The payload is streamed straight into the store when the text fields come
/// first; otherwise it is buffered until they have been read.
pub(crate) async fn receive_chunk(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<&'static str, ServerError> {
    let mut chunk_name: Option<String> = None;
    let mut file_hash: Option<FileHash> = None;
    let mut filename: Option<String> = None;
    let mut pending: Option<Bytes> = None;
    let mut stored = false;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            FIELD_HASH => chunk_name = Some(field.text().await?),
            FIELD_FILE_HASH => file_hash = Some(FileHash::parse(field.text().await?)?),
            FIELD_FILENAME => filename = Some(field.text().await?),
            FIELD_CHUNK => match (&file_hash, &chunk_name) {
                (Some(hash), Some(chunk)) => {
                    let body = pin!(field.map_err(std::io::Error::other));
                    state.store.store(hash, chunk, StreamReader::new(body)).await?;
                    stored = true;
                }
                _ => pending = Some(field.bytes().await?),
            },
            other => debug!(field = other, "ignoring unknown multipart field"),
        }
    }

    let file_hash = file_hash.ok_or(ServerError::MissingField(FIELD_FILE_HASH))?;
    let chunk_name = chunk_name.ok_or(ServerError::MissingField(FIELD_HASH))?;
    if !stored {
        let payload = pending.ok_or(ServerError::MissingField(FIELD_CHUNK))?;
        state.store.store(&file_hash, &chunk_name, &payload[..]).await?;
    }

    debug!(%file_hash, chunk = %chunk_name, filename = ?filename, "chunk received");
    Ok(CHUNK_RECEIVED_MESSAGE)
}
