//! reqwest-based transport.

use bytes::Bytes;
use chunkdrop_protocol::constants::{
    CHUNK_PATH, FIELD_CHUNK, FIELD_FILE_HASH, FIELD_FILENAME, FIELD_HASH, MERGE_PATH, VERIFY_PATH,
};
use chunkdrop_protocol::{MergeRequest, MergeResponse, VerifyRequest, VerifyResponse};
use futures_util::{Stream, StreamExt, stream};
use reqwest::multipart::{Form, Part};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::UploadError;
use crate::transport::{ByteProgress, ChunkUpload, TransportFuture, UploadTransport};

/// Granularity of chunk byte-progress reports.
const PROGRESS_SLICE: usize = 64 * 1024;

/// Talks to an upload server over HTTP.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    /// Creates a transport for the server at `endpoint`
    /// (e.g. `http://localhost:3000`).
    pub fn new(endpoint: &str) -> Result<Self, UploadError> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            http,
            base_url: endpoint.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post_json<T, R>(&self, path: &str, body: &T) -> Result<R, UploadError>
    where
        T: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let resp = self.http.post(self.url(path)).json(body).send().await?;
        let status = resp.status();

        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(UploadError::Server {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = resp.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn send_chunk(&self, chunk: ChunkUpload, progress: ByteProgress) -> Result<(), UploadError> {
        let name = chunk.key.name();
        let len = chunk.data.len() as u64;
        let body = reqwest::Body::wrap_stream(progress_stream(chunk.data, progress));
        let part = Part::stream_with_length(body, len)
            .file_name(name.clone())
            .mime_str("application/octet-stream")?;

        // Text fields first so the server can stream the payload to disk.
        let form = Form::new()
            .text(FIELD_HASH, name)
            .text(FIELD_FILE_HASH, chunk.key.file_hash.to_string())
            .text(FIELD_FILENAME, chunk.filename)
            .part(FIELD_CHUNK, part);

        let resp = self
            .http
            .post(self.url(CHUNK_PATH))
            .multipart(form)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(UploadError::Server {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }

    async fn send_merge(&self, request: MergeRequest) -> Result<MergeResponse, UploadError> {
        let resp = self
            .http
            .post(self.url(MERGE_PATH))
            .json(&request)
            .send()
            .await?;
        let status = resp.status();
        let bytes = resp.bytes().await?;

        // Failed merges still carry a `{code, message}` body.
        match serde_json::from_slice::<MergeResponse>(&bytes) {
            Ok(response) => Ok(response),
            Err(_) if !status.is_success() => Err(UploadError::Server {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
            }),
            Err(e) => Err(e.into()),
        }
    }
}

impl UploadTransport for HttpTransport {
    fn verify(&self, request: VerifyRequest) -> TransportFuture<'_, VerifyResponse> {
        Box::pin(async move { self.post_json(VERIFY_PATH, &request).await })
    }

    fn upload_chunk(&self, chunk: ChunkUpload, progress: ByteProgress) -> TransportFuture<'_, ()> {
        Box::pin(self.send_chunk(chunk, progress))
    }

    fn merge(&self, request: MergeRequest) -> TransportFuture<'_, MergeResponse> {
        Box::pin(self.send_merge(request))
    }
}

/// Splits a payload into slices, reporting the running byte count as each
/// slice is handed to the connection.
fn progress_stream(
    data: Bytes,
    progress: ByteProgress,
) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Send + Sync + 'static {
    let slices: Vec<Bytes> = (0..data.len())
        .step_by(PROGRESS_SLICE)
        .map(|start| data.slice(start..(start + PROGRESS_SLICE).min(data.len())))
        .collect();

    let mut sent = 0u64;
    stream::iter(slices).map(move |slice| {
        sent += slice.len() as u64;
        progress(sent);
        Ok::<_, std::io::Error>(slice)
    })
}
