//! Transport seam between the coordinator and the server.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use chunkdrop_protocol::{ChunkKey, MergeRequest, MergeResponse, VerifyRequest, VerifyResponse};

use crate::UploadError;

/// Boxed future returned by [`UploadTransport`] methods.
pub type TransportFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, UploadError>> + Send + 'a>>;

/// Called with the number of payload bytes sent so far for one chunk.
pub type ByteProgress = Arc<dyn Fn(u64) + Send + Sync>;

/// One chunk upload request.
#[derive(Debug, Clone)]
pub struct ChunkUpload {
    pub key: ChunkKey,
    pub filename: String,
    pub data: Bytes,
}

/// Abstract connection to an upload server.
///
/// [`HttpTransport`](crate::HttpTransport) implements it over HTTP; tests
/// use in-memory mocks.
pub trait UploadTransport: Send + Sync {
    /// Asks which chunks of a file the server already holds.
    fn verify(&self, request: VerifyRequest) -> TransportFuture<'_, VerifyResponse>;

    /// Sends one chunk payload, reporting byte progress as it goes.
    fn upload_chunk(&self, chunk: ChunkUpload, progress: ByteProgress) -> TransportFuture<'_, ()>;

    /// Asks the server to assemble the stored chunks.
    fn merge(&self, request: MergeRequest) -> TransportFuture<'_, MergeResponse>;
}
