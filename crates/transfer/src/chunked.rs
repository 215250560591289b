use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::TransferError;
use crate::types::{Chunk, ChunkSpan};

/// One-shot MD5 of `data` as hex, for checking the streaming hasher.
#[cfg(test)]
pub(crate) fn checksum_bytes(data: &[u8]) -> String {
    use md5::{Digest, Md5};

    let mut hasher = Md5::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Reads planned chunks of a file by position.
///
/// Each read opens its own handle, so reads of different chunks can be in
/// flight at the same time.
#[derive(Debug, Clone)]
pub struct ChunkReader {
    path: PathBuf,
}

impl ChunkReader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads exactly the bytes covered by `span`.
    pub async fn read_chunk(&self, span: &ChunkSpan) -> Result<Chunk, TransferError> {
        let mut file = tokio::fs::File::open(&self.path).await?;
        file.seek(SeekFrom::Start(span.start)).await?;

        let expected = span.len();
        let mut buf = Vec::with_capacity(expected as usize);
        file.take(expected).read_to_end(&mut buf).await?;

        if buf.len() as u64 != expected {
            return Err(TransferError::ShortRead {
                index: span.index,
                expected,
                actual: buf.len() as u64,
            });
        }

        Ok(Chunk {
            span: *span,
            data: Bytes::from(buf),
        })
    }
}
