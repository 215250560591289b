use std::path::Path;

use chunkdrop_protocol::{ChunkKey, FileHash};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tracing::debug;

use crate::StoreError;
use crate::layout::{Staging, StorageLayout, StoredChunk};

/// Default upper bound for a single chunk payload: 64 MiB.
pub const DEFAULT_MAX_CHUNK_BYTES: u64 = 64 * 1024 * 1024;

/// Persists uploaded chunks, namespaced by file hash.
///
/// A write is all-or-nothing: the payload goes to a hidden staging file that
/// is renamed onto the chunk name only after it is fully synced. Storing the
/// same chunk name again replaces the previous record.
#[derive(Debug, Clone)]
pub struct ChunkStore {
    layout: StorageLayout,
    max_chunk_bytes: u64,
}

impl ChunkStore {
    pub fn new(layout: StorageLayout, max_chunk_bytes: u64) -> Self {
        Self {
            layout,
            max_chunk_bytes,
        }
    }

    pub fn max_chunk_bytes(&self) -> u64 {
        self.max_chunk_bytes
    }

    /// Stores one chunk payload under `chunk_name` (`<index>-<fileHash>`).
    pub async fn store<R>(
        &self,
        file_hash: &FileHash,
        chunk_name: &str,
        payload: R,
    ) -> Result<(StoredChunk, u64), StoreError>
    where
        R: AsyncRead + Unpin,
    {
        let key = ChunkKey::parse(chunk_name)?;
        if key.file_hash != *file_hash {
            return Err(StoreError::ChunkHashMismatch {
                name: chunk_name.to_string(),
                file_hash: file_hash.to_string(),
            });
        }

        // create_dir_all succeeds if a concurrent request created it first.
        tokio::fs::create_dir_all(self.layout.chunk_dir(file_hash)).await?;

        let staging = Staging::new(self.layout.staging_path(&key));
        let target = self.layout.chunk_path(&key);
        let written = self.write_staged(staging, &target, payload).await?;

        debug!(chunk = %key, bytes = written, "chunk stored");
        Ok((StoredChunk { key, path: target }, written))
    }

    async fn write_staged<R>(
        &self,
        staging: Staging,
        target: &Path,
        payload: R,
    ) -> Result<u64, StoreError>
    where
        R: AsyncRead + Unpin,
    {
        let mut file = tokio::fs::File::create(staging.path()).await?;
        // Read one byte past the limit to detect oversized payloads.
        let mut limited = payload.take(self.max_chunk_bytes.saturating_add(1));
        let written = tokio::io::copy(&mut limited, &mut file).await?;
        if written > self.max_chunk_bytes {
            return Err(StoreError::ChunkTooLarge {
                limit: self.max_chunk_bytes,
            });
        }

        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        staging.commit(target).await?;
        Ok(written)
    }
}
