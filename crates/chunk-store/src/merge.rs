//! Reassembly of stored chunks into the final file.
//!
//! Each chunk is written at `index * chunk_size` into a hidden staging file.
//! Chunk ranges never overlap, so writes run concurrently. Only when every
//! write has succeeded is the staging file renamed onto the final path and
//! the chunk directory removed; any failure leaves the chunks in place so
//! the merge can be retried.

use std::collections::HashSet;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chunkdrop_protocol::FileHash;
use futures_util::{StreamExt, TryStreamExt, stream};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::StoreError;
use crate::layout::{Staging, StorageLayout, StoredChunk};

/// Default number of chunk writes in flight during a merge.
pub const DEFAULT_MERGE_CONCURRENCY: usize = 4;

/// Result of a successful merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    pub path: PathBuf,
    pub size: u64,
    pub chunks: usize,
    /// The final file already existed and no chunks were left to merge.
    pub already_merged: bool,
}

/// Assembles chunk namespaces into final files.
#[derive(Debug, Clone)]
pub struct MergeService {
    layout: StorageLayout,
    concurrency: usize,
    in_flight: Arc<Mutex<HashSet<FileHash>>>,
}

/// Removes a hash from the in-flight set when the merge ends.
struct InFlight {
    set: Arc<Mutex<HashSet<FileHash>>>,
    hash: FileHash,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        let mut set = self.set.lock().unwrap_or_else(|e| e.into_inner());
        set.remove(&self.hash);
    }
}

struct ChunkWrite {
    chunk: StoredChunk,
    offset: u64,
    len: u64,
}

impl MergeService {
    pub fn new(layout: StorageLayout, concurrency: usize) -> Self {
        Self {
            layout,
            concurrency: concurrency.max(1),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Merges every stored chunk of `file_hash` into `<fileHash><ext>`.
    ///
    /// `chunk_size` must be the size the client planned with.
    /// `expected_chunks`, when known, must match the stored chunk count.
    pub async fn merge(
        &self,
        filename: &str,
        file_hash: &FileHash,
        chunk_size: u64,
        expected_chunks: Option<u64>,
    ) -> Result<MergeOutcome, StoreError> {
        if chunk_size == 0 {
            return Err(StoreError::InvalidChunkSize(chunk_size));
        }
        let final_path = self.layout.final_path(file_hash, filename)?;
        let _guard = self.begin(file_hash)?;

        let Some(chunks) = self.layout.list_chunks(file_hash).await? else {
            if tokio::fs::try_exists(&final_path).await? {
                info!(%file_hash, "merge: already merged");
                let size = tokio::fs::metadata(&final_path).await?.len();
                return Ok(MergeOutcome {
                    path: final_path,
                    size,
                    chunks: 0,
                    already_merged: true,
                });
            }
            return Err(StoreError::NamespaceNotFound(file_hash.to_string()));
        };

        let writes = plan_writes(chunks, chunk_size, expected_chunks).await?;
        let size: u64 = writes.iter().map(|w| w.len).sum();
        let count = writes.len();

        let staging = Staging::new(self.layout.merging_path(&final_path));
        if let Err(e) = self.write_all(staging.path(), writes, size).await {
            warn!(%file_hash, error = %e, "merge failed, chunks kept for retry");
            return Err(e);
        }
        staging.commit(&final_path).await?;

        let chunk_dir = self.layout.chunk_dir(file_hash);
        if let Err(e) = tokio::fs::remove_dir_all(&chunk_dir).await {
            // The final file is complete; a leftover directory only costs disk.
            warn!(dir = %chunk_dir.display(), error = %e, "failed to remove chunk directory");
        }

        info!(%file_hash, chunks = count, bytes = size, path = %final_path.display(), "merge complete");
        Ok(MergeOutcome {
            path: final_path,
            size,
            chunks: count,
            already_merged: false,
        })
    }

    fn begin(&self, file_hash: &FileHash) -> Result<InFlight, StoreError> {
        let mut set = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if !set.insert(file_hash.clone()) {
            return Err(StoreError::MergeInProgress(file_hash.to_string()));
        }
        Ok(InFlight {
            set: Arc::clone(&self.in_flight),
            hash: file_hash.clone(),
        })
    }

    async fn write_all(
        &self,
        staging: &Path,
        writes: Vec<ChunkWrite>,
        size: u64,
    ) -> Result<(), StoreError> {
        let file = tokio::fs::File::create(staging).await?;
        file.set_len(size).await?;
        drop(file);

        stream::iter(writes)
            .map(|w| write_chunk_at(staging, w))
            .buffer_unordered(self.concurrency)
            .try_collect::<Vec<()>>()
            .await?;

        let file = tokio::fs::OpenOptions::new().write(true).open(staging).await?;
        file.sync_all().await?;
        Ok(())
    }
}

/// Validates the stored chunk set and computes each chunk's target range.
///
/// Indices must run `0..n` without gaps (and match `expected_chunks` when
/// given); every chunk but the last must be exactly `chunk_size` bytes.
async fn plan_writes(
    chunks: Vec<StoredChunk>,
    chunk_size: u64,
    expected_chunks: Option<u64>,
) -> Result<Vec<ChunkWrite>, StoreError> {
    if chunks.is_empty() {
        return Err(StoreError::MissingChunk { index: 0 });
    }

    for (position, chunk) in chunks.iter().enumerate() {
        if chunk.key.index != position as u64 {
            return Err(StoreError::MissingChunk {
                index: position as u64,
            });
        }
    }

    let count = chunks.len() as u64;
    if let Some(expected) = expected_chunks {
        if count < expected {
            return Err(StoreError::MissingChunk { index: count });
        }
        if count > expected {
            return Err(StoreError::UnexpectedChunk { index: expected });
        }
    }

    let last = count - 1;
    let mut writes = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        let index = chunk.key.index;
        let len = tokio::fs::metadata(&chunk.path).await?.len();
        let size_ok = if index == last {
            len <= chunk_size
        } else {
            len == chunk_size
        };
        if !size_ok {
            return Err(StoreError::ChunkSizeMismatch {
                index,
                expected: chunk_size,
                actual: len,
            });
        }
        let offset = index
            .checked_mul(chunk_size)
            .ok_or(StoreError::InvalidChunkSize(chunk_size))?;
        writes.push(ChunkWrite { chunk, offset, len });
    }

    Ok(writes)
}

async fn write_chunk_at(staging: &Path, w: ChunkWrite) -> Result<(), StoreError> {
    let mut source = tokio::fs::File::open(&w.chunk.path).await?;
    let mut target = tokio::fs::OpenOptions::new()
        .write(true)
        .open(staging)
        .await?;
    target.seek(SeekFrom::Start(w.offset)).await?;

    let copied = tokio::io::copy(&mut source, &mut target).await?;
    target.flush().await?;
    if copied != w.len {
        return Err(StoreError::ChunkSizeMismatch {
            index: w.chunk.key.index,
            expected: w.len,
            actual: copied,
        });
    }

    debug!(chunk = %w.chunk.key, offset = w.offset, bytes = copied, "chunk merged");
    Ok(())
}
