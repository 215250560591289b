//! Whole-file content hashing in a background task.
//!
//! Chunks may be read ahead concurrently, but they are absorbed into the
//! MD5 accumulator strictly in index order since the digest is
//! order-sensitive. The accumulator never leaves the task; callers only see
//! [`HashEvent`]s and the final [`FileHash`].

use chunkdrop_protocol::FileHash;
use futures_util::StreamExt;
use futures_util::stream;
use md5::{Digest, Md5};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::TransferError;
use crate::chunked::ChunkReader;
use crate::types::ChunkPlan;

/// Default number of chunk reads kept in flight while hashing.
const DEFAULT_READ_AHEAD: usize = 2;

/// Event emitted by a running hasher.
#[derive(Debug, Clone, PartialEq)]
pub enum HashEvent {
    /// `processed` of `total` chunks have been absorbed.
    Progress { processed: usize, total: usize },
    /// All chunks absorbed.
    Completed { hash: FileHash },
}

impl HashEvent {
    /// Fraction of work done, in `[0.0, 1.0]`.
    pub fn fraction(&self) -> f64 {
        match self {
            HashEvent::Progress { processed, total } if *total > 0 => {
                *processed as f64 / *total as f64
            }
            HashEvent::Progress { .. } => 0.0,
            HashEvent::Completed { .. } => 1.0,
        }
    }
}

/// Configures and starts content hashing.
pub struct ContentHasher {
    reader: ChunkReader,
    plan: ChunkPlan,
    read_ahead: usize,
}

impl ContentHasher {
    pub fn new(reader: ChunkReader, plan: ChunkPlan) -> Self {
        Self {
            reader,
            plan,
            read_ahead: DEFAULT_READ_AHEAD,
        }
    }

    /// Sets how many chunk reads may be in flight (minimum 1).
    pub fn with_read_ahead(mut self, read_ahead: usize) -> Self {
        self.read_ahead = read_ahead.max(1);
        self
    }

    /// Spawns the hashing task on the current tokio runtime.
    pub fn spawn(self) -> HashHandle {
        let total = self.plan.len();
        // One slot per event, so the task never blocks on a slow consumer.
        let (events_tx, events_rx) = mpsc::channel(total + 1);
        let task = tokio::spawn(self.run(events_tx));
        HashHandle {
            events: Some(events_rx),
            task,
        }
    }

    async fn run(self, events_tx: mpsc::Sender<HashEvent>) -> Result<FileHash, TransferError> {
        let total = self.plan.len();
        let reader = self.reader;

        let mut chunks = stream::iter(self.plan.spans().to_vec())
            .map(move |span| {
                let reader = reader.clone();
                async move { reader.read_chunk(&span).await }
            })
            .buffered(self.read_ahead);

        let mut accumulator = Md5::new();
        let mut processed = 0usize;

        while let Some(chunk) = chunks.next().await {
            let chunk = chunk?;
            debug_assert_eq!(chunk.index(), processed as u64);
            accumulator.update(&chunk.data);
            processed += 1;
            let _ = events_tx.try_send(HashEvent::Progress { processed, total });
        }

        let hash = FileHash::parse(hex::encode(accumulator.finalize()))?;
        debug!(file_hash = %hash, chunks = total, "content hash computed");
        let _ = events_tx.try_send(HashEvent::Completed { hash: hash.clone() });
        Ok(hash)
    }
}

/// Handle to a running hasher.
///
/// Dropping the handle does not stop the task; call [`abort`](Self::abort)
/// to discard it. Aborting has no side effects outside the task.
pub struct HashHandle {
    events: Option<mpsc::Receiver<HashEvent>>,
    task: JoinHandle<Result<FileHash, TransferError>>,
}

impl HashHandle {
    /// Takes the event receiver. Can only be called once.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<HashEvent>> {
        self.events.take()
    }

    /// Stops the hashing task.
    pub fn abort(&self) {
        self.task.abort();
    }

    /// Waits for the final hash.
    pub async fn wait(self) -> Result<FileHash, TransferError> {
        match self.task.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(TransferError::HashTask("aborted".into())),
            Err(e) => Err(TransferError::HashTask(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunked::checksum_bytes;
    use std::path::{Path, PathBuf};

    fn write_file(dir: &Path, data: &[u8]) -> PathBuf {
        let path = dir.join("input.bin");
        std::fs::write(&path, data).unwrap();
        path
    }

    async fn hash_with(path: &Path, chunk_size: u64, read_ahead: usize) -> FileHash {
        let plan = ChunkPlan::for_file(path, chunk_size).await.unwrap();
        ContentHasher::new(ChunkReader::new(path), plan)
            .with_read_ahead(read_ahead)
            .spawn()
            .wait()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn hash_matches_one_shot_digest() {
        let dir = tempfile::tempdir().unwrap();
        let data: Vec<u8> = (0..50_000u32).map(|i| (i % 253) as u8).collect();
        let path = write_file(dir.path(), &data);

        let hash = hash_with(&path, 4096, 4).await;
        assert_eq!(hash.as_str(), checksum_bytes(&data));
    }

    #[tokio::test]
    async fn hash_independent_of_chunking() {
        let dir = tempfile::tempdir().unwrap();
        let data: Vec<u8> = (0..9_999u32).map(|i| (i * 7 % 256) as u8).collect();
        let path = write_file(dir.path(), &data);

        let a = hash_with(&path, 1, 1).await;
        let b = hash_with(&path, 1000, 8).await;
        let c = hash_with(&path, 1 << 20, 2).await;
        assert_eq!(a, b);
        assert_eq!(b, c);
    }

    #[tokio::test]
    async fn empty_file_hash() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), b"");
        let hash = hash_with(&path, 16, 1).await;
        assert_eq!(hash.as_str(), "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[tokio::test]
    async fn emits_progress_then_completion() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), &[7u8; 10]);
        let plan = ChunkPlan::for_file(&path, 3).await.unwrap();

        let mut handle = ContentHasher::new(ChunkReader::new(&path), plan).spawn();
        let mut events = handle.take_events().unwrap();
        assert!(handle.take_events().is_none());
        let hash = handle.wait().await.unwrap();

        let mut received = Vec::new();
        while let Some(evt) = events.recv().await {
            received.push(evt);
        }

        assert_eq!(received.len(), 5);
        for (i, evt) in received.iter().take(4).enumerate() {
            assert_eq!(
                *evt,
                HashEvent::Progress {
                    processed: i + 1,
                    total: 4
                }
            );
        }
        assert_eq!(received[4], HashEvent::Completed { hash });

        let fractions: Vec<f64> = received.iter().map(HashEvent::fraction).collect();
        assert!(fractions.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*fractions.last().unwrap(), 1.0);
    }

    #[tokio::test]
    async fn read_failure_surfaces_as_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), &[1u8; 100]);
        let plan = ChunkPlan::for_file(&path, 10).await.unwrap();
        std::fs::remove_file(&path).unwrap();

        let result = ContentHasher::new(ChunkReader::new(&path), plan)
            .spawn()
            .wait()
            .await;
        assert!(matches!(result, Err(TransferError::Io(_))));
    }

    #[tokio::test]
    async fn abort_discards_task() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), &vec![0u8; 1 << 16]);
        let plan = ChunkPlan::for_file(&path, 1).await.unwrap();

        let handle = ContentHasher::new(ChunkReader::new(&path), plan).spawn();
        handle.abort();
        let result = handle.wait().await;
        assert!(matches!(result, Err(TransferError::HashTask(_))));
    }
}
