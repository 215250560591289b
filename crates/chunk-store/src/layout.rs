use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chunkdrop_protocol::constants::CHUNK_DIR_PREFIX;
use chunkdrop_protocol::{ChunkKey, FileHash, extension_of};
use tracing::{debug, warn};

use crate::StoreError;

/// Suffix of an in-progress chunk write.
const PART_SUFFIX: &str = ".part";

/// Suffix of an in-progress merge output.
const MERGING_SUFFIX: &str = ".merging";

/// Hidden in-progress file that is deleted when dropped uncommitted.
///
/// Covers both error returns and a dropped future (client disconnect,
/// shutdown, timeout), so no partial write outlives its operation.
#[derive(Debug)]
pub(crate) struct Staging {
    path: PathBuf,
    committed: bool,
}

impl Staging {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self {
            path,
            committed: false,
        }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Renames the staged file onto `target`.
    pub(crate) async fn commit(mut self, target: &Path) -> Result<(), StoreError> {
        tokio::fs::rename(&self.path, target).await?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for Staging {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "discarded staging file"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "failed to remove staging file"),
        }
    }
}

/// A chunk record found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredChunk {
    pub key: ChunkKey,
    pub path: PathBuf,
}

/// Maps file hashes and chunk keys to paths under a storage root.
#[derive(Debug, Clone)]
pub struct StorageLayout {
    root: PathBuf,
}

impl StorageLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding every chunk of one in-progress upload.
    pub fn chunk_dir(&self, file_hash: &FileHash) -> PathBuf {
        self.root.join(format!("{CHUNK_DIR_PREFIX}{file_hash}"))
    }

    pub fn chunk_path(&self, key: &ChunkKey) -> PathBuf {
        self.chunk_dir(&key.file_hash).join(key.name())
    }

    /// Canonical path of the merged file: `<root>/<fileHash><ext>`.
    pub fn final_path(&self, file_hash: &FileHash, filename: &str) -> Result<PathBuf, StoreError> {
        let ext = extension_of(filename)?;
        Ok(self.root.join(format!("{file_hash}{ext}")))
    }

    /// Hidden sibling used while a chunk is being written.
    pub(crate) fn staging_path(&self, key: &ChunkKey) -> PathBuf {
        self.chunk_dir(&key.file_hash).join(format!(
            ".{}.{}{PART_SUFFIX}",
            key.name(),
            uuid::Uuid::new_v4().simple()
        ))
    }

    /// Hidden sibling of `final_path` used while merging.
    pub(crate) fn merging_path(&self, final_path: &Path) -> PathBuf {
        let name = final_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.root.join(format!(".{name}{MERGING_SUFFIX}"))
    }

    /// Lists the committed chunk records of `file_hash`, sorted by index.
    ///
    /// Returns `None` if the chunk directory does not exist. In-progress
    /// writes and entries that are not chunk records of this file are
    /// skipped.
    pub async fn list_chunks(
        &self,
        file_hash: &FileHash,
    ) -> Result<Option<Vec<StoredChunk>>, StoreError> {
        let dir = self.chunk_dir(file_hash);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut chunks = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let Ok(name) = entry.file_name().into_string() else {
                warn!(dir = %dir.display(), "skipping non UTF-8 entry in chunk directory");
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            match ChunkKey::parse(&name) {
                Ok(key) if key.file_hash == *file_hash => chunks.push(StoredChunk {
                    key,
                    path: entry.path(),
                }),
                _ => warn!(%name, %file_hash, "skipping foreign entry in chunk directory"),
            }
        }

        chunks.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(Some(chunks))
    }
}
