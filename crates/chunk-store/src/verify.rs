use std::path::PathBuf;

use chunkdrop_protocol::{ChunkKey, FileHash, VerifyResponse};
use tracing::debug;

use crate::StoreError;
use crate::layout::StorageLayout;

/// What the server already holds for a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// The merged file exists; uploading again is redundant.
    AlreadyMerged { path: PathBuf },
    /// Upload needed; `uploaded` are the chunks already stored, by index.
    Resume { uploaded: Vec<ChunkKey> },
}

impl From<VerifyOutcome> for VerifyResponse {
    fn from(outcome: VerifyOutcome) -> Self {
        match outcome {
            VerifyOutcome::AlreadyMerged { .. } => VerifyResponse::complete(),
            VerifyOutcome::Resume { uploaded } => {
                VerifyResponse::resume(uploaded.iter().map(ChunkKey::name).collect())
            }
        }
    }
}

/// Read-only resume check.
#[derive(Debug, Clone)]
pub struct VerifyService {
    layout: StorageLayout,
}

impl VerifyService {
    pub fn new(layout: StorageLayout) -> Self {
        Self { layout }
    }

    /// Reports whether `filename` with content `file_hash` still needs
    /// uploading, and which chunks are already stored if so.
    pub async fn verify(
        &self,
        filename: &str,
        file_hash: &FileHash,
    ) -> Result<VerifyOutcome, StoreError> {
        let final_path = self.layout.final_path(file_hash, filename)?;
        if tokio::fs::try_exists(&final_path).await? {
            debug!(%file_hash, "verify: file already merged");
            return Ok(VerifyOutcome::AlreadyMerged { path: final_path });
        }

        let uploaded: Vec<ChunkKey> = self
            .layout
            .list_chunks(file_hash)
            .await?
            .unwrap_or_default()
            .into_iter()
            .map(|c| c.key)
            .collect();

        debug!(%file_hash, stored = uploaded.len(), "verify: resume");
        Ok(VerifyOutcome::Resume { uploaded })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ChunkStore;

    fn hash(s: &str) -> FileHash {
        FileHash::parse(s).unwrap()
    }

    #[tokio::test]
    async fn fresh_upload_has_empty_list() {
        let dir = tempfile::tempdir().unwrap();
        let verify = VerifyService::new(StorageLayout::new(dir.path()));
        let outcome = verify.verify("a.bin", &hash("abc")).await.unwrap();
        assert_eq!(outcome, VerifyOutcome::Resume { uploaded: vec![] });

        // Pure read: nothing created.
        assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
    }

    #[tokio::test]
    async fn reports_exactly_the_stored_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StorageLayout::new(dir.path());
        let store = ChunkStore::new(layout.clone(), 1024);
        let h = hash("abc");
        for name in ["0-abc", "2-abc", "10-abc"] {
            store.store(&h, name, &b"data"[..]).await.unwrap();
        }

        let response: VerifyResponse = VerifyService::new(layout)
            .verify("a.bin", &h)
            .await
            .unwrap()
            .into();
        assert!(response.should_upload);
        assert_eq!(
            response.uploaded_list.unwrap(),
            vec!["0-abc", "2-abc", "10-abc"]
        );
    }

    #[tokio::test]
    async fn merged_file_short_circuits() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StorageLayout::new(dir.path());
        std::fs::write(dir.path().join("abc.mp4"), b"merged").unwrap();

        let outcome = VerifyService::new(layout)
            .verify("clip.mp4", &hash("abc"))
            .await
            .unwrap();
        assert!(matches!(outcome, VerifyOutcome::AlreadyMerged { .. }));

        let response: VerifyResponse = outcome.into();
        assert!(!response.should_upload);
        assert!(response.uploaded_list.is_none());
    }

    #[tokio::test]
    async fn extension_is_part_of_identity() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("abc.mp4"), b"merged").unwrap();

        let outcome = VerifyService::new(StorageLayout::new(dir.path()))
            .verify("clip.mov", &hash("abc"))
            .await
            .unwrap();
        assert!(matches!(outcome, VerifyOutcome::Resume { .. }));
    }

    #[tokio::test]
    async fn rejects_unsafe_filename() {
        let dir = tempfile::tempdir().unwrap();
        let result = VerifyService::new(StorageLayout::new(dir.path()))
            .verify("", &hash("abc"))
            .await;
        assert!(matches!(result, Err(StoreError::Protocol(_))));
    }
}
