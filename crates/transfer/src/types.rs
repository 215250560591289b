use bytes::Bytes;

use crate::TransferError;

/// Byte range `[start, end)` of one planned chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSpan {
    /// 0-based sequence index; the only ordering authority.
    pub index: u64,
    pub start: u64,
    pub end: u64,
}

impl ChunkSpan {
    /// Length of this chunk in bytes.
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// A chunk of file data read according to its span.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub span: ChunkSpan,
    pub data: Bytes,
}

impl Chunk {
    pub fn index(&self) -> u64 {
        self.span.index
    }
}

/// Deterministic split of a file into contiguous, non-overlapping chunks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkPlan {
    file_size: u64,
    chunk_size: u64,
    spans: Vec<ChunkSpan>,
}

impl ChunkPlan {
    /// Plans chunks for a file of `file_size` bytes.
    ///
    /// Every chunk is `chunk_size` bytes except possibly the last. An empty
    /// file yields a single empty chunk at index 0.
    pub fn new(file_size: u64, chunk_size: u64) -> Result<Self, TransferError> {
        if chunk_size == 0 {
            return Err(TransferError::InvalidChunkSize(chunk_size));
        }

        let count = file_size.div_ceil(chunk_size).max(1);
        let spans = (0..count)
            .map(|index| {
                let start = index * chunk_size;
                ChunkSpan {
                    index,
                    start,
                    end: (start + chunk_size).min(file_size),
                }
            })
            .collect();

        Ok(Self {
            file_size,
            chunk_size,
            spans,
        })
    }

    /// Plans chunks for the file at `path`.
    pub async fn for_file(
        path: &std::path::Path,
        chunk_size: u64,
    ) -> Result<Self, TransferError> {
        if chunk_size == 0 {
            return Err(TransferError::InvalidChunkSize(chunk_size));
        }
        let metadata = tokio::fs::metadata(path).await?;
        if !metadata.is_file() {
            return Err(TransferError::NotAFile(path.display().to_string()));
        }
        Self::new(metadata.len(), chunk_size)
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    pub fn spans(&self) -> &[ChunkSpan] {
        &self.spans
    }

    /// Number of planned chunks (never zero).
    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    pub fn span(&self, index: u64) -> Option<&ChunkSpan> {
        usize::try_from(index).ok().and_then(|i| self.spans.get(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_chunk_size() {
        assert!(matches!(
            ChunkPlan::new(10, 0),
            Err(TransferError::InvalidChunkSize(0))
        ));
    }

    #[test]
    fn last_chunk_is_shorter() {
        let plan = ChunkPlan::new(10, 4).unwrap();
        let ranges: Vec<(u64, u64)> = plan.spans().iter().map(|s| (s.start, s.end)).collect();
        assert_eq!(ranges, vec![(0, 4), (4, 8), (8, 10)]);
        assert_eq!(plan.spans()[2].len(), 2);
    }

    #[test]
    fn exact_multiple_has_no_empty_tail() {
        let plan = ChunkPlan::new(8 * 1024 * 1024, 1024 * 1024).unwrap();
        assert_eq!(plan.len(), 8);
        assert!(plan.spans().iter().all(|s| s.len() == 1024 * 1024));
        assert_eq!(plan.spans()[7].index, 7);
    }

    #[test]
    fn empty_file_has_one_empty_chunk() {
        let plan = ChunkPlan::new(0, 4).unwrap();
        assert_eq!(plan.len(), 1);
        assert!(plan.spans()[0].is_empty());
    }

    #[test]
    fn spans_are_contiguous_and_cover_file() {
        for (size, chunk) in [(1u64, 1u64), (7, 3), (100, 7), (4096, 4096), (4097, 4096)] {
            let plan = ChunkPlan::new(size, chunk).unwrap();
            let mut expected_start = 0;
            for (i, span) in plan.spans().iter().enumerate() {
                assert_eq!(span.index, i as u64);
                assert_eq!(span.start, expected_start);
                assert!(span.len() <= chunk);
                expected_start = span.end;
            }
            assert_eq!(expected_start, size);
        }
    }

    #[test]
    fn span_lookup() {
        let plan = ChunkPlan::new(10, 4).unwrap();
        assert_eq!(plan.span(1).map(|s| s.start), Some(4));
        assert!(plan.span(3).is_none());
    }

    #[tokio::test]
    async fn for_file_rejects_directory() {
        let dir = tempfile::tempdir().unwrap();
        let result = ChunkPlan::for_file(dir.path(), 4).await;
        assert!(matches!(result, Err(TransferError::NotAFile(_))));
    }

    #[tokio::test]
    async fn for_file_missing_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = ChunkPlan::for_file(&dir.path().join("nope.bin"), 4).await;
        assert!(matches!(result, Err(TransferError::Io(_))));
    }
}
