//! Upload orchestration for one file.
//!
//! Pipeline: plan, hash (background task), verify, upload the chunks the
//! server is missing with bounded concurrency, then merge. A failed chunk
//! does not stop the others, but no merge is requested unless every chunk
//! is stored. Cancelling the token stops pending and in-flight transfers;
//! chunks already stored stay on the server, so running again resumes.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chunkdrop_protocol::{ChunkKey, FileHash, MergeRequest, VerifyRequest};
use chunkdrop_transfer::{
    ChunkPlan, ChunkProgress, ChunkReader, ChunkSpan, ContentHasher, HashEvent, SpeedCalculator,
    TransferError,
};
use futures_util::{StreamExt, stream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::UploadError;
use crate::http::HttpTransport;
use crate::transport::{ByteProgress, ChunkUpload, UploadTransport};
use crate::types::{ChunkOutcome, ClientConfig, UploadEvent, UploadSummary, VerifyResult};

/// Event channel capacity. Events are sent with `try_send` and dropped if
/// the consumer falls this far behind.
const EVENT_BUFFER: usize = 1024;

/// Uploads files to one server.
pub struct UploadCoordinator {
    transport: Arc<dyn UploadTransport>,
    config: ClientConfig,
    events_tx: mpsc::Sender<UploadEvent>,
    events_rx: Option<mpsc::Receiver<UploadEvent>>,
    cancel: CancellationToken,
}

impl UploadCoordinator {
    pub fn new(transport: Arc<dyn UploadTransport>, config: ClientConfig) -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        Self {
            transport,
            config,
            events_tx,
            events_rx: Some(events_rx),
            cancel: CancellationToken::new(),
        }
    }

    /// Creates a coordinator talking HTTP to `config.endpoint`.
    pub fn http(config: ClientConfig) -> Result<Self, UploadError> {
        let transport = HttpTransport::new(&config.endpoint)?;
        Ok(Self::new(Arc::new(transport), config))
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Takes the event receiver. Can only be called once.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<UploadEvent>> {
        self.events_rx.take()
    }

    /// Returns the token that cancels this coordinator's transfers.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Uploads one file end to end, resuming from whatever the server holds.
    pub async fn upload_file(&self, path: &Path) -> Result<UploadSummary, UploadError> {
        match self.run(path).await {
            Ok(summary) => {
                info!(
                    file_hash = %summary.file_hash,
                    uploaded = summary.uploaded,
                    skipped = summary.skipped,
                    "upload completed"
                );
                self.emit_final(UploadEvent::Completed {
                    file_hash: summary.file_hash.clone(),
                })
                .await;
                Ok(summary)
            }
            Err(UploadError::Cancelled) => {
                info!(file = %path.display(), "upload cancelled");
                self.emit_final(UploadEvent::Cancelled).await;
                Err(UploadError::Cancelled)
            }
            Err(e) => {
                error!(file = %path.display(), error = %e, "upload failed");
                self.emit_final(UploadEvent::Failed {
                    error: e.to_string(),
                })
                .await;
                Err(e)
            }
        }
    }

    async fn run(&self, path: &Path) -> Result<UploadSummary, UploadError> {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| TransferError::NotAFile(path.display().to_string()))?;
        let plan = ChunkPlan::for_file(path, self.config.chunk_size).await?;
        let reader = ChunkReader::new(path);
        info!(
            file = %path.display(),
            bytes = plan.file_size(),
            chunks = plan.len(),
            chunk_size = plan.chunk_size(),
            "starting upload"
        );

        let file_hash = self.hash(&reader, &plan).await?;
        self.check_cancelled()?;

        let resume = self.verify(&filename, &file_hash).await?;
        self.emit(UploadEvent::Verified {
            should_upload: resume.should_upload,
            already_stored: resume.uploaded.len(),
        });

        if !resume.should_upload {
            info!(%file_hash, "server already has this file");
            self.emit(UploadEvent::AlreadyComplete {
                file_hash: file_hash.clone(),
            });
            return Ok(UploadSummary {
                file_hash,
                file_size: plan.file_size(),
                chunks: plan.len(),
                uploaded: 0,
                skipped: plan.len(),
                already_complete: true,
            });
        }

        let outcomes = self
            .upload_chunks(&reader, &plan, &file_hash, &filename, &resume.uploaded)
            .await;

        if self.cancel.is_cancelled()
            || outcomes
                .iter()
                .any(|o| matches!(o, ChunkOutcome::Cancelled { .. }))
        {
            return Err(UploadError::Cancelled);
        }

        let failed: Vec<u64> = outcomes
            .iter()
            .filter(|o| matches!(o, ChunkOutcome::Failed { .. }))
            .map(ChunkOutcome::index)
            .collect();
        if !failed.is_empty() {
            return Err(UploadError::ChunksFailed(failed));
        }

        self.request_merge(
            &filename,
            &file_hash,
            plan.chunk_size(),
            Some(plan.len() as u64),
        )
        .await?;
        self.emit(UploadEvent::Merged {
            file_hash: file_hash.clone(),
        });

        let uploaded = outcomes
            .iter()
            .filter(|o| matches!(o, ChunkOutcome::Uploaded { .. }))
            .count();
        Ok(UploadSummary {
            file_hash,
            file_size: plan.file_size(),
            chunks: plan.len(),
            uploaded,
            skipped: plan.len() - uploaded,
            already_complete: false,
        })
    }

    /// Hashes the file in a background task, forwarding its progress.
    async fn hash(&self, reader: &ChunkReader, plan: &ChunkPlan) -> Result<FileHash, UploadError> {
        let mut handle = ContentHasher::new(reader.clone(), plan.clone()).spawn();

        if let Some(mut events) = handle.take_events() {
            loop {
                tokio::select! {
                    _ = self.cancel.cancelled() => {
                        handle.abort();
                        return Err(UploadError::Cancelled);
                    }
                    event = events.recv() => match event {
                        Some(HashEvent::Progress { processed, total }) => {
                            self.emit(UploadEvent::HashProgress { processed, total });
                        }
                        Some(HashEvent::Completed { .. }) => {}
                        None => break,
                    }
                }
            }
        }

        let file_hash = handle.wait().await?;
        self.emit(UploadEvent::HashCompleted {
            file_hash: file_hash.clone(),
        });
        Ok(file_hash)
    }

    /// Asks the server what it already holds for `file_hash`.
    ///
    /// Chunk names are parsed back into indices; names that do not belong
    /// to this file are ignored.
    pub async fn verify(
        &self,
        filename: &str,
        file_hash: &FileHash,
    ) -> Result<VerifyResult, UploadError> {
        let response = self
            .transport
            .verify(VerifyRequest {
                filename: filename.to_string(),
                file_hash: file_hash.to_string(),
            })
            .await?;

        let mut uploaded = BTreeSet::new();
        for name in response.uploaded_list.unwrap_or_default() {
            match ChunkKey::parse(&name) {
                Ok(key) if key.file_hash == *file_hash => {
                    uploaded.insert(key.index);
                }
                _ => warn!(%name, %file_hash, "ignoring unexpected chunk name from verify"),
            }
        }

        debug!(
            %file_hash,
            should_upload = response.should_upload,
            stored = uploaded.len(),
            "verify"
        );
        Ok(VerifyResult {
            should_upload: response.should_upload,
            uploaded,
        })
    }

    /// Uploads every planned chunk not in `uploaded`.
    ///
    /// Returns one outcome per planned chunk, ordered by index.
    pub async fn upload_chunks(
        &self,
        reader: &ChunkReader,
        plan: &ChunkPlan,
        file_hash: &FileHash,
        filename: &str,
        uploaded: &BTreeSet<u64>,
    ) -> Vec<ChunkOutcome> {
        let reporter = Arc::new(ProgressReporter::new(plan, self.events_tx.clone()));
        let mut outcomes = Vec::with_capacity(plan.len());
        let mut pending = Vec::new();

        for span in plan.spans() {
            if uploaded.contains(&span.index) {
                reporter.progress.mark_complete(span.index);
                outcomes.push(ChunkOutcome::Skipped { index: span.index });
            } else {
                pending.push(*span);
            }
        }
        reporter.report();
        debug!(
            %file_hash,
            pending = pending.len(),
            skipped = outcomes.len(),
            concurrency = self.config.concurrency,
            "uploading chunks"
        );

        let sent: Vec<ChunkOutcome> = stream::iter(pending)
            .map(|span| self.upload_one(reader, file_hash, filename, &reporter, span))
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;

        outcomes.extend(sent);
        outcomes.sort_by_key(ChunkOutcome::index);
        outcomes
    }

    async fn upload_one(
        &self,
        reader: &ChunkReader,
        file_hash: &FileHash,
        filename: &str,
        reporter: &Arc<ProgressReporter>,
        span: ChunkSpan,
    ) -> ChunkOutcome {
        let index = span.index;
        if self.cancel.is_cancelled() {
            return ChunkOutcome::Cancelled { index };
        }

        let transfer = async {
            let chunk = reader.read_chunk(&span).await?;
            let bytes = chunk.data.len() as u64;
            let upload = ChunkUpload {
                key: ChunkKey::new(index, file_hash.clone()),
                filename: filename.to_string(),
                data: chunk.data,
            };
            self.transport
                .upload_chunk(upload, reporter.chunk_callback(span))
                .await?;
            Ok::<u64, UploadError>(bytes)
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                debug!(index, "chunk upload cancelled");
                ChunkOutcome::Cancelled { index }
            }
            result = transfer => match result {
                Ok(bytes) => {
                    reporter.chunk_done(index);
                    self.emit(UploadEvent::ChunkUploaded { index });
                    debug!(index, bytes, "chunk uploaded");
                    ChunkOutcome::Uploaded { index, bytes }
                }
                Err(e) => {
                    warn!(index, error = %e, "chunk upload failed");
                    let error = e.to_string();
                    self.emit(UploadEvent::ChunkFailed {
                        index,
                        error: error.clone(),
                    });
                    ChunkOutcome::Failed { index, error }
                }
            }
        }
    }

    /// Asks the server to assemble the stored chunks.
    ///
    /// `chunk_size` must be the size the file was planned with.
    pub async fn request_merge(
        &self,
        filename: &str,
        file_hash: &FileHash,
        chunk_size: u64,
        chunk_count: Option<u64>,
    ) -> Result<(), UploadError> {
        let response = self
            .transport
            .merge(MergeRequest {
                file_hash: file_hash.to_string(),
                filename: filename.to_string(),
                size: chunk_size,
                chunk_count,
            })
            .await?;

        if !response.is_success() {
            return Err(UploadError::MergeRejected {
                code: response.code,
                message: response.message,
            });
        }
        info!(%file_hash, chunk_size, "merge complete");
        Ok(())
    }

    fn check_cancelled(&self) -> Result<(), UploadError> {
        if self.cancel.is_cancelled() {
            Err(UploadError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Sends a progress event, dropping it if the consumer is behind.
    fn emit(&self, event: UploadEvent) {
        let _ = self.events_tx.try_send(event);
    }

    /// Sends a terminal event, waiting for room once a consumer has taken
    /// the receiver. Without one, it is queued like any other event.
    async fn emit_final(&self, event: UploadEvent) {
        if self.events_rx.is_some() {
            let _ = self.events_tx.try_send(event);
        } else {
            let _ = self.events_tx.send(event).await;
        }
    }
}

/// Aggregates chunk progress into monotone `Progress` events.
struct ProgressReporter {
    progress: ChunkProgress,
    speed: SpeedCalculator,
    events_tx: mpsc::Sender<UploadEvent>,
    last_fraction: Mutex<Option<f64>>,
}

impl ProgressReporter {
    fn new(plan: &ChunkPlan, events_tx: mpsc::Sender<UploadEvent>) -> Self {
        Self {
            progress: ChunkProgress::new(plan),
            speed: SpeedCalculator::default(),
            events_tx,
            last_fraction: Mutex::new(None),
        }
    }

    /// Byte-progress callback for one chunk transfer.
    fn chunk_callback(self: &Arc<Self>, span: ChunkSpan) -> ByteProgress {
        let reporter = Arc::clone(self);
        let total = span.len();
        let last = AtomicU64::new(0);
        Arc::new(move |loaded: u64| {
            let loaded = loaded.min(total);
            let previous = last.fetch_max(loaded, Ordering::Relaxed);
            if loaded <= previous {
                return;
            }
            reporter.speed.add_sample(loaded - previous);
            reporter.progress.set_loaded(span.index, loaded);
            let _ = reporter.events_tx.try_send(UploadEvent::ChunkProgress {
                index: span.index,
                loaded,
                total,
            });
            reporter.report();
        })
    }

    fn chunk_done(&self, index: u64) {
        self.progress.mark_complete(index);
        self.report();
    }

    /// Emits the aggregate fraction if it moved forward.
    fn report(&self) {
        // Held while sending so concurrent reports cannot reorder.
        let mut last = self.last_fraction.lock().unwrap_or_else(|e| e.into_inner());
        let fraction = self.progress.fraction();
        if (*last).is_some_and(|l| fraction <= l) {
            return;
        }
        *last = Some(fraction);
        let _ = self.events_tx.try_send(UploadEvent::Progress {
            fraction,
            bytes_per_second: self.speed.bytes_per_second(),
        });
    }
}
