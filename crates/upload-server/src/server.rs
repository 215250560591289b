//! Router assembly and the server run loop.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::middleware;
use axum::routing::post;
use chunkdrop_protocol::constants::{CHUNK_PATH, MERGE_PATH, VERIFY_PATH};
use chunkdrop_store::{
    ChunkStore, DEFAULT_MAX_CHUNK_BYTES, DEFAULT_MERGE_CONCURRENCY, MergeService, StorageLayout,
    VerifyService,
};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::{ServerError, cors, handlers};

/// Room for the multipart framing and text fields around a chunk payload.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to listen on (port 0 = OS-assigned).
    pub listen_addr: SocketAddr,
    /// Storage root for chunk directories and merged files.
    pub upload_dir: PathBuf,
    /// Largest accepted chunk payload in bytes.
    pub max_chunk_bytes: u64,
    /// Concurrent chunk writes per merge.
    pub merge_concurrency: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: ([0, 0, 0, 0], 3000).into(),
            upload_dir: PathBuf::from("uploads"),
            max_chunk_bytes: DEFAULT_MAX_CHUNK_BYTES,
            merge_concurrency: DEFAULT_MERGE_CONCURRENCY,
        }
    }
}

/// Services shared by all handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    pub(crate) store: ChunkStore,
    pub(crate) verify: VerifyService,
    pub(crate) merge: MergeService,
}

impl AppState {
    pub fn new(layout: StorageLayout, max_chunk_bytes: u64, merge_concurrency: usize) -> Self {
        Self {
            store: ChunkStore::new(layout.clone(), max_chunk_bytes),
            verify: VerifyService::new(layout.clone()),
            merge: MergeService::new(layout, merge_concurrency),
        }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(
            StorageLayout::new(&config.upload_dir),
            config.max_chunk_bytes,
            config.merge_concurrency,
        )
    }
}

/// Builds the upload router.
pub fn router(state: AppState) -> Router {
    let body_limit = usize::try_from(state.store.max_chunk_bytes())
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD);

    Router::new()
        .route(VERIFY_PATH, post(handlers::verify))
        .route(MERGE_PATH, post(handlers::merge))
        .route(CHUNK_PATH, post(handlers::receive_chunk))
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(middleware::from_fn(cors::allow_any))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}

/// The upload HTTP server.
pub struct UploadServer {
    config: ServerConfig,
    state: AppState,
    cancel: CancellationToken,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl UploadServer {
    pub fn new(config: ServerConfig) -> Arc<Self> {
        Arc::new(Self {
            state: AppState::from_config(&config),
            config,
            cancel: CancellationToken::new(),
            local_addr: Mutex::new(None),
        })
    }

    /// Returns the local address the server is listening on.
    ///
    /// Only available after [`run`](Self::run) or [`serve`](Self::serve)
    /// has bound the socket.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock().await
    }

    /// Token that stops the server when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Gracefully shuts down the server.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Creates the storage root, binds the configured address and serves
    /// until cancellation.
    pub async fn run(&self) -> Result<(), ServerError> {
        tokio::fs::create_dir_all(&self.config.upload_dir).await?;
        let listener = TcpListener::bind(self.config.listen_addr).await?;
        self.serve(listener).await
    }

    /// Serves on an already bound listener until cancellation.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        let local_addr = listener.local_addr()?;
        *self.local_addr.lock().await = Some(local_addr);
        tracing::info!(
            upload_dir = %self.config.upload_dir.display(),
            max_chunk_bytes = self.config.max_chunk_bytes,
            "upload server listening on {local_addr}"
        );

        let cancel = self.cancel.clone();
        axum::serve(listener, router(self.state.clone()))
            .with_graceful_shutdown(async move { cancel.cancelled().await })
            .await?;

        tracing::info!("upload server shut down");
        Ok(())
    }
}
