//! HTTP surface for chunked uploads.
//!
//! Exposes `POST /verify`, `POST /merge` and the multipart chunk endpoint
//! `POST /` on top of [`chunkdrop_store`], answers CORS preflight for any
//! path, and runs until its cancellation token fires.

mod cors;
mod error;
mod handlers;
mod server;

pub use error::ServerError;
pub use server::{AppState, ServerConfig, UploadServer, router};
