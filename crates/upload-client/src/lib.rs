//! Client side of resumable chunked uploads.
//!
//! [`UploadCoordinator`] drives one file through hash, verify, chunk upload
//! and merge, reporting progress as [`UploadEvent`]s. The network is
//! reached through the [`UploadTransport`] trait; [`HttpTransport`] is the
//! reqwest implementation against the `/verify`, `/` and `/merge` endpoints.

mod coordinator;
mod error;
mod http;
mod transport;
mod types;

pub use coordinator::UploadCoordinator;
pub use error::UploadError;
pub use http::HttpTransport;
pub use transport::{ByteProgress, ChunkUpload, TransportFuture, UploadTransport};
pub use types::{ChunkOutcome, ClientConfig, UploadEvent, UploadSummary, VerifyResult};
