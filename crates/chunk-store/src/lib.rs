//! Server side of chunked uploads.
//!
//! Chunks are persisted under `<root>/chunkDir_<fileHash>/<index>-<fileHash>`
//! until a merge assembles them into `<root>/<fileHash><ext>` and removes the
//! chunk directory. All three services take an explicit [`StorageLayout`];
//! nothing reads ambient process state.

mod error;
mod layout;
mod merge;
mod store;
mod verify;

pub use error::StoreError;
pub use layout::{StorageLayout, StoredChunk};
pub use merge::{DEFAULT_MERGE_CONCURRENCY, MergeOutcome, MergeService};
pub use store::{ChunkStore, DEFAULT_MAX_CHUNK_BYTES};
pub use verify::{VerifyOutcome, VerifyService};
