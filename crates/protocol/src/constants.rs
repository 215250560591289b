//! Endpoint paths, multipart field names and storage naming constants.

/// Resume check endpoint.
pub const VERIFY_PATH: &str = "/verify";

/// Merge endpoint.
pub const MERGE_PATH: &str = "/merge";

/// Chunk receive endpoint (multipart form).
pub const CHUNK_PATH: &str = "/";

/// Multipart text field carrying the chunk storage name (`<index>-<fileHash>`).
pub const FIELD_HASH: &str = "hash";

/// Multipart text field carrying the whole-file hash.
pub const FIELD_FILE_HASH: &str = "fileHash";

/// Multipart text field carrying the original filename.
pub const FIELD_FILENAME: &str = "filename";

/// Multipart file part carrying the chunk payload.
pub const FIELD_CHUNK: &str = "chunk";

/// Plain-text acknowledgement for a stored chunk.
pub const CHUNK_RECEIVED_MESSAGE: &str = "received file chunk";

/// Message returned by a successful merge.
pub const MERGE_SUCCESS_MESSAGE: &str = "file merged success";

/// `code` value of a successful merge response.
pub const MERGE_CODE_OK: i32 = 0;

/// `code` value of a failed merge response.
pub const MERGE_CODE_FAILED: i32 = 1;

/// Prefix of the per-upload chunk directory (`chunkDir_<fileHash>`).
pub const CHUNK_DIR_PREFIX: &str = "chunkDir_";

/// Separator between the index and the file hash in a chunk name.
pub const CHUNK_NAME_SEPARATOR: char = '-';

/// Default chunk size used by clients: 10 MiB.
pub const DEFAULT_CHUNK_SIZE: u64 = 10 * 1024 * 1024;
