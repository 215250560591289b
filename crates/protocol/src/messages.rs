use serde::{Deserialize, Serialize};

use crate::constants::{MERGE_CODE_FAILED, MERGE_CODE_OK, MERGE_SUCCESS_MESSAGE};

// ---------------------------------------------------------------------------
// Request payloads
// ---------------------------------------------------------------------------

/// Asks whether a file still needs uploading and which chunks are stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    pub filename: String,
    pub file_hash: String,
}

/// Asks the server to assemble the stored chunks into the final file.
///
/// `size` is the chunk size used when the file was planned, not the file size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeRequest {
    pub file_hash: String,
    pub filename: String,
    pub size: u64,
    /// Number of planned chunks. Older clients omit it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_count: Option<u64>,
}

// ---------------------------------------------------------------------------
// Response payloads
// ---------------------------------------------------------------------------

/// Result of a verify request.
///
/// `uploaded_list` is absent when the merged file already exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub should_upload: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploaded_list: Option<Vec<String>>,
}

impl VerifyResponse {
    /// The merged file already exists; nothing to upload.
    pub fn complete() -> Self {
        Self {
            should_upload: false,
            uploaded_list: None,
        }
    }

    /// Upload is needed; `uploaded` lists chunk names already stored.
    pub fn resume(uploaded: Vec<String>) -> Self {
        Self {
            should_upload: true,
            uploaded_list: Some(uploaded),
        }
    }
}

/// Result of a merge request. `code == 0` means success.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeResponse {
    pub code: i32,
    pub message: String,
}

impl MergeResponse {
    pub fn success() -> Self {
        Self {
            code: MERGE_CODE_OK,
            message: MERGE_SUCCESS_MESSAGE.into(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            code: MERGE_CODE_FAILED,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == MERGE_CODE_OK
    }
}
