use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ProtocolError;
use crate::constants::CHUNK_NAME_SEPARATOR;
use crate::validation::validate_file_hash;

/// Content digest identifying a whole file across upload sessions.
///
/// Also used as a storage namespace, so only ASCII alphanumerics are accepted.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FileHash(String);

impl FileHash {
    /// Validates and wraps a hash string.
    pub fn parse(s: impl Into<String>) -> Result<Self, ProtocolError> {
        let s = s.into();
        validate_file_hash(&s)?;
        Ok(Self(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for FileHash {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for FileHash {
    type Error = ProtocolError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(s)
    }
}

impl From<FileHash> for String {
    fn from(h: FileHash) -> Self {
        h.0
    }
}

/// Structured identity of one stored chunk.
///
/// Serialized as `"<index>-<fileHash>"` only when it crosses the storage or
/// wire boundary. Ordering compares the numeric index first, so `2` sorts
/// before `10`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChunkKey {
    pub index: u64,
    pub file_hash: FileHash,
}

impl ChunkKey {
    pub fn new(index: u64, file_hash: FileHash) -> Self {
        Self { index, file_hash }
    }

    /// Storage name of this chunk.
    pub fn name(&self) -> String {
        format!("{}{CHUNK_NAME_SEPARATOR}{}", self.index, self.file_hash)
    }

    /// Parses a storage name back into a key.
    ///
    /// Only canonical names are accepted: decimal index without sign or
    /// leading zeros, followed by a valid file hash.
    pub fn parse(name: &str) -> Result<Self, ProtocolError> {
        let invalid = || ProtocolError::InvalidChunkName(name.to_string());

        let (index, hash) = name.split_once(CHUNK_NAME_SEPARATOR).ok_or_else(invalid)?;
        if index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        if index.len() > 1 && index.starts_with('0') {
            return Err(invalid());
        }
        let index: u64 = index.parse().map_err(|_| invalid())?;
        let file_hash = FileHash::parse(hash).map_err(|_| invalid())?;

        Ok(Self { index, file_hash })
    }
}

impl fmt::Display for ChunkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{CHUNK_NAME_SEPARATOR}{}", self.index, self.file_hash)
    }
}

impl FromStr for ChunkKey {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
