//! Content hashes address blobs in the cache and on the origin store.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Length of a hex encoded SHA-1 digest.
pub const CONTENT_HASH_LEN: usize = 40;

/// A content-derived blob identifier, normalized to upper-case hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentHash(String);

impl ContentHash {
    /// Parse a hash, accepting either case.
    pub fn parse(value: &str) -> Result<Self, AppError> {
        let value = value.trim();
        if value.len() != CONTENT_HASH_LEN || !value.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(AppError::validation(format!(
                "Invalid content hash '{value}': expected {CONTENT_HASH_LEN} hex characters"
            )));
        }
        Ok(Self(value.to_ascii_uppercase()))
    }

    /// Borrow the normalized hash.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Two-character shard prefix used to spread blobs over directories.
    pub fn shard_prefix(&self) -> &str {
        &self.0[..2]
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ContentHash {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ContentHash> for String {
    fn from(hash: ContentHash) -> String {
        hash.0
    }
}
