//! Content hash identifier.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::InputError;

/// Deterministic identifier of a file's content (for example an IPFS CID).
///
/// Two entries with byte-identical content share the same hash. The value is opaque to the
/// core; it only has to be non-empty and free of whitespace and `/` so it can be embedded in
/// storage keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentHash(String);

impl ContentHash {
    /// Validate and wrap a content hash.
    pub fn new(hash: impl Into<String>) -> Result<Self, InputError> {
        let hash = hash.into();
        if hash.is_empty()
            || hash.chars().any(|c| c == '/' || c.is_whitespace() || c.is_control())
        {
            return Err(InputError::InvalidContentHash { input: hash });
        }
        Ok(Self(hash))
    }

    /// The hash as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for ContentHash {
    type Err = InputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ContentHash {
    type Error = InputError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ContentHash> for String {
    fn from(hash: ContentHash) -> Self {
        hash.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_validation() {
        assert!(ContentHash::new("QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG").is_ok());
        assert!(ContentHash::new("").is_err());
        assert!(ContentHash::new("a/b").is_err());
        assert!(ContentHash::new("a b").is_err());
    }
}
