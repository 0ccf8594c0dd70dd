//! Stream key resolution
//!
//! A publish arrives with a raw path like `/live/cam1`. The canonical stream
//! identity is the final non-empty path segment; two publishes with the same
//! raw path always resolve to the same key.

use crate::error::{Error, Result};

/// Canonical identity of a published stream
///
/// Opaque and immutable once derived. Used as the registry map key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamKey(String);

impl StreamKey {
    /// Derive the key from a raw publish path
    ///
    /// Takes the last non-empty `/`-separated segment, so trailing slashes
    /// are tolerated. Pure: same input always yields the same key.
    pub fn from_path(raw_path: &str) -> Result<Self> {
        raw_path
            .split('/')
            .rev()
            .find(|segment| !segment.is_empty())
            .map(|segment| Self(segment.to_string()))
            .ok_or_else(|| Error::InvalidStreamPath(raw_path.to_string()))
    }

    /// The key as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StreamKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
