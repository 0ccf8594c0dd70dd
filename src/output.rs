//! Per-stream output locations
//!
//! Each active stream gets its own directory under the media root, holding
//! the HLS playlist (`index.m3u8`) and its media segments. Directories are
//! created idempotently before the job starts and are never deleted here;
//! segment retention is the transcoder's and the operator's business.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::registry::StreamKey;

/// Name of the playlist file inside each output directory
pub const PLAYLIST_NAME: &str = "index.m3u8";

/// Output directory and playlist path for one stream key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLocation {
    /// Directory holding the playlist and segments
    pub dir: PathBuf,

    /// Path of the HLS playlist inside `dir`
    pub playlist: PathBuf,
}

/// Maps stream keys to output directories under a media root
#[derive(Debug, Clone)]
pub struct OutputLayout {
    media_root: PathBuf,
}

impl OutputLayout {
    /// Create a layout rooted at the given directory
    pub fn new(media_root: impl Into<PathBuf>) -> Self {
        Self {
            media_root: media_root.into(),
        }
    }

    /// The media root directory
    pub fn media_root(&self) -> &Path {
        &self.media_root
    }

    /// The output location a key maps to, without touching the filesystem
    pub fn location(&self, key: &StreamKey) -> OutputLocation {
        let dir = self.media_root.join(key.as_str());
        let playlist = dir.join(PLAYLIST_NAME);
        OutputLocation { dir, playlist }
    }

    /// Ensure the output directory for a key exists
    ///
    /// Idempotent: safe to call again for the same key on a retried start.
    /// Fails with [`Error::StorageUnavailable`], which must prevent the job
    /// from starting.
    pub async fn ensure(&self, key: &StreamKey) -> Result<OutputLocation> {
        let location = self.location(key);

        tokio::fs::create_dir_all(&location.dir)
            .await
            .map_err(|source| Error::StorageUnavailable {
                path: location.dir.clone(),
                source,
            })?;

        Ok(location)
    }
}
