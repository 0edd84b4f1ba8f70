//! Version Stamper - writes the release tag into the version marker

use super::write_file_atomic;
use crate::core::error::{ReleaseError, Result};
use crate::core::types::ReleaseTag;
use std::path::{Path, PathBuf};
use tokio::fs;

const MARKER_FILE_MODE: u32 = 0o644;

/// Proof that the marker on disk holds `tag`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionMarker {
    pub path: PathBuf,
    pub tag: ReleaseTag,
}

#[derive(Debug, Clone)]
pub struct VersionStamper {
    marker_path: PathBuf,
}

impl VersionStamper {
    pub fn new<P: AsRef<Path>>(marker_path: P) -> Self {
        Self {
            marker_path: marker_path.as_ref().to_path_buf(),
        }
    }

    /// Overwrite the marker with `{tag}\n`
    pub async fn stamp(&self, tag: &ReleaseTag) -> Result<VersionMarker> {
        let contents = format!("{}\n", tag);
        write_file_atomic(&self.marker_path, contents.as_bytes(), MARKER_FILE_MODE).await?;

        tracing::info!(path = %self.marker_path.display(), %tag, "version stamped");

        Ok(VersionMarker {
            path: self.marker_path.clone(),
            tag: tag.clone(),
        })
    }

    /// Current marker content with trailing whitespace trimmed, if present
    pub async fn read(&self) -> Result<Option<String>> {
        read_marker(&self.marker_path).await
    }
}

pub(crate) async fn read_marker(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path).await {
        Ok(content) => Ok(Some(content.trim_end().to_string())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(ReleaseError::Build {
            message: format!("cannot read version marker {}: {}", path.display(), e),
            exit_code: None,
        }),
    }
}
