//! The four release steps and the helpers they share

pub mod credential_provisioner;
pub mod distribution_builder;
pub mod publisher;
pub mod version_stamper;

pub use credential_provisioner::CredentialProvisioner;
pub use distribution_builder::{CommandPackageBuilder, DistributionBuilder, PackageBuilder};
pub use publisher::{
    PublishReceipt, Publisher, TwineUploadClient, UploadClient, classify_upload_failure,
};
pub use version_stamper::{VersionMarker, VersionStamper};

use crate::core::error::{ReleaseError, Result};
use crate::security::SecretMasker;
use std::io::{self, Write};
use std::path::Path;
use std::process::Output;
use tokio::task;

/// Captured output of a finished external tool, already masked
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn from_output(output: &Output, masker: &SecretMasker) -> Self {
        Self {
            stdout: masker.mask_bytes(&output.stdout),
            stderr: masker.mask_bytes(&output.stderr),
        }
    }

    /// stderr if the tool wrote any, otherwise stdout
    pub fn diagnostic(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim().to_string()
        } else {
            stderr.to_string()
        }
    }
}

/// Replace `path` with `contents` via a randomly named sibling temp file and
/// a rename.
///
/// The temp file is created exclusively with `mode` (Unix), so the content is
/// never readable by others and a planted symlink is never followed. A
/// symlink at `path` itself is replaced, not written through.
pub(crate) async fn write_file_atomic(path: &Path, contents: &[u8], mode: u32) -> Result<()> {
    let target = path.to_path_buf();
    let contents = contents.to_vec();

    task::spawn_blocking(move || persist_atomic(&target, &contents, mode))
        .await
        .map_err(io::Error::other)
        .and_then(|written| written)
        .map_err(|source| ReleaseError::ConfigWrite {
            path: path.to_path_buf(),
            source,
        })
}

fn persist_atomic(path: &Path, contents: &[u8], mode: u32) -> io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut builder = tempfile::Builder::new();
    builder.prefix(".release-").suffix(".tmp");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(std::fs::Permissions::from_mode(mode));
    }
    #[cfg(not(unix))]
    let _ = mode;

    let mut temp = builder.tempfile_in(dir)?;
    temp.write_all(contents)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
