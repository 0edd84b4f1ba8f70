//! Distribution Builder - runs the packaging tool and locates the archive
//!
//! The packaging tool itself sits behind [`PackageBuilder`]; the default
//! [`CommandPackageBuilder`] runs `python setup.py sdist --dist-dir {dist_dir}`
//! (or whatever argv is configured) in the project root.

use super::version_stamper::{VersionMarker, read_marker};
use super::ToolOutput;
use crate::core::error::{ReleaseError, Result};
use crate::core::types::DistributionArtifact;
use crate::security::{CommandError, SafeCommandExecutor, SecretMasker};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;

/// External packaging tool
#[async_trait]
pub trait PackageBuilder: Send + Sync {
    /// Tool name for logs
    fn name(&self) -> &str;

    /// Build a source distribution of `project_root` into `dist_dir`.
    ///
    /// Fails with [`ReleaseError::Build`] when the tool cannot run or exits
    /// non-zero.
    async fn build(&self, project_root: &Path, dist_dir: &Path) -> Result<ToolOutput>;
}

/// Placeholder in a build argv for the output directory
pub const DIST_DIR_PLACEHOLDER: &str = "{dist_dir}";

/// Runs a configured packaging command through [`SafeCommandExecutor`].
///
/// Every [`DIST_DIR_PLACEHOLDER`] in the argv is replaced with the output
/// directory before the tool runs.
pub struct CommandPackageBuilder {
    executor: SafeCommandExecutor,
    argv: Vec<String>,
    masker: Arc<SecretMasker>,
}

impl CommandPackageBuilder {
    pub fn new(
        executor: SafeCommandExecutor,
        argv: Vec<String>,
        masker: Arc<SecretMasker>,
    ) -> Self {
        Self {
            executor,
            argv,
            masker,
        }
    }
}

#[async_trait]
impl PackageBuilder for CommandPackageBuilder {
    fn name(&self) -> &str {
        self.argv.first().map(String::as_str).unwrap_or("build")
    }

    async fn build(&self, _project_root: &Path, dist_dir: &Path) -> Result<ToolOutput> {
        let argv = expand_argv(&self.argv, dist_dir);
        let output = self
            .executor
            .execute_argv(&argv)
            .await
            .map_err(|e| build_command_error(e, &self.masker))?;

        let tool_output = ToolOutput::from_output(&output, &self.masker);
        if !output.status.success() {
            return Err(ReleaseError::Build {
                message: format!(
                    "`{}` exited with {}: {}",
                    argv.join(" "),
                    output.status,
                    tool_output.diagnostic()
                ),
                exit_code: output.status.code(),
            });
        }

        tracing::debug!(stdout = %tool_output.stdout, "packaging tool finished");
        Ok(tool_output)
    }
}

fn expand_argv(argv: &[String], dist_dir: &Path) -> Vec<String> {
    let dist_dir = dist_dir.display().to_string();
    argv.iter()
        .map(|arg| arg.replace(DIST_DIR_PLACEHOLDER, &dist_dir))
        .collect()
}

fn build_command_error(error: CommandError, masker: &SecretMasker) -> ReleaseError {
    ReleaseError::Build {
        message: masker.mask(&error.to_string()),
        exit_code: None,
    }
}

/// Step 3: produce `{project}-{tag}.{ext}` in the output directory
pub struct DistributionBuilder {
    builder: Box<dyn PackageBuilder>,
    project_root: PathBuf,
    dist_dir: PathBuf,
    project_name: String,
    archive_extension: String,
}

impl DistributionBuilder {
    pub fn new(
        builder: Box<dyn PackageBuilder>,
        project_root: impl Into<PathBuf>,
        dist_dir: impl Into<PathBuf>,
        project_name: impl Into<String>,
        archive_extension: impl Into<String>,
    ) -> Self {
        Self {
            builder,
            project_root: project_root.into(),
            dist_dir: dist_dir.into(),
            project_name: project_name.into(),
            archive_extension: archive_extension.into(),
        }
    }

    pub async fn build(&self, marker: &VersionMarker) -> Result<DistributionArtifact> {
        // The packaging tool resolves its version from the marker on disk.
        let on_disk = read_marker(&marker.path).await?;
        if on_disk.as_deref() != Some(marker.tag.as_str()) {
            return Err(ReleaseError::Build {
                message: format!(
                    "version marker {} does not hold {}",
                    marker.path.display(),
                    marker.tag
                ),
                exit_code: None,
            });
        }

        let artifact = DistributionArtifact::derive(
            &self.dist_dir,
            &self.project_name,
            &marker.tag,
            &self.archive_extension,
        );

        // Only an archive produced by this build may satisfy the postcondition.
        match fs::remove_file(&artifact.path).await {
            Ok(()) => tracing::debug!(path = %artifact.path.display(), "removed stale archive"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(ReleaseError::Build {
                    message: format!(
                        "cannot remove stale archive {}: {}",
                        artifact.path.display(),
                        e
                    ),
                    exit_code: None,
                });
            }
        }

        tracing::info!(
            tool = self.builder.name(),
            tag = %marker.tag,
            "building source distribution"
        );
        self.builder.build(&self.project_root, &self.dist_dir).await?;

        let is_file = fs::metadata(&artifact.path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false);
        if !is_file {
            return Err(ReleaseError::ArtifactNotFound {
                path: artifact.path,
            });
        }

        tracing::info!(artifact = %artifact.path.display(), "source distribution built");
        Ok(artifact)
    }
}
