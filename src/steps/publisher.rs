//! Publisher - uploads the built archive to the package index
//!
//! Terminal step. A failed upload is reported and never retried; a
//! successful one cannot be undone from here.

use super::ToolOutput;
use crate::core::error::{ReleaseError, Result, UploadFailure};
use crate::core::types::{CredentialFile, DistributionArtifact};
use crate::security::{SafeCommandExecutor, SecretMasker};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::{Arc, LazyLock};
use tokio::fs;

/// External upload client
#[async_trait]
pub trait UploadClient: Send + Sync {
    fn name(&self) -> &str;

    /// Push `artifact` to the index section named in `credentials`.
    async fn upload(
        &self,
        artifact: &DistributionArtifact,
        credentials: &CredentialFile,
    ) -> Result<ToolOutput>;
}

/// Ordered: the first matching pattern decides the reason.
static FAILURE_PATTERNS: LazyLock<Vec<(UploadFailure, Regex)>> = LazyLock::new(|| {
    [
        (
            UploadFailure::VersionConflict,
            r"(?i)file already exists|already been (taken|used)|version .* already exists",
        ),
        (
            UploadFailure::Authentication,
            r"(?i)\b40[13]\b|invalid or non-existent authentication|forbidden|unauthorized",
        ),
        (
            UploadFailure::Network,
            r"(?i)connection (refused|reset|aborted|error)|max retries exceeded|name or service not known|temporary failure in name resolution|timed out|ssl",
        ),
        (UploadFailure::Rejected, r"(?i)httperror|\b[45]\d\d\b"),
    ]
    .into_iter()
    .filter_map(|(reason, pattern)| Regex::new(pattern).ok().map(|re| (reason, re)))
    .collect()
});

/// Map upload client diagnostics to a failure reason
pub fn classify_upload_failure(diagnostic: &str) -> UploadFailure {
    FAILURE_PATTERNS
        .iter()
        .find(|(_, re)| re.is_match(diagnostic))
        .map(|(reason, _)| *reason)
        .unwrap_or(UploadFailure::Unknown)
}

/// `twine upload --non-interactive --config-file <file> --repository <server> <artifact>`
pub struct TwineUploadClient {
    executor: SafeCommandExecutor,
    base_argv: Vec<String>,
    masker: Arc<SecretMasker>,
}

impl TwineUploadClient {
    pub fn new(
        executor: SafeCommandExecutor,
        base_argv: Vec<String>,
        masker: Arc<SecretMasker>,
    ) -> Self {
        Self {
            executor,
            base_argv,
            masker,
        }
    }

    fn argv(&self, artifact: &DistributionArtifact, credentials: &CredentialFile) -> Vec<String> {
        let mut argv = self.base_argv.clone();
        argv.extend([
            "--non-interactive".to_string(),
            "--config-file".to_string(),
            credentials.path.display().to_string(),
            "--repository".to_string(),
            credentials.server.clone(),
            artifact.path.display().to_string(),
        ]);
        argv
    }
}

#[async_trait]
impl UploadClient for TwineUploadClient {
    fn name(&self) -> &str {
        self.base_argv.first().map(String::as_str).unwrap_or("upload")
    }

    async fn upload(
        &self,
        artifact: &DistributionArtifact,
        credentials: &CredentialFile,
    ) -> Result<ToolOutput> {
        let output = self
            .executor
            .execute_argv(&self.argv(artifact, credentials))
            .await
            .map_err(|e| ReleaseError::Upload {
                reason: UploadFailure::Unknown,
                message: self.masker.mask(&e.to_string()),
                exit_code: None,
            })?;

        let tool_output = ToolOutput::from_output(&output, &self.masker);
        if !output.status.success() {
            let diagnostic = tool_output.diagnostic();
            return Err(ReleaseError::Upload {
                reason: classify_upload_failure(&diagnostic),
                message: diagnostic,
                exit_code: output.status.code(),
            });
        }

        tracing::debug!(stdout = %tool_output.stdout, "upload client finished");
        Ok(tool_output)
    }
}

/// Record of a completed upload
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishReceipt {
    pub artifact: PathBuf,
    pub server: String,
    pub published_at: DateTime<Utc>,
}

/// Step 4: upload exactly the artifact the builder produced
pub struct Publisher {
    client: Box<dyn UploadClient>,
}

impl Publisher {
    pub fn new(client: Box<dyn UploadClient>) -> Self {
        Self { client }
    }

    pub async fn publish(
        &self,
        artifact: &DistributionArtifact,
        credentials: &CredentialFile,
    ) -> Result<PublishReceipt> {
        let is_file = fs::metadata(&artifact.path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false);
        if !is_file {
            return Err(ReleaseError::ArtifactMissing {
                path: artifact.path.clone(),
            });
        }

        tracing::info!(
            client = self.client.name(),
            artifact = %artifact.file_name,
            server = %credentials.server,
            "uploading"
        );
        self.client.upload(artifact, credentials).await?;

        tracing::info!(artifact = %artifact.file_name, "published");
        Ok(PublishReceipt {
            artifact: artifact.path.clone(),
            server: credentials.server.clone(),
            published_at: Utc::now(),
        })
    }
}
