//! Error handling for the release pipeline
//!
//! Every error is fatal: the pipeline stops at the first one and nothing is
//! retried or rolled back. Variants carry enough context for the CLI to print
//! a diagnostic and pick an exit code, but never the index secret.

use std::path::PathBuf;
use thiserror::Error;

/// Coarse error category, one per pipeline failure class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Required input missing or configuration unusable
    Input,
    /// Credential file or version marker could not be written
    ConfigWrite,
    /// Packaging tool failed or produced no archive
    Build,
    /// Upload client failed or its precondition was not met
    Upload,
}

/// Why the upload client gave up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadFailure {
    Authentication,
    VersionConflict,
    Network,
    Rejected,
    Unknown,
}

impl UploadFailure {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Authentication => "authentication rejected",
            Self::VersionConflict => "version already published",
            Self::Network => "network failure",
            Self::Rejected => "rejected by index",
            Self::Unknown => "upload failed",
        }
    }
}

/// Main error type for release operations
#[derive(Error, Debug)]
pub enum ReleaseError {
    #[error("required input {name} is missing or empty")]
    MissingInput { name: String },

    #[error("configuration error: {message}")]
    Config { message: String },

    #[error("invalid release tag {tag:?}: {reason}")]
    InvalidTag { tag: String, reason: String },

    #[error("failed to write {}: {source}", path.display())]
    ConfigWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("build failed: {message}")]
    Build {
        message: String,
        exit_code: Option<i32>,
    },

    #[error("build produced no archive at {}", path.display())]
    ArtifactNotFound { path: PathBuf },

    #[error("artifact to upload does not exist: {}", path.display())]
    ArtifactMissing { path: PathBuf },

    #[error("upload failed ({}): {message}", reason.as_str())]
    Upload {
        reason: UploadFailure,
        message: String,
        exit_code: Option<i32>,
    },
}

impl ReleaseError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingInput { .. } | Self::Config { .. } => ErrorKind::Input,
            Self::InvalidTag { .. } | Self::ConfigWrite { .. } => ErrorKind::ConfigWrite,
            Self::Build { .. } | Self::ArtifactNotFound { .. } => ErrorKind::Build,
            Self::ArtifactMissing { .. } | Self::Upload { .. } => ErrorKind::Upload,
        }
    }

    /// Process exit status for this error.
    ///
    /// A failing external tool's own status is passed through; everything
    /// else exits with 1.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Build {
                exit_code: Some(code),
                ..
            }
            | Self::Upload {
                exit_code: Some(code),
                ..
            } if *code != 0 => *code,
            _ => 1,
        }
    }

    /// Get error code for this error
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingInput { .. } => "MISSING_INPUT",
            Self::Config { .. } => "CONFIG_ERROR",
            Self::InvalidTag { .. } => "INVALID_TAG",
            Self::ConfigWrite { .. } => "CONFIG_WRITE_ERROR",
            Self::Build { .. } => "BUILD_ERROR",
            Self::ArtifactNotFound { .. } => "ARTIFACT_NOT_FOUND",
            Self::ArtifactMissing { .. } => "ARTIFACT_MISSING",
            Self::Upload { .. } => "UPLOAD_ERROR",
        }
    }

    /// Get suggested actions for this error
    pub fn suggested_actions(&self) -> Vec<&'static str> {
        match self {
            Self::MissingInput { .. } => vec![
                "Set RELEASE_TAG, PACKAGE_INDEX_USERNAME and PACKAGE_INDEX_SECRET in the CI job",
            ],
            Self::Config { .. } => vec![
                "Check .release-config.yaml",
                "Set the project name in pyproject.toml or with --project-name",
            ],
            Self::InvalidTag { .. } => {
                vec!["Use a tag without path separators, whitespace or control characters"]
            }
            Self::ConfigWrite { .. } => vec![
                "Check permissions of the target directory",
                "Check free disk space",
            ],
            Self::Build { .. } => vec![
                "Check the packaging tool output above",
                "Verify setup.py/pyproject.toml metadata",
            ],
            Self::ArtifactNotFound { .. } => vec![
                "Check that the project name matches the package metadata",
                "Check that the build reads its version from the VERSION file",
            ],
            Self::ArtifactMissing { .. } => vec!["Run the build step before uploading"],
            Self::Upload { reason, .. } => match reason {
                UploadFailure::Authentication => vec!["Check the index username and secret"],
                UploadFailure::VersionConflict => {
                    vec!["Tag a new version; published files cannot be replaced"]
                }
                UploadFailure::Network => vec!["Check connectivity to the package index"],
                UploadFailure::Rejected | UploadFailure::Unknown => {
                    vec!["Check the upload client output above"]
                }
            },
        }
    }
}

pub type Result<T, E = ReleaseError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_input_error() {
        let error = ReleaseError::MissingInput {
            name: "RELEASE_TAG".to_string(),
        };

        assert_eq!(error.kind(), ErrorKind::Input);
        assert_eq!(error.code(), "MISSING_INPUT");
        assert_eq!(error.exit_code(), 1);
        assert!(error.to_string().contains("RELEASE_TAG"));
    }

    #[test]
    fn test_invalid_tag_is_config_write_kind() {
        let error = ReleaseError::InvalidTag {
            tag: "../x".to_string(),
            reason: "contains a path separator".to_string(),
        };

        assert_eq!(error.kind(), ErrorKind::ConfigWrite);
        assert_eq!(error.code(), "INVALID_TAG");
    }

    #[test]
    fn test_config_write_error_names_path() {
        let error = ReleaseError::ConfigWrite {
            path: PathBuf::from("/root/.pypirc"),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        };

        assert_eq!(error.kind(), ErrorKind::ConfigWrite);
        assert!(error.to_string().contains("/root/.pypirc"));
        assert!(!error.suggested_actions().is_empty());
    }

    #[test]
    fn test_build_error_passes_tool_status_through() {
        let error = ReleaseError::Build {
            message: "error: invalid command 'sdist'".to_string(),
            exit_code: Some(2),
        };

        assert_eq!(error.kind(), ErrorKind::Build);
        assert_eq!(error.exit_code(), 2);
    }

    #[test]
    fn test_build_error_without_status_exits_one() {
        let error = ReleaseError::Build {
            message: "python: not found".to_string(),
            exit_code: None,
        };

        assert_eq!(error.exit_code(), 1);
    }

    #[test]
    fn test_artifact_not_found_is_build_kind() {
        let error = ReleaseError::ArtifactNotFound {
            path: PathBuf::from("dist/myproject-1.2.3.tar.gz"),
        };

        assert_eq!(error.kind(), ErrorKind::Build);
        assert_eq!(error.code(), "ARTIFACT_NOT_FOUND");
    }

    #[test]
    fn test_artifact_missing_is_upload_kind() {
        let error = ReleaseError::ArtifactMissing {
            path: PathBuf::from("dist/myproject-1.2.3.tar.gz"),
        };

        assert_eq!(error.kind(), ErrorKind::Upload);
        assert_eq!(error.exit_code(), 1);
    }

    #[test]
    fn test_upload_error_display_and_actions() {
        let error = ReleaseError::Upload {
            reason: UploadFailure::VersionConflict,
            message: "400 File already exists".to_string(),
            exit_code: Some(1),
        };

        let display = error.to_string();
        assert!(display.contains("version already published"));
        assert!(display.contains("File already exists"));
        assert!(
            error
                .suggested_actions()
                .iter()
                .any(|a| a.contains("new version"))
        );
    }
}
