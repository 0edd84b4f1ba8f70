//! Release Pipeline - runs the four release steps in order
//!
//! Credentials → version marker → build → upload. The first error stops the
//! run; nothing written by an earlier step is cleaned up.

use crate::core::config::{ReleaseInputs, ReleaseSettings};
use crate::core::error::{ReleaseError, Result};
use crate::core::state_machine::{
    InvalidTransition, ReleaseState, ReleaseStateMachine, StateTransition,
};
use crate::core::types::{CredentialConfig, DistributionArtifact, ReleaseTag};
use crate::security::{SafeCommandExecutor, SecretMasker};
use crate::steps::{
    CommandPackageBuilder, CredentialProvisioner, DistributionBuilder, PackageBuilder,
    PublishReceipt, Publisher, TwineUploadClient, UploadClient, VersionStamper,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

impl From<InvalidTransition> for ReleaseError {
    fn from(e: InvalidTransition) -> Self {
        ReleaseError::Config {
            message: e.to_string(),
        }
    }
}

/// Summary of one run, written by `--report`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseReport {
    pub run_id: Uuid,
    pub success: bool,
    pub state: ReleaseState,
    pub project: String,
    pub index_server: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<ReleaseTag>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt: Option<PublishReceipt>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub exit_code: i32,
    pub duration_ms: i64,
    pub transitions: Vec<StateTransition>,
}

#[derive(Debug)]
struct Failure {
    code: &'static str,
    exit_code: i32,
}

/// Single-use driver for one release run
pub struct ReleasePipeline {
    run_id: Uuid,
    settings: ReleaseSettings,
    provisioner: CredentialProvisioner,
    stamper: VersionStamper,
    builder: DistributionBuilder,
    publisher: Publisher,
    state_machine: ReleaseStateMachine,
    tag: Option<ReleaseTag>,
    artifact: Option<DistributionArtifact>,
    receipt: Option<PublishReceipt>,
    failure: Option<Failure>,
}

impl ReleasePipeline {
    /// Pipeline with explicit tool implementations
    pub fn new(
        settings: ReleaseSettings,
        package_builder: Box<dyn PackageBuilder>,
        upload_client: Box<dyn UploadClient>,
    ) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            provisioner: CredentialProvisioner::new(&settings.credential_file),
            stamper: VersionStamper::new(&settings.version_file),
            builder: DistributionBuilder::new(
                package_builder,
                settings.project_root.clone(),
                settings.dist_dir.clone(),
                settings.project_name.clone(),
                settings.archive_extension.clone(),
            ),
            publisher: Publisher::new(upload_client),
            settings,
            state_machine: ReleaseStateMachine::new(),
            tag: None,
            artifact: None,
            receipt: None,
            failure: None,
        }
    }

    /// Pipeline running the configured build and upload commands.
    ///
    /// `masker` must already know the secret so tool output is scrubbed.
    pub fn from_settings(settings: ReleaseSettings, masker: Arc<SecretMasker>) -> Result<Self> {
        let mut executor =
            SafeCommandExecutor::new(&settings.project_root).map_err(|e| ReleaseError::Config {
                message: e.to_string(),
            })?;
        if let Some(timeout) = settings.command_timeout {
            executor.set_timeout(timeout);
        }

        let package_builder = CommandPackageBuilder::new(
            executor.clone(),
            settings.build_command.clone(),
            masker.clone(),
        );
        let upload_client =
            TwineUploadClient::new(executor, settings.upload_command.clone(), masker);

        Ok(Self::new(
            settings,
            Box::new(package_builder),
            Box::new(upload_client),
        ))
    }

    pub fn state(&self) -> ReleaseState {
        self.state_machine.state()
    }

    /// Run all four steps. On error the pipeline ends in `Failed`.
    pub async fn run(&mut self, inputs: ReleaseInputs) -> Result<PublishReceipt> {
        if self.state_machine.state() != ReleaseState::Start {
            return Err(ReleaseError::Config {
                message: "a release pipeline can only run once".to_string(),
            });
        }

        let span = tracing::info_span!(
            "release",
            run_id = %self.run_id,
            tag = %inputs.tag,
            project = %self.settings.project_name
        );
        let result = self.run_steps(inputs).instrument(span).await;

        if let Err(e) = &result {
            tracing::error!(code = e.code(), error = %e, "release failed");
            self.failure = Some(Failure {
                code: e.code(),
                exit_code: e.exit_code(),
            });
            self.state_machine.fail(e.to_string())?;
        }

        result
    }

    async fn run_steps(&mut self, inputs: ReleaseInputs) -> Result<PublishReceipt> {
        let ReleaseInputs { tag, credentials } = inputs;
        self.tag = Some(tag.clone());

        let credential_config = CredentialConfig {
            server: self.settings.index_server.clone(),
            repository_url: self.settings.repository_url.clone(),
            credentials,
        };
        let credential_file = self.provisioner.provision(&credential_config).await?;
        drop(credential_config);
        self.state_machine.advance(ReleaseState::CredentialsWritten)?;

        let marker = self.stamper.stamp(&tag).await?;
        self.state_machine.advance(ReleaseState::VersionStamped)?;

        let artifact = self.builder.build(&marker).await?;
        self.artifact = Some(artifact.clone());
        self.state_machine.advance(ReleaseState::Built)?;

        let receipt = self.publisher.publish(&artifact, &credential_file).await?;
        self.receipt = Some(receipt.clone());
        self.state_machine.advance(ReleaseState::Published)?;

        Ok(receipt)
    }

    pub fn report(&self) -> ReleaseReport {
        let state = self.state_machine.state();
        ReleaseReport {
            run_id: self.run_id,
            success: state == ReleaseState::Published,
            state,
            project: self.settings.project_name.clone(),
            index_server: self.settings.index_server.clone(),
            tag: self.tag.clone(),
            artifact: self.artifact.as_ref().map(|a| a.path.clone()),
            receipt: self.receipt.clone(),
            error_code: self.failure.as_ref().map(|f| f.code),
            error: self.state_machine.last_error().map(str::to_string),
            exit_code: self.failure.as_ref().map(|f| f.exit_code).unwrap_or(0),
            duration_ms: self.state_machine.elapsed_ms(),
            transitions: self.state_machine.transitions().to_vec(),
        }
    }

    pub fn history(&self) -> String {
        self.state_machine.history()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{default_build_command, default_upload_command};
    use crate::core::error::UploadFailure;
    use crate::core::types::{CredentialFile, Credentials};
    use crate::steps::ToolOutput;
    use async_trait::async_trait;
    use secrecy::SecretString;
    use std::io::Write;
    use std::path::Path;
    use std::sync::Mutex;
    use tempfile::TempDir;

    const SECRET: &str = "pypi-AgENdGVzdC5weXBpLm9yZwIk";

    struct FakeSdist;

    #[async_trait]
    impl PackageBuilder for FakeSdist {
        fn name(&self) -> &str {
            "fake-sdist"
        }

        async fn build(&self, project_root: &Path, dist_dir: &Path) -> Result<ToolOutput> {
            let version = std::fs::read_to_string(project_root.join("VERSION")).unwrap();
            std::fs::create_dir_all(dist_dir).unwrap();
            std::fs::write(
                dist_dir.join(format!("myproject-{}.tar.gz", version.trim())),
                b"archive",
            )
            .unwrap();
            Ok(ToolOutput::default())
        }
    }

    struct FakeIndex {
        uploads: Arc<Mutex<Vec<PathBuf>>>,
        reject_duplicate: bool,
    }

    #[async_trait]
    impl UploadClient for FakeIndex {
        fn name(&self) -> &str {
            "fake-index"
        }

        async fn upload(
            &self,
            artifact: &DistributionArtifact,
            _: &CredentialFile,
        ) -> Result<ToolOutput> {
            self.uploads.lock().unwrap().push(artifact.path.clone());
            if self.reject_duplicate {
                return Err(ReleaseError::Upload {
                    reason: UploadFailure::VersionConflict,
                    message: "HTTPError: 400 Bad Request: File already exists".to_string(),
                    exit_code: Some(1),
                });
            }
            Ok(ToolOutput::default())
        }
    }

    fn settings(dir: &TempDir) -> ReleaseSettings {
        ReleaseSettings {
            project_root: dir.path().to_path_buf(),
            project_name: "myproject".to_string(),
            version_file: dir.path().join("VERSION"),
            dist_dir: dir.path().join("dist"),
            archive_extension: "tar.gz".to_string(),
            index_server: "pypi".to_string(),
            repository_url: None,
            credential_file: dir.path().join(".pypirc"),
            build_command: default_build_command(),
            upload_command: default_upload_command(),
            command_timeout: None,
        }
    }

    fn inputs(tag: &str) -> ReleaseInputs {
        ReleaseInputs {
            tag: ReleaseTag::parse(tag).unwrap(),
            credentials: Credentials::new("ci-bot", SecretString::new(SECRET.into())),
        }
    }

    fn pipeline(
        dir: &TempDir,
        reject_duplicate: bool,
    ) -> (ReleasePipeline, Arc<Mutex<Vec<PathBuf>>>) {
        let uploads = Arc::new(Mutex::new(Vec::new()));
        let index = FakeIndex {
            uploads: uploads.clone(),
            reject_duplicate,
        };
        (
            ReleasePipeline::new(settings(dir), Box::new(FakeSdist), Box::new(index)),
            uploads,
        )
    }

    #[tokio::test]
    async fn test_successful_release() {
        let dir = TempDir::new().unwrap();
        let (mut pipeline, uploads) = pipeline(&dir, false);

        let receipt = pipeline.run(inputs("1.2.3")).await.unwrap();

        let expected = dir.path().join("dist/myproject-1.2.3.tar.gz");
        assert_eq!(receipt.artifact, expected);
        assert!(expected.is_file());
        assert_eq!(*uploads.lock().unwrap(), vec![expected]);
        assert_eq!(pipeline.state(), ReleaseState::Published);

        let report = pipeline.report();
        assert!(report.success);
        assert_eq!(report.exit_code, 0);
        assert_eq!(report.transitions.len(), 4);
    }

    #[tokio::test]
    async fn test_rejected_upload_keeps_earlier_files() {
        let dir = TempDir::new().unwrap();
        let (mut pipeline, uploads) = pipeline(&dir, true);

        let err = pipeline.run(inputs("1.2.3")).await.unwrap_err();

        assert_eq!(err.code(), "UPLOAD_ERROR");
        assert_eq!(err.exit_code(), 1);
        assert_eq!(uploads.lock().unwrap().len(), 1);
        assert!(dir.path().join(".pypirc").is_file());
        assert_eq!(
            std::fs::read_to_string(dir.path().join("VERSION")).unwrap(),
            "1.2.3\n"
        );

        let report = pipeline.report();
        assert!(!report.success);
        assert_eq!(report.state, ReleaseState::Failed);
        assert_eq!(report.error_code, Some("UPLOAD_ERROR"));
        assert_eq!(report.exit_code, 1);
        assert!(pipeline.history().contains("Built → Failed"));
    }

    #[tokio::test]
    async fn test_credential_write_failure_stops_before_stamp() {
        let dir = TempDir::new().unwrap();
        let mut settings = settings(&dir);
        settings.credential_file = dir.path().join("missing-dir").join(".pypirc");
        let uploads = Arc::new(Mutex::new(Vec::new()));
        let index = FakeIndex {
            uploads: uploads.clone(),
            reject_duplicate: false,
        };
        let mut pipeline = ReleasePipeline::new(settings, Box::new(FakeSdist), Box::new(index));

        let err = pipeline.run(inputs("1.2.3")).await.unwrap_err();

        assert_eq!(err.code(), "CONFIG_WRITE_ERROR");
        assert!(!dir.path().join("VERSION").exists());
        assert!(!dir.path().join("dist").exists());
        assert!(uploads.lock().unwrap().is_empty());
        assert!(pipeline.history().contains("Start → Failed"));
    }

    #[tokio::test]
    async fn test_pipeline_is_single_use() {
        let dir = TempDir::new().unwrap();
        let (mut pipeline, uploads) = pipeline(&dir, true);

        pipeline.run(inputs("1.2.3")).await.unwrap_err();
        let err = pipeline.run(inputs("1.2.3")).await.unwrap_err();

        assert_eq!(err.code(), "CONFIG_ERROR");
        assert_eq!(uploads.lock().unwrap().len(), 1);
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_secret_never_logged() {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let dir = TempDir::new().unwrap();
        let (mut pipeline, _) = pipeline(&dir, true);
        let err = pipeline.run(inputs("1.2.3")).await.unwrap_err();

        let captured = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert!(captured.contains("credential file written"));
        assert!(captured.contains("release failed"));
        assert!(!captured.contains(SECRET));
        assert!(!err.to_string().contains(SECRET));
        assert!(
            std::fs::read_to_string(dir.path().join(".pypirc"))
                .unwrap()
                .contains(SECRET)
        );
    }
}
