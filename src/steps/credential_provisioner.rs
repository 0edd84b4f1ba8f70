//! Credential Provisioner - writes the upload client's credential file

use super::write_file_atomic;
use crate::core::error::Result;
use crate::core::types::{CredentialConfig, CredentialFile};
use secrecy::ExposeSecret;
use std::path::{Path, PathBuf};

/// Owner read/write only
const CREDENTIAL_FILE_MODE: u32 = 0o600;

/// Writes a single index-server section to the credential file, replacing
/// whatever was there before.
#[derive(Debug, Clone)]
pub struct CredentialProvisioner {
    path: PathBuf,
}

impl CredentialProvisioner {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub async fn provision(&self, config: &CredentialConfig) -> Result<CredentialFile> {
        let rendered = config.render()?;
        write_file_atomic(
            &self.path,
            rendered.expose_secret().as_bytes(),
            CREDENTIAL_FILE_MODE,
        )
        .await?;

        tracing::info!(
            path = %self.path.display(),
            server = %config.server,
            username = %config.credentials.username(),
            "credential file written"
        );

        Ok(CredentialFile {
            path: self.path.clone(),
            server: config.server.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Credentials;
    use secrecy::SecretString;
    use tempfile::TempDir;

    const SECRET: &str = "pypi-AgEIcHlwaS5vcmcCJDY0";

    fn config() -> CredentialConfig {
        CredentialConfig {
            server: "pypi".to_string(),
            repository_url: None,
            credentials: Credentials::new("ci-bot", SecretString::new(SECRET.into())),
        }
    }

    #[tokio::test]
    async fn test_provision_writes_template() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".pypirc");
        let provisioner = CredentialProvisioner::new(&path);

        let file = provisioner.provision(&config()).await.unwrap();

        assert_eq!(file.path, path);
        assert_eq!(file.server, "pypi");
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            format!(
                "[distutils]\nindex-servers =\n    pypi\n\n[pypi]\nusername = ci-bot\npassword = {}\n",
                SECRET
            )
        );
    }

    #[tokio::test]
    async fn test_provision_overwrites_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".pypirc");
        std::fs::write(
            &path,
            "[distutils]\nindex-servers =\n    pypi\n    private\n\n[private]\nusername = old\npassword = old\n",
        )
        .unwrap();

        CredentialProvisioner::new(&path)
            .provision(&config())
            .await
            .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(!content.contains("[private]"));
        assert!(!content.contains("old"));
        assert_eq!(content.matches("[pypi]").count(), 1);
    }

    #[tokio::test]
    async fn test_provision_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".pypirc");
        let provisioner = CredentialProvisioner::new(&path);

        provisioner.provision(&config()).await.unwrap();
        let first = std::fs::read(&path).unwrap();
        provisioner.provision(&config()).await.unwrap();
        let second = std::fs::read(&path).unwrap();

        assert_eq!(first, second);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_provision_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".pypirc");
        CredentialProvisioner::new(&path)
            .provision(&config())
            .await
            .unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn test_injected_secret_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".pypirc");
        let mut config = config();
        config.credentials = Credentials::new(
            "ci-bot",
            SecretString::new("abc\nrepository = https://evil.example/".into()),
        );

        let err = CredentialProvisioner::new(&path)
            .provision(&config)
            .await
            .unwrap_err();

        assert_eq!(err.code(), "CONFIG_ERROR");
        assert!(!err.to_string().contains("evil.example"));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_unwritable_path_fails_without_leaking_secret() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("no-such-dir").join(".pypirc");

        let err = CredentialProvisioner::new(&path)
            .provision(&config())
            .await
            .unwrap_err();

        assert_eq!(err.code(), "CONFIG_WRITE_ERROR");
        assert!(!err.to_string().contains(SECRET));
        assert!(!format!("{:?}", err).contains(SECRET));
    }
}
