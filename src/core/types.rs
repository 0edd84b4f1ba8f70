//! Typed values handed from one pipeline step to the next

use crate::core::error::{ReleaseError, Result};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// Release identifier taken verbatim from the source-control tag.
///
/// The tag ends up as file content and as part of a file name, so anything
/// that could escape the target directory or corrupt the marker is refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ReleaseTag(String);

impl ReleaseTag {
    pub fn parse(raw: &str) -> Result<Self> {
        let invalid = |reason: &str| ReleaseError::InvalidTag {
            tag: raw.to_string(),
            reason: reason.to_string(),
        };

        if raw.is_empty() {
            return Err(invalid("tag is empty"));
        }
        if raw == "." || raw == ".." {
            return Err(invalid("tag is a relative path component"));
        }
        if raw.contains(['/', '\\']) {
            return Err(invalid("tag contains a path separator"));
        }
        if raw.contains([':', '*', '?', '"', '<', '>', '|']) {
            return Err(invalid("tag contains a character not allowed in file names"));
        }
        if raw.contains('\0') {
            return Err(invalid("tag contains a NUL byte"));
        }
        if raw.chars().any(|c| c.is_control() || c.is_whitespace()) {
            return Err(invalid("tag contains whitespace or control characters"));
        }

        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReleaseTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Package index login. The secret is redacted from `Debug` output.
#[derive(Debug)]
pub struct Credentials {
    username: String,
    secret: SecretString,
}

impl Credentials {
    pub fn new(username: impl Into<String>, secret: SecretString) -> Self {
        Self {
            username: username.into(),
            secret,
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn secret(&self) -> &SecretString {
        &self.secret
    }
}

/// One index-server section of the upload client's credential file
#[derive(Debug)]
pub struct CredentialConfig {
    pub server: String,
    pub repository_url: Option<String>,
    pub credentials: Credentials,
}

impl CredentialConfig {
    /// Render the `.pypirc` layout. The result holds the secret, so it stays
    /// wrapped until the moment it is written.
    ///
    /// Values that would break out of their line or section are refused.
    pub fn render(&self) -> Result<SecretString> {
        self.validate()?;

        let mut out = String::new();
        out.push_str("[distutils]\n");
        out.push_str("index-servers =\n");
        out.push_str(&format!("    {}\n", self.server));
        out.push('\n');
        out.push_str(&format!("[{}]\n", self.server));
        if let Some(url) = &self.repository_url {
            out.push_str(&format!("repository = {}\n", url));
        }
        out.push_str(&format!("username = {}\n", self.credentials.username));
        out.push_str(&format!(
            "password = {}\n",
            self.credentials.secret.expose_secret()
        ));
        Ok(SecretString::new(out.into()))
    }

    fn validate(&self) -> Result<()> {
        let invalid = |message: &str| {
            Err(ReleaseError::Config {
                message: message.to_string(),
            })
        };

        if self.server.trim().is_empty() {
            return invalid("index server name is empty");
        }
        if self.server.contains(['[', ']']) || breaks_line(&self.server) {
            return invalid("index server name contains brackets or a line break");
        }
        if self.repository_url.as_deref().is_some_and(breaks_line) {
            return invalid("repository URL contains a line break");
        }
        if breaks_line(&self.credentials.username) {
            return invalid("index username contains a line break");
        }
        // The message names the field only; the value is the secret.
        if breaks_line(self.credentials.secret.expose_secret()) {
            return invalid("index secret contains a line break");
        }
        Ok(())
    }
}

fn breaks_line(value: &str) -> bool {
    value.contains(['\r', '\n', '\0'])
}

/// Where the credential file was written and which section to upload with
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CredentialFile {
    pub path: PathBuf,
    pub server: String,
}

/// Source distribution produced by the build step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DistributionArtifact {
    pub path: PathBuf,
    pub file_name: String,
}

impl DistributionArtifact {
    /// `{dist_dir}/{project}-{tag}.{extension}`
    pub fn derive(dist_dir: &Path, project: &str, tag: &ReleaseTag, extension: &str) -> Self {
        let file_name = format!("{}-{}.{}", project, tag, extension);
        Self {
            path: dist_dir.join(&file_name),
            file_name,
        }
    }
}
