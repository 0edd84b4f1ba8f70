//! Configuration structures for release-publisher
//!
//! `ReleaseConfig` is the file/env/CLI layer where every field is optional.
//! `ReleaseSettings` is what the pipeline runs with once the layers are
//! merged and defaults applied.

use crate::core::error::{ReleaseError, Result};
use crate::core::types::{Credentials, ReleaseTag};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

pub const ENV_RELEASE_TAG: &str = "RELEASE_TAG";
pub const ENV_INDEX_USERNAME: &str = "PACKAGE_INDEX_USERNAME";
pub const ENV_INDEX_SECRET: &str = "PACKAGE_INDEX_SECRET";

pub const DEFAULT_INDEX_SERVER: &str = "pypi";
pub const DEFAULT_VERSION_FILE: &str = "VERSION";
pub const DEFAULT_DIST_DIR: &str = "dist";
pub const DEFAULT_ARCHIVE_EXTENSION: &str = "tar.gz";
pub const DEFAULT_CREDENTIAL_FILE: &str = "~/.pypirc";

/// Root configuration object (`.release-config.yaml`)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ReleaseConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<ProjectConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<IndexConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub commands: Option<CommandsConfig>,
}

/// Project layout
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProjectConfig {
    /// Distribution name (default: `[project].name` from pyproject.toml)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Version marker path, relative to the project root (default: "VERSION")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_file: Option<String>,

    /// Build output directory, relative to the project root (default: "dist")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dist_dir: Option<String>,

    /// Archive extension (default: "tar.gz")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archive_extension: Option<String>,
}

/// Package index target
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct IndexConfig {
    /// Index-server section name (default: "pypi")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,

    /// Upload endpoint written as `repository =` in the section
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository_url: Option<String>,

    /// Credential file path (default: "~/.pypirc")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential_file: Option<String>,
}

/// External tool invocations
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct CommandsConfig {
    /// Packaging command; `{dist_dir}` expands to the output directory
    /// (default: `python setup.py sdist --dist-dir {dist_dir}`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build: Option<Vec<String>>,

    /// Upload command prefix (default: `twine upload`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload: Option<Vec<String>>,

    /// Per-command timeout in seconds (default: none)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

/// Fully resolved settings for one release run
#[derive(Debug, Clone, PartialEq)]
pub struct ReleaseSettings {
    pub project_root: PathBuf,
    pub project_name: String,
    pub version_file: PathBuf,
    pub dist_dir: PathBuf,
    pub archive_extension: String,
    pub index_server: String,
    pub repository_url: Option<String>,
    pub credential_file: PathBuf,
    pub build_command: Vec<String>,
    pub upload_command: Vec<String>,
    pub command_timeout: Option<Duration>,
}

/// `python setup.py sdist --dist-dir {dist_dir}`
pub fn default_build_command() -> Vec<String> {
    ["python", "setup.py", "sdist", "--dist-dir", "{dist_dir}"]
        .map(String::from)
        .to_vec()
}

pub fn default_upload_command() -> Vec<String> {
    vec!["twine".into(), "upload".into()]
}

/// Run-time inputs injected by CI
#[derive(Debug)]
pub struct ReleaseInputs {
    pub tag: ReleaseTag,
    pub credentials: Credentials,
}

impl ReleaseInputs {
    /// Read tag and credentials from an environment map.
    ///
    /// Missing or empty values fail before anything touches the filesystem.
    pub fn from_env(env: &HashMap<String, String>) -> Result<Self> {
        let tag = ReleaseTag::parse(required(env, ENV_RELEASE_TAG)?)?;
        let username = required(env, ENV_INDEX_USERNAME)?;
        let secret = required(env, ENV_INDEX_SECRET)?;

        Ok(Self {
            tag,
            credentials: Credentials::new(username, SecretString::new(secret.into())),
        })
    }
}

fn required<'a>(env: &'a HashMap<String, String>, name: &str) -> Result<&'a str> {
    env.get(name)
        .map(|v| v.as_str())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ReleaseError::MissingInput {
            name: name.to_string(),
        })
}
