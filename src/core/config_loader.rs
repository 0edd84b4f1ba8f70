//! Configuration loader for release-publisher
//!
//! Layers (low to high priority): defaults, `.release-config.yaml` in the
//! project root, environment variables, CLI arguments.

use super::config::*;
use crate::core::error::{ReleaseError, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

/// Configuration file name
pub const CONFIG_FILENAME: &str = ".release-config.yaml";

pub const ENV_PROJECT_NAME: &str = "RELEASE_PROJECT_NAME";
pub const ENV_INDEX_SERVER: &str = "PACKAGE_INDEX_SERVER";
pub const ENV_REPOSITORY_URL: &str = "PACKAGE_INDEX_REPOSITORY_URL";
pub const ENV_CREDENTIAL_FILE: &str = "RELEASE_CREDENTIAL_FILE";

/// Configuration load options
#[derive(Debug, Clone)]
pub struct ConfigLoadOptions {
    /// Project root; relative paths in the config resolve against it
    pub project_path: PathBuf,

    /// CLI arguments (highest priority)
    pub cli_args: Option<ReleaseConfig>,

    /// Environment variables
    pub env: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct PyProject {
    project: Option<PyProjectTable>,
}

#[derive(Debug, Deserialize)]
struct PyProjectTable {
    name: Option<String>,
}

/// Configuration file loader
pub struct ConfigLoader;

impl ConfigLoader {
    pub async fn load(options: ConfigLoadOptions) -> Result<ReleaseSettings> {
        let mut configs: Vec<ReleaseConfig> = Vec::new();

        if let Some(project_config) = Self::load_project_config(&options.project_path).await? {
            configs.push(project_config);
        }

        if let Some(env_config) = Self::load_env_config(&options.env) {
            configs.push(env_config);
        }

        if let Some(cli_config) = options.cli_args {
            configs.push(cli_config);
        }

        let merged = Self::merge_configs(configs);
        Self::resolve(merged, &options.project_path, &options.env).await
    }

    async fn load_project_config(project_path: &Path) -> Result<Option<ReleaseConfig>> {
        let config_path = project_path.join(CONFIG_FILENAME);
        if !config_path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&config_path)
            .await
            .map_err(|e| ReleaseError::Config {
                message: format!("failed to read {}: {}", config_path.display(), e),
            })?;

        let config = serde_yaml::from_str(&content).map_err(|e| ReleaseError::Config {
            message: format!("failed to parse {}: {}", config_path.display(), e),
        })?;

        tracing::debug!(path = %config_path.display(), "loaded project config");
        Ok(Some(config))
    }

    fn load_env_config(env: &HashMap<String, String>) -> Option<ReleaseConfig> {
        let get = |key: &str| env.get(key).filter(|v| !v.is_empty()).cloned();
        let mut config = ReleaseConfig::default();
        let mut has_changes = false;

        if let Some(name) = get(ENV_PROJECT_NAME) {
            config.project = Some(ProjectConfig {
                name: Some(name),
                ..Default::default()
            });
            has_changes = true;
        }

        let index = IndexConfig {
            server: get(ENV_INDEX_SERVER),
            repository_url: get(ENV_REPOSITORY_URL),
            credential_file: get(ENV_CREDENTIAL_FILE),
        };
        if index != IndexConfig::default() {
            config.index = Some(index);
            has_changes = true;
        }

        if has_changes { Some(config) } else { None }
    }

    fn merge_configs(configs: Vec<ReleaseConfig>) -> ReleaseConfig {
        let mut result = ReleaseConfig::default();

        for config in configs {
            Self::merge_into(&mut result, config);
        }

        result
    }

    /// Field-wise merge; a value set in `source` wins
    fn merge_into(target: &mut ReleaseConfig, source: ReleaseConfig) {
        if let Some(source_project) = source.project {
            let target_project = target.project.get_or_insert_with(Default::default);
            if source_project.name.is_some() {
                target_project.name = source_project.name;
            }
            if source_project.version_file.is_some() {
                target_project.version_file = source_project.version_file;
            }
            if source_project.dist_dir.is_some() {
                target_project.dist_dir = source_project.dist_dir;
            }
            if source_project.archive_extension.is_some() {
                target_project.archive_extension = source_project.archive_extension;
            }
        }

        if let Some(source_index) = source.index {
            let target_index = target.index.get_or_insert_with(Default::default);
            if source_index.server.is_some() {
                target_index.server = source_index.server;
            }
            if source_index.repository_url.is_some() {
                target_index.repository_url = source_index.repository_url;
            }
            if source_index.credential_file.is_some() {
                target_index.credential_file = source_index.credential_file;
            }
        }

        if let Some(source_commands) = source.commands {
            let target_commands = target.commands.get_or_insert_with(Default::default);
            if source_commands.build.is_some() {
                target_commands.build = source_commands.build;
            }
            if source_commands.upload.is_some() {
                target_commands.upload = source_commands.upload;
            }
            if source_commands.timeout_secs.is_some() {
                target_commands.timeout_secs = source_commands.timeout_secs;
            }
        }
    }

    async fn resolve(
        config: ReleaseConfig,
        project_root: &Path,
        env: &HashMap<String, String>,
    ) -> Result<ReleaseSettings> {
        let project = config.project.unwrap_or_default();
        let index = config.index.unwrap_or_default();
        let commands = config.commands.unwrap_or_default();

        let project_name = match project.name {
            Some(name) => name,
            None => Self::detect_project_name(project_root).await?,
        };

        let build_command = commands.build.unwrap_or_else(default_build_command);
        let upload_command = commands.upload.unwrap_or_else(default_upload_command);
        if build_command.is_empty() || upload_command.is_empty() {
            return Err(ReleaseError::Config {
                message: "build and upload commands must not be empty".to_string(),
            });
        }

        let credential_file = expand_home(
            index
                .credential_file
                .as_deref()
                .unwrap_or(DEFAULT_CREDENTIAL_FILE),
            env,
        )?;

        Ok(ReleaseSettings {
            project_root: project_root.to_path_buf(),
            project_name,
            version_file: project_root.join(
                project
                    .version_file
                    .as_deref()
                    .unwrap_or(DEFAULT_VERSION_FILE),
            ),
            dist_dir: project_root.join(project.dist_dir.as_deref().unwrap_or(DEFAULT_DIST_DIR)),
            archive_extension: project
                .archive_extension
                .unwrap_or_else(|| DEFAULT_ARCHIVE_EXTENSION.to_string()),
            index_server: index
                .server
                .unwrap_or_else(|| DEFAULT_INDEX_SERVER.to_string()),
            repository_url: index.repository_url,
            credential_file,
            build_command,
            upload_command,
            command_timeout: commands.timeout_secs.map(Duration::from_secs),
        })
    }

    /// Read `[project].name` from pyproject.toml
    async fn detect_project_name(project_root: &Path) -> Result<String> {
        let pyproject_path = project_root.join("pyproject.toml");
        let missing = || ReleaseError::Config {
            message: format!(
                "project name not configured and not found in {}",
                pyproject_path.display()
            ),
        };

        let content = fs::read_to_string(&pyproject_path)
            .await
            .map_err(|_| missing())?;
        let pyproject: PyProject = toml::from_str(&content).map_err(|e| ReleaseError::Config {
            message: format!("failed to parse {}: {}", pyproject_path.display(), e),
        })?;

        pyproject
            .project
            .and_then(|p| p.name)
            .filter(|n| !n.is_empty())
            .ok_or_else(missing)
    }
}

/// Expand a leading `~/` using `HOME` from the environment map
fn expand_home(path: &str, env: &HashMap<String, String>) -> Result<PathBuf> {
    match path.strip_prefix("~/") {
        Some(rest) => {
            let home = env
                .get("HOME")
                .filter(|h| !h.is_empty())
                .ok_or_else(|| ReleaseError::Config {
                    message: "HOME environment variable not set".to_string(),
                })?;
            Ok(PathBuf::from(home).join(rest))
        }
        None => Ok(PathBuf::from(path)),
    }
}
