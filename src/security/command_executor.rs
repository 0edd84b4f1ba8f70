//! SafeCommandExecutor: allow-listed external command execution
//!
//! # Security Features
//!
//! - **Allow-list validation**: only pre-approved programs can execute
//! - **No shell**: arguments are passed as a vector, never interpolated
//! - **Working directory validation**: checked before anything runs
//! - **Timeout control**: the child is killed when the timeout elapses
//!
//! # Example
//!
//! ```rust,no_run
//! use release_publisher::SafeCommandExecutor;
//! use std::time::Duration;
//!
//! # async fn run() -> Result<(), release_publisher::CommandError> {
//! let mut executor = SafeCommandExecutor::new(std::env::temp_dir())?;
//! executor.set_timeout(Duration::from_secs(30));
//!
//! let output = executor.execute("twine", &["--version"]).await?;
//! println!("{}", String::from_utf8_lossy(&output.stdout));
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

/// Programs the release pipeline is allowed to run by default.
const ALLOWED_COMMANDS: &[&str] = &["python", "python3", "twine", "pip", "uv"];

/// Errors that can occur during command execution
#[derive(Error, Debug)]
pub enum CommandError {
    /// Command is not in the allowed list
    #[error("Command '{0}' is not in the allowed whitelist")]
    CommandNotAllowed(String),

    /// Empty argv
    #[error("No command given")]
    EmptyCommand,

    /// Working directory does not exist or is not accessible
    #[error("Working directory does not exist: {0}")]
    InvalidWorkingDirectory(PathBuf),

    /// Command could not be spawned (binary not found, permission denied)
    #[error("Command execution failed: {0}")]
    ExecutionFailed(String),

    /// Command exceeded the timeout duration
    #[error("Command timeout after {0:?}")]
    Timeout(Duration),
}

/// Safe command executor with security controls
#[derive(Debug, Clone)]
pub struct SafeCommandExecutor {
    working_dir: PathBuf,
    timeout: Option<Duration>,
    extra_allowed: Vec<String>,
}

impl SafeCommandExecutor {
    /// Create a new executor rooted at `working_dir`, which must exist.
    pub fn new<P: AsRef<Path>>(working_dir: P) -> Result<Self, CommandError> {
        let working_dir = working_dir.as_ref().to_path_buf();

        if !working_dir.is_dir() {
            return Err(CommandError::InvalidWorkingDirectory(working_dir));
        }

        Ok(Self {
            working_dir,
            timeout: None,
            extra_allowed: Vec::new(),
        })
    }

    /// Set command execution timeout.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = Some(timeout);
    }

    /// Permit one more program beyond the built-in allow-list.
    pub fn allow(mut self, command: impl Into<String>) -> Self {
        self.extra_allowed.push(command.into());
        self
    }

    fn is_allowed(&self, command: &str) -> bool {
        ALLOWED_COMMANDS.contains(&command) || self.extra_allowed.iter().any(|c| c == command)
    }

    /// Run `command` with `args` and capture its output.
    ///
    /// A non-zero exit is not an error here; callers inspect `Output::status`.
    pub async fn execute(&self, command: &str, args: &[&str]) -> Result<Output, CommandError> {
        if !self.is_allowed(command) {
            return Err(CommandError::CommandNotAllowed(command.to_string()));
        }

        tracing::debug!(command, ?args, dir = %self.working_dir.display(), "spawning");

        let child = Command::new(command)
            .args(args)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CommandError::ExecutionFailed(format!("{}: {}", command, e)))?;

        let output = child.wait_with_output();
        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, output)
                .await
                .map_err(|_| CommandError::Timeout(limit))?,
            None => output.await,
        };

        output.map_err(|e| CommandError::ExecutionFailed(format!("{}: {}", command, e)))
    }

    /// Run a full argv (`argv[0]` is the program).
    pub async fn execute_argv(&self, argv: &[String]) -> Result<Output, CommandError> {
        let (program, rest) = argv.split_first().ok_or(CommandError::EmptyCommand)?;
        let args: Vec<&str> = rest.iter().map(String::as_str).collect();
        self.execute(program, &args).await
    }
}
