//! Release Publisher CLI
//!
//! Publishes a tagged Python source distribution from CI

use anyhow::{Context, Result};
use clap::Parser;
use release_publisher::{
    CommandsConfig, ConfigLoadOptions, ConfigLoader, IndexConfig, ProjectConfig, ReleaseConfig,
    ReleaseError, ReleaseInputs, ReleasePipeline, SecretMasker,
};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Publish a tagged release to a Python package index
#[derive(Parser)]
#[command(name = "release-publisher")]
#[command(version)]
#[command(about = "Publish a tagged release to a Python package index", long_about = None)]
struct Cli {
    /// Project path (defaults to current directory)
    #[arg(value_name = "PROJECT_PATH")]
    project_path: Option<PathBuf>,

    /// Distribution name used in the archive file name
    #[arg(long)]
    project_name: Option<String>,

    /// Index section name written to the credential file
    #[arg(long)]
    index_server: Option<String>,

    /// Where to write the credential file
    #[arg(long)]
    credential_file: Option<String>,

    /// Kill the build or upload tool after this many seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Write a JSON run report to this path
    #[arg(long, value_name = "PATH")]
    report: Option<PathBuf>,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(exit_code) => process::exit(exit_code),
        Err(e) => {
            eprintln!("\n❌ Error");
            eprintln!("{:#}", e);
            process::exit(1);
        }
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("release_publisher={level}")));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}

async fn run(cli: Cli) -> Result<i32> {
    println!("\n📦 release-publisher\n");

    let env: HashMap<String, String> = std::env::vars().collect();

    // Inputs are checked before anything touches the filesystem.
    let inputs = match ReleaseInputs::from_env(&env) {
        Ok(inputs) => inputs,
        Err(e) => return Ok(report_error(&e)),
    };

    let project_path = cli.project_path.clone().unwrap_or_else(|| PathBuf::from("."));
    let settings = match ConfigLoader::load(ConfigLoadOptions {
        project_path,
        cli_args: Some(cli_overrides(&cli)),
        env,
    })
    .await
    {
        Ok(settings) => settings,
        Err(e) => return Ok(report_error(&e)),
    };

    let mut masker = SecretMasker::new();
    masker.register(inputs.credentials.secret());

    let mut pipeline = match ReleasePipeline::from_settings(settings, Arc::new(masker)) {
        Ok(pipeline) => pipeline,
        Err(e) => return Ok(report_error(&e)),
    };

    println!("🏷️  Releasing {} to {}", inputs.tag, pipeline.report().index_server);

    let exit_code = match pipeline.run(inputs).await {
        Ok(receipt) => {
            println!(
                "\n✅ Published {} to {}",
                receipt.artifact.display(),
                receipt.server
            );
            0
        }
        Err(e) => {
            println!("\n📜 {}", pipeline.history());
            report_error(&e)
        }
    };

    // The release outcome decides the exit code, not the report.
    if let Some(path) = &cli.report {
        emit_report(path, &pipeline.report()).await;
    }

    Ok(exit_code)
}

fn cli_overrides(cli: &Cli) -> ReleaseConfig {
    ReleaseConfig {
        project: cli.project_name.clone().map(|name| ProjectConfig {
            name: Some(name),
            ..Default::default()
        }),
        index: (cli.index_server.is_some() || cli.credential_file.is_some()).then(|| {
            IndexConfig {
                server: cli.index_server.clone(),
                credential_file: cli.credential_file.clone(),
                ..Default::default()
            }
        }),
        commands: cli.timeout_secs.map(|secs| CommandsConfig {
            timeout_secs: Some(secs),
            ..Default::default()
        }),
    }
}

fn report_error(error: &ReleaseError) -> i32 {
    eprintln!("\n❌ Release failed [{}]", error.code());
    eprintln!("{}", error);

    let actions = error.suggested_actions();
    if !actions.is_empty() {
        eprintln!("\n💡 Suggested actions:");
        for action in actions {
            eprintln!("  - {}", action);
        }
    }

    error.exit_code()
}

async fn emit_report<T: Serialize>(path: &Path, report: &T) -> bool {
    match write_report(path, report).await {
        Ok(()) => {
            println!("📝 Report written to {}", path.display());
            true
        }
        Err(e) => {
            eprintln!("⚠️  {:#}", e);
            false
        }
    }
}

async fn write_report<T: Serialize>(path: &Path, report: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    tokio::fs::write(path, json)
        .await
        .with_context(|| format!("failed to write report to {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides_only_set_given_flags() {
        let cli = Cli::parse_from(["release-publisher", "--index-server", "testpypi"]);
        let overrides = cli_overrides(&cli);

        assert!(overrides.project.is_none());
        assert!(overrides.commands.is_none());
        let index = overrides.index.unwrap();
        assert_eq!(index.server.as_deref(), Some("testpypi"));
        assert!(index.credential_file.is_none());
    }

    #[tokio::test]
    async fn test_unwritable_report_only_warns() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("missing").join("report.json");

        let written = emit_report(&path, &serde_json::json!({ "success": true })).await;

        assert!(!written);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_report_written_as_json() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("report.json");

        assert!(emit_report(&path, &serde_json::json!({ "exitCode": 3 })).await);

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["exitCode"], 3);
    }

    #[test]
    fn test_cli_parses_all_flags() {
        let cli = Cli::parse_from([
            "release-publisher",
            "./pkg",
            "--project-name",
            "myproject",
            "--credential-file",
            "/tmp/.pypirc",
            "--timeout-secs",
            "600",
            "--report",
            "out.json",
            "-vv",
        ]);

        assert_eq!(cli.project_path, Some(PathBuf::from("./pkg")));
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.report, Some(PathBuf::from("out.json")));
        let overrides = cli_overrides(&cli);
        assert_eq!(
            overrides.project.unwrap().name.as_deref(),
            Some("myproject")
        );
        assert_eq!(overrides.commands.unwrap().timeout_secs, Some(600));
    }
}
