// src/main.rs
//! SSH audit log tool
//!
//! Inspects audit logs written by the library: decodes binary audit logs,
//! lists a local audit log directory and checks configuration files.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sshaudit::observability::init_tracing;
use sshaudit::recording::decoder::BinaryDecoder;
use sshaudit::recording::Decoder;
use sshaudit::storage::{FileStorage, ReadableStorage};
use sshaudit::utils::config::FileConfig;
use sshaudit::AuditConfig;
use std::path::PathBuf;
use tracing::{error, info};

/// Inspect SSH audit logs
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the events of a binary audit log as JSON lines
    Decode {
        /// Audit log file
        file: PathBuf,
    },
    /// List the audit logs in a local audit log directory
    List {
        /// Audit log directory
        directory: PathBuf,
    },
    /// Load and validate a configuration file
    CheckConfig {
        /// Configuration file (YAML, TOML or JSON)
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs)?;

    match cli.command {
        Command::Decode { file } => decode(file).await,
        Command::List { directory } => list(directory).await,
        Command::CheckConfig { file } => check_config(file),
    }
}

async fn decode(path: PathBuf) -> Result<()> {
    let file = std::fs::File::open(&path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let (mut events, mut errors) = BinaryDecoder::new().decode(Box::new(file));

    let mut decoded = 0usize;
    let mut failed = 0usize;
    let mut events_open = true;
    let mut errors_open = true;
    while events_open || errors_open {
        tokio::select! {
            event = events.recv(), if events_open => match event {
                Some(event) => {
                    let mut line = serde_json::to_value(event.to_record()?)?;
                    line["typeName"] = event.event_type.name().into();
                    println!("{}", line);
                    decoded += 1;
                }
                None => events_open = false,
            },
            failure = errors.recv(), if errors_open => match failure {
                Some(e) => {
                    error!(file = %path.display(), error = %e, "Failed to decode audit log record");
                    failed += 1;
                }
                None => errors_open = false,
            },
        }
    }

    info!(events = decoded, errors = failed, "Audit log decoded");
    if failed > 0 {
        anyhow::bail!("{} record(s) could not be decoded", failed);
    }
    Ok(())
}

async fn list(directory: PathBuf) -> Result<()> {
    let storage = FileStorage::new(&FileConfig { directory })?;
    let (mut entries, mut errors) = storage.list();

    while let Some(entry) = entries.recv().await {
        println!("{}", entry.name);
    }
    let mut failed = false;
    while let Some(e) = errors.recv().await {
        error!(error = %e, "Failed to list audit logs");
        failed = true;
    }
    if failed {
        anyhow::bail!("listing was incomplete");
    }
    Ok(())
}

fn check_config(path: PathBuf) -> Result<()> {
    let config = AuditConfig::load(Some(&path))
        .with_context(|| format!("failed to load {}", path.display()))?;
    config.validate()?;
    info!(
        format = ?config.format,
        storage = ?config.storage,
        "Configuration is valid"
    );
    Ok(())
}
