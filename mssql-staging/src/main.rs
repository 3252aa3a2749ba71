//! mssql-staging - Main entry point
//!
//! One host operation per invocation; the result is printed to stdout as JSON.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use mssql_staging::config::DatabaseRole;
use mssql_staging::lifecycle::{StagingController, VirtualController};
use mssql_staging::manifest::SnapshotManifest;
use mssql_staging::{utils, Config, EngineError, OperationContext};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
    /// Restore the newest full backup into the staging database
    Resync,
    /// Restore the next backup newer than the last one applied
    Snapshot,
    /// Print the snapshot manifest of the staging or virtual database
    PostSnapshot,
    /// Re-create a stopped staging database in standby
    StartStaging,
    /// Save the staging file list and detach it
    StopStaging,
    /// Print ACTIVE or INACTIVE
    Status,
    /// Create a virtual database from a snapshot manifest
    Provision {
        #[arg(short, long, value_name = "FILE")]
        manifest: PathBuf,

        /// Mount path holding the snapshot files (defaults to the configured one)
        #[arg(long)]
        mount_path: Option<PathBuf>,
    },
    /// Attach the files of a virtual database after a rewind
    Reattach {
        #[arg(short, long, value_name = "FILE")]
        manifest: PathBuf,
    },
    /// Detach the virtual database from the instance
    Unconfigure,
    /// Bring the virtual database online
    Start,
    /// Take the virtual database offline
    Stop,
}

impl Command {
    /// Role the configured database must have, if the command is role specific.
    fn required_role(&self) -> Option<DatabaseRole> {
        match self {
            Command::Resync | Command::Snapshot | Command::StartStaging | Command::StopStaging => {
                Some(DatabaseRole::Staging)
            }
            Command::Provision { .. }
            | Command::Reattach { .. }
            | Command::Unconfigure
            | Command::Start
            | Command::Stop => Some(DatabaseRole::Virtual),
            Command::PostSnapshot | Command::Status => None,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = Config::from_file(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;

    // Initialize logging
    let log_level = args.log_level.as_deref().unwrap_or(&config.log.level);
    utils::logger::init(log_level)?;

    tracing::info!(
        database = %config.database.name,
        role = ?config.database.role,
        command = ?args.command,
        "Starting mssql-staging v{}",
        env!("CARGO_PKG_VERSION")
    );

    if let Some(role) = args.command.required_role() {
        if role != config.database.role {
            bail!(
                "command {:?} needs a {:?} database, configured role is {:?}",
                args.command,
                role,
                config.database.role
            );
        }
    }

    let command = args.command.clone();
    let outcome = tokio::task::spawn_blocking(move || execute(config, command)).await?;

    match outcome {
        Ok(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }
        Err(e) => {
            tracing::error!(error = %e, action = e.action(), "Operation failed");
            let report = json!({
                "error": e.to_string(),
                "action": e.action(),
                "output": e.output().map(|o| o.to_string()),
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
            std::process::exit(1);
        }
    }
}

/// Run one operation on the blocking pool.
fn execute(config: Config, command: Command) -> mssql_staging::Result<Value> {
    let role = config.database.role;
    let ctx = OperationContext::connect(config)?;

    let value = match command {
        Command::Resync => json!(StagingController::new(ctx).resync()?),
        Command::Snapshot => json!(StagingController::new(ctx).incremental()?),
        Command::PostSnapshot => match role {
            DatabaseRole::Staging => json!(StagingController::new(ctx).capture_manifest()),
            DatabaseRole::Virtual => json!(VirtualController::new(ctx).capture_manifest()),
        },
        Command::StartStaging => {
            StagingController::new(ctx).start_staging()?;
            json!({ "started": true })
        }
        Command::StopStaging => {
            StagingController::new(ctx).stop_staging()?;
            json!({ "stopped": true })
        }
        Command::Status => match role {
            DatabaseRole::Staging => {
                let staging = StagingController::new(ctx);
                let state = staging
                    .state()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|_| "unknown".to_string());
                json!({ "status": staging.status(), "state": state })
            }
            DatabaseRole::Virtual => json!({ "status": VirtualController::new(ctx).status() }),
        },
        Command::Provision {
            manifest,
            mount_path,
        } => {
            let snapshot = read_manifest(&manifest)?;
            let mount_path = mount_path.unwrap_or_else(|| ctx.layout().mount_path.clone());
            VirtualController::new(ctx.clone()).provision(&snapshot, &mount_path)?;
            json!({ "database": ctx.target_database() })
        }
        Command::Reattach { manifest } => {
            let snapshot = read_manifest(&manifest)?;
            VirtualController::new(ctx.clone()).reattach(&snapshot)?;
            json!({ "database": ctx.target_database() })
        }
        Command::Unconfigure => {
            VirtualController::new(ctx).unconfigure()?;
            json!({ "detached": true })
        }
        Command::Start => {
            VirtualController::new(ctx).start()?;
            json!({ "status": "ONLINE" })
        }
        Command::Stop => {
            VirtualController::new(ctx).stop()?;
            json!({ "status": "OFFLINE" })
        }
    };
    Ok(value)
}

fn read_manifest(path: &Path) -> mssql_staging::Result<SnapshotManifest> {
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(EngineError::from)
}
