//! Custom error types for the staging engine.

use crate::executor::CommandOutput;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("SSH error: {0}")]
    Ssh(#[from] ssh2::Error),

    /// A remote command returned a non-zero exit code and has not been
    /// attributed to an operation yet.
    #[error("Command failed with exit code {}", .0.exit_code)]
    CommandFailed(CommandOutput),

    #[error("{message}")]
    CatalogRead {
        message: String,
        output: Option<CommandOutput>,
    },

    #[error("No backup found in {location}")]
    NoBackupFound { location: String },

    #[error("No new backup found since {since}")]
    NoNewBackupFound { since: String },

    #[error("{message}")]
    RestoreCommand {
        message: String,
        action: &'static str,
        output: CommandOutput,
    },

    #[error("Unknown file type '{code}' for file {logical_name}")]
    UnknownFileType { code: String, logical_name: String },

    #[error("Invalid file manifest: {0}")]
    InvalidManifest(String),

    #[error("Invalid identifier or literal {value:?}: {reason}")]
    InvalidIdentifier { value: String, reason: &'static str },

    #[error("Database {database} is {actual}, expected {expected}")]
    InvalidState {
        database: String,
        expected: &'static str,
        actual: String,
    },

    #[error("Database {0} already exists in the instance")]
    DatabaseExists(String),
}

impl EngineError {
    /// Remediation hint shown to the operator next to the message.
    pub fn action(&self) -> &'static str {
        match self {
            EngineError::CatalogRead { .. } => "Please check output for detailed error",
            EngineError::NoBackupFound { .. } => {
                "Please check the backup location and verify there is a full backup"
            }
            EngineError::NoNewBackupFound { .. } => {
                "Please check the backup location and verify there is a new backup. \
                 If you are certain there is a more recent backup, collect support logs and review them"
            }
            EngineError::RestoreCommand { action, .. } => action,
            EngineError::UnknownFileType { .. } | EngineError::InvalidManifest(_) => {
                "Snapshot metadata is corrupted, take a new snapshot of the source"
            }
            EngineError::InvalidState { .. } => "Check the state of the database in the instance",
            EngineError::DatabaseExists(_) => "Drop or rename the existing database before provisioning",
            EngineError::InvalidIdentifier { .. } | EngineError::Config(_) => {
                "Check the configuration parameters"
            }
            _ => "Check output for details",
        }
    }

    /// Captured command output, when the failure came from a remote command.
    pub fn output(&self) -> Option<&CommandOutput> {
        match self {
            EngineError::CommandFailed(output) => Some(output),
            EngineError::RestoreCommand { output, .. } => Some(output),
            EngineError::CatalogRead { output, .. } => output.as_ref(),
            _ => None,
        }
    }

    /// True for the expected "nothing to apply" outcomes of backup selection.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            EngineError::NoBackupFound { .. } | EngineError::NoNewBackupFound { .. }
        )
    }
}

/// Attributes a raw command failure to the logical operation that issued it.
///
/// Only `CommandFailed` is rewrapped; every other error passes through so a
/// failure is wrapped exactly once.
pub trait CommandResultExt<T> {
    fn or_user_error(self, message: impl FnOnce() -> String, action: &'static str) -> Result<T>;
    fn or_catalog_error(self, message: impl FnOnce() -> String) -> Result<T>;
}

impl<T> CommandResultExt<T> for Result<T> {
    fn or_user_error(self, message: impl FnOnce() -> String, action: &'static str) -> Result<T> {
        self.map_err(|e| match e {
            EngineError::CommandFailed(output) => EngineError::RestoreCommand {
                message: message(),
                action,
                output,
            },
            other => other,
        })
    }

    fn or_catalog_error(self, message: impl FnOnce() -> String) -> Result<T> {
        self.map_err(|e| match e {
            EngineError::CommandFailed(output) => EngineError::CatalogRead {
                message: message(),
                output: Some(output),
            },
            other => other,
        })
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
