//! Remote command execution.
//!
//! Every engine step is a single shell command run on the database host.
//! The executor only transports the command and captures its result; it
//! never retries or interprets output. A non-zero exit code is always a
//! failure ([`run_checked`]).

pub mod local;
pub mod ssh;

#[cfg(test)]
pub(crate) mod scripted;

use crate::config::ConnectionConfig;
use crate::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

pub use local::LocalExecutor;
pub use ssh::SshExecutor;

/// Captured result of one remote command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Non-empty stdout lines with surrounding whitespace removed.
    pub fn lines(&self) -> Vec<String> {
        self.stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect()
    }
}

impl fmt::Display for CommandOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stdout: {}\nstderr: {}", self.stdout.trim(), self.stderr.trim())
    }
}

/// Runs one shell command against the target host.
pub trait CommandExecutor: Send + Sync {
    /// Run `command` with the given environment variables exported.
    ///
    /// Returns `Err` only when the command could not be delivered; a command
    /// that ran and failed is reported through `CommandOutput::exit_code`.
    fn run(&self, command: &str, env: &[(&str, &str)]) -> Result<CommandOutput>;
}

/// Build the executor described by the connection section of the config.
pub fn from_config(config: &ConnectionConfig) -> Result<Arc<dyn CommandExecutor>> {
    match config {
        ConnectionConfig::Local => Ok(Arc::new(LocalExecutor::new())),
        ConnectionConfig::Ssh {
            host,
            port,
            username,
            password,
            private_key,
        } => {
            let executor = SshExecutor::connect(
                host,
                *port,
                username,
                password.as_deref(),
                private_key.as_deref(),
            )?;
            Ok(Arc::new(executor))
        }
    }
}

/// Run a command and turn a non-zero exit code into `EngineError::CommandFailed`.
pub fn run_checked(
    executor: &dyn CommandExecutor,
    command: &str,
    env: &[(&str, &str)],
) -> Result<CommandOutput> {
    debug!(command = %command, "Running remote command");
    let output = executor.run(command, env)?;
    debug!(
        exit_code = output.exit_code,
        stdout = %output.stdout.trim(),
        stderr = %output.stderr.trim(),
        "Remote command finished"
    );

    if output.success() {
        Ok(output)
    } else {
        Err(EngineError::CommandFailed(output))
    }
}

/// Quote a value for POSIX shells using single quotes.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// `export` prefix for environment variables, so values never show up in
/// the logged command text.
pub(crate) fn env_prefix(env: &[(&str, &str)]) -> Result<String> {
    let mut prefix = String::new();
    for (key, value) in env {
        if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(EngineError::InvalidIdentifier {
                value: key.to_string(),
                reason: "environment variable names must be alphanumeric",
            });
        }
        prefix.push_str(&format!("export {}={}; ", key, shell_quote(value)));
    }
    Ok(prefix)
}
