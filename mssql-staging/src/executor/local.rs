//! Executor for commands on the machine running the engine.

use super::{env_prefix, CommandExecutor, CommandOutput};
use crate::Result;
use std::process::Command;

/// Runs commands through a local non-login `bash -c`.
#[derive(Debug, Clone)]
pub struct LocalExecutor {
    shell: String,
}

impl LocalExecutor {
    pub fn new() -> Self {
        Self {
            shell: "bash".to_string(),
        }
    }
}

impl Default for LocalExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandExecutor for LocalExecutor {
    fn run(&self, command: &str, env: &[(&str, &str)]) -> Result<CommandOutput> {
        let script = format!("{}{}", env_prefix(env)?, command);
        let output = Command::new(&self.shell).arg("-c").arg(script).output()?;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            // Killed by a signal: no code, report as generic failure
            exit_code: output.status.code().unwrap_or(-1),
        })
    }
}
