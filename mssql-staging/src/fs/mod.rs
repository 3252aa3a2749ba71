//! Remote filesystem primitives.
//!
//! Small wrappers over shell commands run through the executor, executed
//! as the repository owner when the connected user differs.

pub mod os_commands;
pub mod sidecar;

use crate::context::OperationContext;
use crate::executor::{run_checked, CommandExecutor};
use crate::{EngineError, Result};
use os_commands::OsCommand;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

pub use sidecar::JsonSidecar;

#[derive(Clone)]
pub struct RemoteFs {
    ctx: Arc<OperationContext>,
}

impl RemoteFs {
    pub fn new(ctx: Arc<OperationContext>) -> Self {
        Self { ctx }
    }

    fn run(&self, command: OsCommand) -> Result<String> {
        let text = command.render(self.ctx.sudo_uid())?;
        run_checked(self.ctx.executor(), &text, &[]).map(|o| o.stdout)
    }

    /// Raw `ls -l` output for `dir/pattern`.
    pub fn list_dir(&self, dir: &Path, pattern: &str) -> Result<String> {
        self.run(OsCommand::ListDir {
            dir: dir.to_path_buf(),
            pattern: pattern.to_string(),
        })
    }

    pub fn dir_exists(&self, path: &Path) -> Result<bool> {
        match self.run(OsCommand::CheckDir(path.to_path_buf())) {
            Ok(_) => Ok(true),
            Err(EngineError::CommandFailed(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Create `path` unless it already exists.
    pub fn ensure_dir(&self, path: &Path) -> Result<()> {
        if self.dir_exists(path)? {
            return Ok(());
        }
        debug!(path = %path.display(), "Creating directory");
        self.run(OsCommand::MakeDir(path.to_path_buf())).map(|_| ())
    }

    /// Remove a directory tree; a missing directory is not an error.
    pub fn remove_dir(&self, path: &Path) -> Result<()> {
        self.run(OsCommand::RemoveDir(path.to_path_buf())).map(|_| ())
    }

    pub fn read_file(&self, path: &Path) -> Result<String> {
        self.run(OsCommand::ReadFile(path.to_path_buf()))
    }

    pub fn write_file(&self, path: &Path, content: &str) -> Result<()> {
        self.run(OsCommand::WriteFile {
            path: path.to_path_buf(),
            content: content.to_string(),
        })
        .map(|_| ())
    }
}

/// True when the connected user is not the repository owner.
pub fn needs_sudo(executor: &dyn CommandExecutor, repo_uid: u32, repo_gid: u32) -> Result<bool> {
    let output = run_checked(executor, &OsCommand::Whoami.render(None)?, &[])?;
    let sudo = match parse_id_output(&output.stdout) {
        Some((uid, gid)) => uid != repo_uid || gid != repo_gid,
        None => true,
    };
    debug!(sudo, repo_uid, repo_gid, "Resolved command user");
    Ok(sudo)
}

/// Extract `(uid, gid)` from `id` output such as `uid=999(mssql) gid=999(mssql)`.
fn parse_id_output(output: &str) -> Option<(u32, u32)> {
    let field = |name: &str| -> Option<u32> {
        let start = output.find(name)? + name.len();
        let digits: String = output[start..].chars().take_while(|c| c.is_ascii_digit()).collect();
        digits.parse().ok()
    };
    Some((field("uid=")?, field("gid=")?))
}
