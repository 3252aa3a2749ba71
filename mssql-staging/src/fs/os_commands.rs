//! Typed shell commands for the remote filesystem.
//!
//! Paths are always single-quoted; the only unquoted text is the listing
//! glob, which is restricted to a safe character set.

use crate::executor::shell_quote;
use crate::{EngineError, Result};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OsCommand {
    /// `ls -l` with sortable timestamps for every entry matching `pattern`
    ListDir { dir: PathBuf, pattern: String },
    CheckDir(PathBuf),
    MakeDir(PathBuf),
    RemoveDir(PathBuf),
    ReadFile(PathBuf),
    WriteFile { path: PathBuf, content: String },
    Whoami,
}

impl OsCommand {
    /// Render the command, running it as `sudo_uid` when set.
    pub fn render(&self, sudo_uid: Option<u32>) -> Result<String> {
        let sudo = sudo_uid
            .map(|uid| format!("sudo -u \\#{} ", uid))
            .unwrap_or_default();

        let cmd = match self {
            OsCommand::ListDir { dir, pattern } => {
                validate_pattern(pattern)?;
                format!(
                    "{}ls -l --time-style=\"+%Y-%m-%d %H:%M:%S\" {}/{}",
                    sudo,
                    quote_path(dir),
                    pattern
                )
            }
            OsCommand::CheckDir(path) => format!("{}test -d {}", sudo, quote_path(path)),
            OsCommand::MakeDir(path) => format!("{}mkdir -p {}", sudo, quote_path(path)),
            OsCommand::RemoveDir(path) => format!("{}rm -rf {}", sudo, quote_path(path)),
            OsCommand::ReadFile(path) => format!("{}cat {}", sudo, quote_path(path)),
            OsCommand::WriteFile { path, content } => format!(
                "printf '%s\\n' {} | {}tee {} > /dev/null",
                shell_quote(content),
                sudo,
                quote_path(path)
            ),
            OsCommand::Whoami => "id".to_string(),
        };
        Ok(cmd)
    }
}

fn quote_path(path: &std::path::Path) -> String {
    shell_quote(&path.to_string_lossy())
}

fn validate_pattern(pattern: &str) -> Result<()> {
    let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '*' | '?' | '.' | '_' | '-');
    if pattern.is_empty() || !pattern.chars().all(allowed) {
        return Err(EngineError::InvalidIdentifier {
            value: pattern.to_string(),
            reason: "backup pattern may only contain letters, digits and * ? . _ -",
        });
    }
    Ok(())
}
