//! `sqlcmd` client: renders typed commands into scripts and runs them
//! through the executor with the instance credentials.

pub mod command;
pub mod ident;

use crate::context::OperationContext;
use crate::executor::{run_checked, shell_quote};
use crate::Result;
use std::sync::Arc;
use tracing::debug;

pub use command::{RecoveryMode, RestoreKind, SqlCommand};

const PASSWORD_ENV: &str = "SQLCMDPASSWORD";
const COLUMN_SEPARATOR: char = '|';

#[derive(Clone)]
pub struct SqlClient {
    ctx: Arc<OperationContext>,
}

impl SqlClient {
    pub fn new(ctx: Arc<OperationContext>) -> Self {
        Self { ctx }
    }

    /// Full shell command for `command`; the password travels in the environment.
    pub fn render(&self, command: &SqlCommand) -> Result<String> {
        let config = self.ctx.config();
        let sqlcmd = config.repository.client_path.join("sqlcmd");

        let mut invocation = format!(
            "{} -h -1 -b -U {}",
            shell_quote(&sqlcmd.to_string_lossy()),
            shell_quote(&config.database.instance_user)
        );
        if let Some(database) = command.scope() {
            ident::ident(database)?;
            invocation.push_str(&format!(" -d {}", shell_quote(database)));
        }
        if command.tabular() {
            invocation.push_str(&format!(" -s '{}' -W", COLUMN_SEPARATOR));
        }

        Ok(format!(
            "{} <<'EOF'\nSET NOCOUNT ON\nGO\n{}\nGO\nEXIT\nEOF",
            invocation,
            command.body()?
        ))
    }

    /// Run `command`, returning its non-empty output lines.
    pub fn run(&self, command: &SqlCommand) -> Result<Vec<String>> {
        let script = self.render(command)?;
        debug!(command = command.name(), "Running sqlcmd");
        let password = self.ctx.config().database.instance_password.as_str();
        let output = run_checked(self.ctx.executor(), &script, &[(PASSWORD_ENV, password)])?;
        Ok(output.lines())
    }

    /// Run a query and split each row into trimmed columns.
    pub fn rows(&self, command: &SqlCommand) -> Result<Vec<Vec<String>>> {
        Ok(self
            .run(command)?
            .iter()
            .map(|line| split_row(line))
            .collect())
    }
}

pub(crate) fn split_row(line: &str) -> Vec<String> {
    line.split(COLUMN_SEPARATOR)
        .map(|c| c.trim().to_string())
        .collect()
}
