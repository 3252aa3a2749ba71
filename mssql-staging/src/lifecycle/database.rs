//! Operations on the target database inside the SQL Server instance,
//! shared by the staging and virtual controllers.

use super::status::{StagingState, Status};
use crate::context::OperationContext;
use crate::fs::RemoteFs;
use crate::manifest::{self, FileDescriptor};
use crate::sql::{SqlClient, SqlCommand};
use crate::{CommandResultExt, Result};
use std::sync::Arc;
use tracing::{debug, info, warn};

const CHECK_OUTPUT: &str = "Check output for details";

pub struct InstanceDatabase {
    ctx: Arc<OperationContext>,
    sql: SqlClient,
    name: String,
}

impl InstanceDatabase {
    pub fn new(ctx: Arc<OperationContext>) -> Self {
        Self {
            sql: SqlClient::new(ctx.clone()),
            name: ctx.target_database(),
            ctx,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Create `.config`, `.seed` and `db` under the mount path.
    pub fn ensure_dirs(&self) -> Result<()> {
        let fs = RemoteFs::new(self.ctx.clone());
        let layout = self.ctx.layout();
        for dir in [&layout.config_dir, &layout.seed_dir, &layout.db_dir] {
            fs.ensure_dir(dir).or_user_error(
                || format!("Can't create config directory {}", dir.display()),
                "Check the mount path and the repository owner",
            )?;
        }
        Ok(())
    }

    pub fn exists(&self) -> Result<bool> {
        let names = self
            .sql
            .run(&SqlCommand::ListDatabases)
            .or_user_error(
                || "Error reading list of database from instance".to_string(),
                "Check output for detailed error",
            )?;
        let exists = names.iter().any(|n| n == &self.name);
        debug!(database = %self.name, exists, "Checked database existence");
        Ok(exists)
    }

    /// `state_desc` and standby flag, or `None` when the database is not in
    /// the instance.
    pub fn probe(&self) -> Result<Option<StagingState>> {
        let rows = self.sql.rows(&SqlCommand::DatabaseState {
            database: self.name.clone(),
        })?;
        Ok(rows.first().map(|row| {
            let state_desc = row.first().map(String::as_str).unwrap_or_default();
            let in_standby = row.get(1).map(String::as_str).unwrap_or("0");
            StagingState::from_row(state_desc, in_standby)
        }))
    }

    /// Never fails: a query error or a missing database is `Inactive`.
    pub fn status(&self) -> Status {
        match self.sql.rows(&SqlCommand::DatabaseState {
            database: self.name.clone(),
        }) {
            Ok(rows) => {
                let status = rows
                    .first()
                    .and_then(|row| row.first())
                    .map(|state| Status::from_state_desc(state))
                    .unwrap_or(Status::Inactive);
                debug!(database = %self.name, ?status, "Database status");
                status
            }
            Err(e) => {
                warn!(database = %self.name, error = %e, "Status query failed");
                Status::Inactive
            }
        }
    }

    /// Live file catalog of the database.
    pub fn files(&self) -> Result<Vec<FileDescriptor>> {
        let rows = self
            .sql
            .rows(&SqlCommand::DatabaseFiles {
                database: self.name.clone(),
            })
            .or_user_error(
                || format!("Reading data file list from database {} failed", self.name),
                "Check if this is a valid database and if credentials are OK",
            )?;
        manifest::from_database_files(&rows)
    }

    pub fn drop_database(&self) -> Result<()> {
        self.run(
            SqlCommand::DropDatabase {
                database: self.name.clone(),
            },
            || format!("Dropping database {} failed", self.name),
            "Check if you are restoring valid backup",
        )?;
        info!(database = %self.name, "Dropped database");
        Ok(())
    }

    pub fn detach(&self) -> Result<()> {
        self.run(
            SqlCommand::DetachDatabase {
                database: self.name.clone(),
            },
            || format!("Detach database for {} failed", self.name),
            CHECK_OUTPUT,
        )?;
        info!(database = %self.name, "Detached database");
        Ok(())
    }

    pub fn set_offline(&self) -> Result<()> {
        self.run(
            SqlCommand::SetOffline {
                database: self.name.clone(),
            },
            || format!("Problem with offlining database {}", self.name),
            "Please check output for detailed error",
        )
    }

    pub fn set_online(&self) -> Result<()> {
        self.run(
            SqlCommand::SetOnline {
                database: self.name.clone(),
            },
            || format!("Problem with onlining database {}", self.name),
            "Please check output for detailed error",
        )
    }

    /// Run a command whose failure is reported with `message` and `action`.
    pub fn run(
        &self,
        command: SqlCommand,
        message: impl FnOnce() -> String,
        action: &'static str,
    ) -> Result<()> {
        self.sql
            .run(&command)
            .map(|_| ())
            .or_user_error(message, action)
    }
}
