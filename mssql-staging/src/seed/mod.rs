//! Seed databases: an empty database whose files mirror a manifest, built
//! in the private seed directory and later pointed at the real files.

pub mod plan;

use crate::context::OperationContext;
use crate::fs::RemoteFs;
use crate::manifest::{FileDescriptor, FileType};
use crate::sql::{SqlClient, SqlCommand};
use crate::{CommandResultExt, Result};
use plan::{placeholder_name, SeedPlan, Slot};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

const CHECK_OUTPUT: &str = "Please check output for detailed error";

pub struct SeedBuilder {
    ctx: Arc<OperationContext>,
    sql: SqlClient,
    fs: RemoteFs,
}

impl SeedBuilder {
    pub fn new(ctx: Arc<OperationContext>) -> Self {
        Self {
            sql: SqlClient::new(ctx.clone()),
            fs: RemoteFs::new(ctx.clone()),
            ctx,
        }
    }

    fn seed_dir(&self) -> &Path {
        &self.ctx.layout().seed_dir
    }

    /// Create the target database with the layout of `files`, its files
    /// placed in the seed directory.
    pub fn build(&self, files: &[FileDescriptor]) -> Result<()> {
        let plan = SeedPlan::new(files)?;
        let database = self.ctx.target_database();
        let seed_dir = self.seed_dir();

        info!(
            database = %database,
            files = files.len(),
            placeholders = plan.placeholder_ids().len(),
            "Creating seed database"
        );
        self.fs.ensure_dir(seed_dir)?;

        self.sql
            .run(&SqlCommand::CreateDatabase {
                database: database.clone(),
                data_name: plan.primary_data.logical_name.clone(),
                data_path: seed_dir.join(&plan.primary_data.physical_name),
                log_name: plan.primary_log.logical_name.clone(),
                log_path: seed_dir.join(&plan.primary_log.physical_name),
            })
            .or_user_error(
                || format!("Creating a seed database {} failed", database),
                CHECK_OUTPUT,
            )?;

        for filegroup in &plan.filegroups {
            self.sql
                .run(&SqlCommand::AddFilegroup {
                    database: database.clone(),
                    filegroup: filegroup.clone(),
                })
                .or_user_error(
                    || format!("Adding a filegroup {} to seed database {} failed", filegroup, database),
                    CHECK_OUTPUT,
                )?;
        }

        let mut placeholders = Placeholders::new(&self.sql, &database);
        for slot in &plan.slots {
            match slot {
                Slot::Placeholder { file_id } => {
                    let name = placeholder_name(*file_id);
                    debug!(file_id, "Adding placeholder file");
                    self.sql
                        .run(&SqlCommand::AddDataFile {
                            database: database.clone(),
                            logical_name: name.clone(),
                            physical_path: seed_dir.join(&name),
                            filegroup: None,
                        })
                        .or_user_error(
                            || format!("Adding a placeholder file {} to seed database {} failed", name, database),
                            CHECK_OUTPUT,
                        )?;
                    placeholders.track(name);
                }
                Slot::File(file) => self.add_file(&database, file)?,
            }
        }
        placeholders.remove_all()?;

        info!(database = %database, "Seed database created");
        Ok(())
    }

    fn add_file(&self, database: &str, file: &FileDescriptor) -> Result<()> {
        debug!(file_id = file.file_id, logical_name = %file.logical_name, "Adding seed file");
        let physical_path = self.seed_dir().join(&file.physical_name);
        let command = match file.file_type {
            FileType::Data => SqlCommand::AddDataFile {
                database: database.to_string(),
                logical_name: file.logical_name.clone(),
                physical_path,
                filegroup: file.filegroup.clone(),
            },
            FileType::Log => SqlCommand::AddLogFile {
                database: database.to_string(),
                logical_name: file.logical_name.clone(),
                physical_path,
            },
        };
        self.sql.run(&command).map(|_| ()).or_user_error(
            || {
                format!(
                    "Adding a seed file {} (file id {}) to seed database {} failed",
                    file.logical_name, file.file_id, database
                )
            },
            CHECK_OUTPUT,
        )
    }

    /// Point every file of the target database at `target_dir`.
    pub fn relocate_files(&self, files: &[FileDescriptor], target_dir: &Path) -> Result<()> {
        let database = self.ctx.target_database();
        for file in files {
            self.sql
                .run(&SqlCommand::ModifyFile {
                    database: database.clone(),
                    logical_name: file.logical_name.clone(),
                    physical_path: target_dir.join(&file.physical_name),
                })
                .or_user_error(
                    || format!("Problem with renaming file {}", file.logical_name),
                    CHECK_OUTPUT,
                )?;
        }
        debug!(database = %database, target = %target_dir.display(), "Relocated database files");
        Ok(())
    }

    /// Remove the seed directory and everything in it.
    pub fn cleanup(&self) -> Result<()> {
        let seed_dir = self.seed_dir();
        self.fs.remove_dir(seed_dir).or_user_error(
            || format!("Problem with cleaning up seed directory {}", seed_dir.display()),
            CHECK_OUTPUT,
        )
    }
}

/// Placeholder files added to a seed database. They are emptied and removed
/// by [`Placeholders::remove_all`]; if the build fails first, removal is
/// attempted when the set is dropped.
struct Placeholders<'a> {
    sql: &'a SqlClient,
    database: &'a str,
    names: Vec<String>,
}

impl<'a> Placeholders<'a> {
    fn new(sql: &'a SqlClient, database: &'a str) -> Self {
        Self {
            sql,
            database,
            names: Vec::new(),
        }
    }

    fn track(&mut self, name: String) {
        self.names.push(name);
    }

    fn remove_one(&self, name: &str) -> Result<()> {
        self.sql.run(&SqlCommand::ShrinkFile {
            database: self.database.to_string(),
            logical_name: name.to_string(),
        })?;
        self.sql.run(&SqlCommand::RemoveFile {
            database: self.database.to_string(),
            logical_name: name.to_string(),
        })?;
        Ok(())
    }

    /// Every placeholder is attempted; the first failure is returned.
    fn remove_all(mut self) -> Result<()> {
        let mut first_error = None;
        for name in std::mem::take(&mut self.names) {
            let removed = self.remove_one(&name).or_user_error(
                || format!("Problem with cleaning up dummy datafile {}", name),
                CHECK_OUTPUT,
            );
            match removed {
                Ok(()) => debug!(name = %name, "Removed placeholder file"),
                Err(e) => {
                    warn!(database = %self.database, name = %name, error = %e, "Failed to remove placeholder file");
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for Placeholders<'_> {
    fn drop(&mut self) {
        for name in std::mem::take(&mut self.names) {
            if let Err(e) = self.remove_one(&name) {
                warn!(database = %self.database, name = %name, error = %e, "Failed to remove placeholder file");
            }
        }
    }
}
