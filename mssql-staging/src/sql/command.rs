//! Every T-SQL statement the engine issues, as a closed set of typed
//! commands. Rendering validates all embedded names and paths.

use super::ident::{ident, literal};
use crate::Result;
use std::path::{Path, PathBuf};

/// Target of a `RESTORE` from a backup device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreKind {
    Database,
    Log,
}

/// State a restore leaves the database in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryMode {
    /// Read-only, able to accept further restores; undo file at the path
    Standby(PathBuf),
    NoRecovery,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlCommand {
    ListDatabases,
    DatabaseState {
        database: String,
    },
    BackupHeaders {
        backup_path: PathBuf,
    },
    BackupFileList {
        backup_path: PathBuf,
    },
    DatabaseFiles {
        database: String,
    },
    CreateDatabase {
        database: String,
        data_name: String,
        data_path: PathBuf,
        log_name: String,
        log_path: PathBuf,
    },
    AddFilegroup {
        database: String,
        filegroup: String,
    },
    AddDataFile {
        database: String,
        logical_name: String,
        physical_path: PathBuf,
        filegroup: Option<String>,
    },
    AddLogFile {
        database: String,
        logical_name: String,
        physical_path: PathBuf,
    },
    ShrinkFile {
        database: String,
        logical_name: String,
    },
    RemoveFile {
        database: String,
        logical_name: String,
    },
    ModifyFile {
        database: String,
        logical_name: String,
        physical_path: PathBuf,
    },
    Restore {
        database: String,
        kind: RestoreKind,
        backup_path: PathBuf,
        position: u32,
        recovery: RecoveryMode,
        moves: Vec<(String, PathBuf)>,
    },
    DropDatabase {
        database: String,
    },
    DetachDatabase {
        database: String,
    },
    AttachDatabase {
        database: String,
        files: Vec<PathBuf>,
    },
    BackupDatabase {
        database: String,
        backup_path: PathBuf,
    },
    /// Restore a seed backup over an existing database, leaving it restoring
    RestoreSeed {
        database: String,
        backup_path: PathBuf,
    },
    /// Finish an in-progress restore sequence without a backup device
    Recover {
        database: String,
        recovery: RecoveryMode,
    },
    SetOffline {
        database: String,
    },
    SetOnline {
        database: String,
    },
}

impl SqlCommand {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            SqlCommand::ListDatabases => "list_databases",
            SqlCommand::DatabaseState { .. } => "database_state",
            SqlCommand::BackupHeaders { .. } => "backup_headers",
            SqlCommand::BackupFileList { .. } => "backup_file_list",
            SqlCommand::DatabaseFiles { .. } => "database_files",
            SqlCommand::CreateDatabase { .. } => "create_database",
            SqlCommand::AddFilegroup { .. } => "add_filegroup",
            SqlCommand::AddDataFile { .. } => "add_data_file",
            SqlCommand::AddLogFile { .. } => "add_log_file",
            SqlCommand::ShrinkFile { .. } => "shrink_file",
            SqlCommand::RemoveFile { .. } => "remove_file",
            SqlCommand::ModifyFile { .. } => "modify_file",
            SqlCommand::Restore { .. } => "restore",
            SqlCommand::DropDatabase { .. } => "drop_database",
            SqlCommand::DetachDatabase { .. } => "detach_database",
            SqlCommand::AttachDatabase { .. } => "attach_database",
            SqlCommand::BackupDatabase { .. } => "backup_database",
            SqlCommand::RestoreSeed { .. } => "restore_seed",
            SqlCommand::Recover { .. } => "recover",
            SqlCommand::SetOffline { .. } => "set_offline",
            SqlCommand::SetOnline { .. } => "set_online",
        }
    }

    /// Database to connect to with `sqlcmd -d`, when the query is scoped.
    pub fn scope(&self) -> Option<&str> {
        match self {
            SqlCommand::DatabaseFiles { database } => Some(database),
            _ => None,
        }
    }

    /// Whether the output is a `|`-separated result set.
    pub fn tabular(&self) -> bool {
        matches!(
            self,
            SqlCommand::DatabaseState { .. }
                | SqlCommand::BackupHeaders { .. }
                | SqlCommand::BackupFileList { .. }
                | SqlCommand::DatabaseFiles { .. }
        )
    }

    /// T-SQL batch text.
    pub fn body(&self) -> Result<String> {
        let sql = match self {
            SqlCommand::ListDatabases => "SELECT name FROM sys.databases".to_string(),
            SqlCommand::DatabaseState { database } => format!(
                "SELECT state_desc, is_in_standby FROM sys.databases WHERE name = {}",
                literal(database)?
            ),
            SqlCommand::BackupHeaders { backup_path } => {
                format!("RESTORE HEADERONLY FROM DISK = {}", path_literal(backup_path)?)
            }
            SqlCommand::BackupFileList { backup_path } => {
                format!("RESTORE FILELISTONLY FROM DISK = {}", path_literal(backup_path)?)
            }
            SqlCommand::DatabaseFiles { .. } => "SELECT f.name, f.file_id, f.physical_name, \
                 CASE f.type WHEN 0 THEN 'D' WHEN 1 THEN 'L' ELSE CAST(f.type AS varchar(4)) END, \
                 ISNULL(fg.name, 'NULL') \
                 FROM sys.database_files f \
                 LEFT JOIN sys.filegroups fg ON f.data_space_id = fg.data_space_id \
                 ORDER BY f.file_id"
                .to_string(),
            SqlCommand::CreateDatabase {
                database,
                data_name,
                data_path,
                log_name,
                log_path,
            } => format!(
                "CREATE DATABASE {} ON PRIMARY ({}) LOG ON ({})",
                ident(database)?,
                file_spec(data_name, data_path)?,
                file_spec(log_name, log_path)?
            ),
            SqlCommand::AddFilegroup {
                database,
                filegroup,
            } => format!(
                "ALTER DATABASE {} ADD FILEGROUP {}",
                ident(database)?,
                ident(filegroup)?
            ),
            SqlCommand::AddDataFile {
                database,
                logical_name,
                physical_path,
                filegroup,
            } => {
                let mut sql = format!(
                    "ALTER DATABASE {} ADD FILE ({})",
                    ident(database)?,
                    file_spec(logical_name, physical_path)?
                );
                if let Some(group) = filegroup {
                    sql.push_str(&format!(" TO FILEGROUP {}", ident(group)?));
                }
                sql
            }
            SqlCommand::AddLogFile {
                database,
                logical_name,
                physical_path,
            } => format!(
                "ALTER DATABASE {} ADD LOG FILE ({})",
                ident(database)?,
                file_spec(logical_name, physical_path)?
            ),
            SqlCommand::ShrinkFile {
                database,
                logical_name,
            } => format!(
                "USE {}\nGO\nDBCC SHRINKFILE ({}, EMPTYFILE)",
                ident(database)?,
                literal(logical_name)?
            ),
            SqlCommand::RemoveFile {
                database,
                logical_name,
            } => format!(
                "ALTER DATABASE {} REMOVE FILE {}",
                ident(database)?,
                ident(logical_name)?
            ),
            SqlCommand::ModifyFile {
                database,
                logical_name,
                physical_path,
            } => format!(
                "ALTER DATABASE {} MODIFY FILE ({})",
                ident(database)?,
                file_spec(logical_name, physical_path)?
            ),
            SqlCommand::Restore {
                database,
                kind,
                backup_path,
                position,
                recovery,
                moves,
            } => {
                let target = match kind {
                    RestoreKind::Database => "DATABASE",
                    RestoreKind::Log => "LOG",
                };
                let mut options = vec![format!("FILE = {}", position), recovery_option(recovery)?];
                for (logical_name, path) in moves {
                    options.push(format!("MOVE {} TO {}", literal(logical_name)?, path_literal(path)?));
                }
                format!(
                    "RESTORE {} {} FROM DISK = {} WITH {}",
                    target,
                    ident(database)?,
                    path_literal(backup_path)?,
                    options.join(", ")
                )
            }
            SqlCommand::DropDatabase { database } => format!("DROP DATABASE {}", ident(database)?),
            SqlCommand::DetachDatabase { database } => {
                ident(database)?;
                format!("EXEC sp_detach_db {}, 'true'", literal(database)?)
            }
            SqlCommand::AttachDatabase { database, files } => {
                let specs = files
                    .iter()
                    .map(|f| path_literal(f).map(|p| format!("(FILENAME = {})", p)))
                    .collect::<Result<Vec<_>>>()?;
                format!(
                    "CREATE DATABASE {} ON {} FOR ATTACH",
                    ident(database)?,
                    specs.join(", ")
                )
            }
            SqlCommand::BackupDatabase {
                database,
                backup_path,
            } => format!(
                "BACKUP DATABASE {} TO DISK = {}",
                ident(database)?,
                path_literal(backup_path)?
            ),
            SqlCommand::RestoreSeed {
                database,
                backup_path,
            } => format!(
                "RESTORE DATABASE {} FROM DISK = {} WITH NORECOVERY, REPLACE",
                ident(database)?,
                path_literal(backup_path)?
            ),
            SqlCommand::Recover { database, recovery } => format!(
                "RESTORE DATABASE {} WITH {}",
                ident(database)?,
                recovery_option(recovery)?
            ),
            SqlCommand::SetOffline { database } => format!(
                "ALTER DATABASE {} SET OFFLINE WITH ROLLBACK IMMEDIATE",
                ident(database)?
            ),
            SqlCommand::SetOnline { database } => {
                format!("ALTER DATABASE {} SET ONLINE", ident(database)?)
            }
        };
        Ok(sql)
    }
}

fn path_literal(path: &Path) -> Result<String> {
    literal(&path.to_string_lossy())
}

fn file_spec(logical_name: &str, path: &Path) -> Result<String> {
    Ok(format!(
        "NAME = {}, FILENAME = {}",
        literal(logical_name)?,
        path_literal(path)?
    ))
}

fn recovery_option(recovery: &RecoveryMode) -> Result<String> {
    match recovery {
        RecoveryMode::Standby(path) => Ok(format!("STANDBY = {}", path_literal(path)?)),
        RecoveryMode::NoRecovery => Ok("NORECOVERY".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EngineError;

    #[test]
    fn test_restore_standby_with_moves() {
        let cmd = SqlCommand::Restore {
            database: "sales_staging".into(),
            kind: RestoreKind::Database,
            backup_path: PathBuf::from("/backups/sales/full.bak"),
            position: 2,
            recovery: RecoveryMode::Standby(PathBuf::from("/mnt/sales/db/standby.bak")),
            moves: vec![
                ("sales".into(), PathBuf::from("/mnt/sales/db/sales.mdf")),
                ("sales_log".into(), PathBuf::from("/mnt/sales/db/sales_log.ldf")),
            ],
        };

        assert_eq!(
            cmd.body().unwrap(),
            "RESTORE DATABASE [sales_staging] FROM DISK = N'/backups/sales/full.bak' \
             WITH FILE = 2, STANDBY = N'/mnt/sales/db/standby.bak', \
             MOVE N'sales' TO N'/mnt/sales/db/sales.mdf', \
             MOVE N'sales_log' TO N'/mnt/sales/db/sales_log.ldf'"
        );
    }

    #[test]
    fn test_log_restore_norecovery() {
        let cmd = SqlCommand::Restore {
            database: "sales_staging".into(),
            kind: RestoreKind::Log,
            backup_path: PathBuf::from("/backups/log.trn"),
            position: 1,
            recovery: RecoveryMode::NoRecovery,
            moves: vec![],
        };
        assert_eq!(
            cmd.body().unwrap(),
            "RESTORE LOG [sales_staging] FROM DISK = N'/backups/log.trn' WITH FILE = 1, NORECOVERY"
        );
    }

    #[test]
    fn test_add_data_file_with_and_without_filegroup() {
        let bare = SqlCommand::AddDataFile {
            database: "db".into(),
            logical_name: "extra".into(),
            physical_path: PathBuf::from("/seed/extra.ndf"),
            filegroup: None,
        };
        assert_eq!(
            bare.body().unwrap(),
            "ALTER DATABASE [db] ADD FILE (NAME = N'extra', FILENAME = N'/seed/extra.ndf')"
        );

        let grouped = SqlCommand::AddDataFile {
            database: "db".into(),
            logical_name: "extra".into(),
            physical_path: PathBuf::from("/seed/extra.ndf"),
            filegroup: Some("ARCHIVE".into()),
        };
        assert!(grouped.body().unwrap().ends_with(" TO FILEGROUP [ARCHIVE]"));
    }

    #[test]
    fn test_attach_lists_every_file() {
        let cmd = SqlCommand::AttachDatabase {
            database: "vdb".into(),
            files: vec![PathBuf::from("/m/db/a.mdf"), PathBuf::from("/m/db/a.ldf")],
        };
        assert_eq!(
            cmd.body().unwrap(),
            "CREATE DATABASE [vdb] ON (FILENAME = N'/m/db/a.mdf'), (FILENAME = N'/m/db/a.ldf') FOR ATTACH"
        );
    }

    #[test]
    fn test_rejects_malicious_names() {
        let cmd = SqlCommand::DropDatabase {
            database: "x]; DROP DATABASE [master".into(),
        };
        assert!(matches!(cmd.body(), Err(EngineError::InvalidIdentifier { .. })));

        let cmd = SqlCommand::BackupDatabase {
            database: "ok".into(),
            backup_path: PathBuf::from("/tmp/x'; SHUTDOWN --"),
        };
        assert!(cmd.body().is_err());
    }

    #[test]
    fn test_scope_and_tabular() {
        let files = SqlCommand::DatabaseFiles { database: "db".into() };
        assert_eq!(files.scope(), Some("db"));
        assert!(files.tabular());
        assert!(!SqlCommand::ListDatabases.tabular());
    }
}
