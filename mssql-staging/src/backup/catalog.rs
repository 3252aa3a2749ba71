//! Backup catalog: which files sit in the backup directory and what each
//! of them contains according to `RESTORE HEADERONLY`.

use crate::context::OperationContext;
use crate::fs::RemoteFs;
use crate::manifest::{self, FileDescriptor};
use crate::sql::{SqlClient, SqlCommand};
use crate::{CommandResultExt, EngineError, Result};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Format of `BackupStartDate` as printed by `sqlcmd`.
pub const HEADER_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

// HEADERONLY column positions
const COL_BACKUP_TYPE: usize = 2;
const COL_POSITION: usize = 5;
const COL_DATABASE_NAME: usize = 9;
const COL_START_DATE: usize = 17;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackupType {
    Full,
    Log,
    File,
    Differential,
    DifferentialFile,
    Partial,
    DifferentialPartial,
}

impl BackupType {
    /// Map the numeric `BackupType` column of `RESTORE HEADERONLY`.
    pub fn from_code(code: &str) -> Option<Self> {
        let kind = match code.trim() {
            "1" => BackupType::Full,
            "2" => BackupType::Log,
            "4" => BackupType::File,
            "5" => BackupType::Differential,
            "6" => BackupType::DifferentialFile,
            "7" => BackupType::Partial,
            "8" => BackupType::DifferentialPartial,
            _ => return None,
        };
        Some(kind)
    }
}

/// One backup set inside a backup file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupHeader {
    pub backup_type: BackupType,
    /// 1-based index of the backup set within `filename`
    pub position: u32,
    pub database_name: String,
    pub start_timestamp: NaiveDateTime,
    /// Path relative to the backup directory
    pub filename: String,
}

/// Parse the rows of `RESTORE HEADERONLY` for `filename`.
pub fn parse_headers(filename: &str, rows: &[Vec<String>]) -> Result<Vec<BackupHeader>> {
    rows.iter()
        .map(|cols| parse_header_row(filename, cols))
        .collect()
}

fn parse_header_row(filename: &str, cols: &[String]) -> Result<BackupHeader> {
    let bad_row = |what: &str| EngineError::CatalogRead {
        message: format!("Unexpected backup header in {}: {}", filename, what),
        output: None,
    };

    if cols.len() <= COL_START_DATE {
        return Err(bad_row(&format!("{} columns", cols.len())));
    }

    let backup_type = BackupType::from_code(&cols[COL_BACKUP_TYPE])
        .ok_or_else(|| bad_row(&format!("backup type {}", cols[COL_BACKUP_TYPE])))?;
    let position = cols[COL_POSITION]
        .trim()
        .parse()
        .map_err(|_| bad_row(&format!("position {}", cols[COL_POSITION])))?;
    let start_timestamp =
        NaiveDateTime::parse_from_str(cols[COL_START_DATE].trim(), HEADER_TIMESTAMP_FORMAT)
            .map_err(|_| bad_row(&format!("start date {}", cols[COL_START_DATE])))?;

    Ok(BackupHeader {
        backup_type,
        position,
        database_name: cols[COL_DATABASE_NAME].trim().to_string(),
        start_timestamp,
        filename: filename.to_string(),
    })
}

/// Extract regular files from `ls -l --time-style="+%Y-%m-%d %H:%M:%S"`
/// output, as paths relative to `backup_dir`.
pub fn parse_listing(listing: &str, backup_dir: &Path) -> Vec<String> {
    listing
        .lines()
        .filter(|line| line.starts_with('-'))
        .filter_map(|line| skip_fields(line, 7))
        .map(|name| relative_to(name.trim_end(), backup_dir))
        .filter(|name| !name.is_empty())
        .collect()
}

/// Remainder of `line` after `n` whitespace-separated fields.
fn skip_fields(line: &str, n: usize) -> Option<&str> {
    let mut rest = line.trim_start();
    for _ in 0..n {
        let end = rest.find(char::is_whitespace)?;
        rest = rest[end..].trim_start();
    }
    (!rest.is_empty()).then_some(rest)
}

fn relative_to(name: &str, dir: &Path) -> String {
    let dir = dir.to_string_lossy();
    let dir = dir.trim_end_matches('/');
    name.strip_prefix(dir)
        .and_then(|rest| rest.strip_prefix('/'))
        .unwrap_or(name)
        .to_string()
}

/// Reads the backup directory of a staging database.
pub struct CatalogReader {
    ctx: Arc<OperationContext>,
    fs: RemoteFs,
    sql: SqlClient,
}

impl CatalogReader {
    pub fn new(ctx: Arc<OperationContext>) -> Self {
        Self {
            fs: RemoteFs::new(ctx.clone()),
            sql: SqlClient::new(ctx.clone()),
            ctx,
        }
    }

    fn backup_dir(&self) -> Result<&Path> {
        self.ctx.backup_location()
    }

    /// Absolute path of a catalog file.
    pub fn backup_path(&self, filename: &str) -> Result<PathBuf> {
        Ok(self.backup_dir()?.join(filename))
    }

    /// Backup files matching the configured pattern.
    pub fn list_files(&self) -> Result<Vec<String>> {
        let dir = self.backup_dir()?;
        let pattern = &self.ctx.config().database.backup_pattern;
        let listing = self.fs.list_dir(dir, pattern).or_catalog_error(|| {
            format!(
                "Unable to list the files in the backup directory {}",
                dir.join(pattern).display()
            )
        })?;

        let files = parse_listing(&listing, dir);
        debug!(count = files.len(), dir = %dir.display(), "Listed backup files");
        Ok(files)
    }

    /// Backup sets contained in one file.
    pub fn headers(&self, filename: &str) -> Result<Vec<BackupHeader>> {
        let backup_path = self.backup_path(filename)?;
        let rows = self
            .sql
            .rows(&SqlCommand::BackupHeaders {
                backup_path: backup_path.clone(),
            })
            .or_catalog_error(|| {
                format!("Reading data from backup file {} failed", backup_path.display())
            })?;
        parse_headers(filename, &rows)
    }

    /// Every backup set of every file in the backup directory.
    pub fn scan(&self) -> Result<Vec<BackupHeader>> {
        let mut catalog = Vec::new();
        for filename in self.list_files()? {
            catalog.extend(self.headers(&filename)?);
        }
        info!(backup_sets = catalog.len(), "Scanned backup catalog");
        Ok(catalog)
    }

    /// Files recorded in a backup (`RESTORE FILELISTONLY`).
    pub fn file_list(&self, filename: &str) -> Result<Vec<FileDescriptor>> {
        let backup_path = self.backup_path(filename)?;
        let rows = self
            .sql
            .rows(&SqlCommand::BackupFileList {
                backup_path: backup_path.clone(),
            })
            .or_user_error(
                || format!("Restore filelist failure from path {}", backup_path.display()),
                "Check if you are restoring valid backup",
            )?;
        manifest::from_backup_file_list(&rows)
    }
}
