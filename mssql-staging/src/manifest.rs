//! File manifests: the physical file layout of a database, independent of
//! where its files live.

use crate::context::OperationContext;
use crate::fs::{JsonSidecar, RemoteFs};
use crate::{EngineError, Result};
use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Filegroup sentinel used by SQL Server listings and the sidecar format.
pub const NO_FILEGROUP: &str = "NULL";

pub const PRIMARY_DATA_FILE_ID: u32 = 1;
pub const PRIMARY_LOG_FILE_ID: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileType {
    Data,
    Log,
}

impl FileType {
    pub fn code(self) -> &'static str {
        match self {
            FileType::Data => "D",
            FileType::Log => "L",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "D" => Some(FileType::Data),
            "L" => Some(FileType::Log),
            _ => None,
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl Serialize for FileType {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.code())
    }
}

impl<'de> Deserialize<'de> for FileType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let code = String::deserialize(deserializer)?;
        FileType::from_code(&code)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown file type '{}'", code)))
    }
}

/// One file of a database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDescriptor {
    #[serde(rename = "logicalname")]
    pub logical_name: String,

    /// Base file name; the directory comes from the target mount path
    #[serde(rename = "physicalname")]
    pub physical_name: String,

    #[serde(rename = "filetype")]
    pub file_type: FileType,

    #[serde(rename = "groupname", with = "filegroup")]
    pub filegroup: Option<String>,

    #[serde(rename = "fileid")]
    pub file_id: u32,
}

impl FileDescriptor {
    pub fn is_primary(&self) -> bool {
        matches!(self.file_id, PRIMARY_DATA_FILE_ID | PRIMARY_LOG_FILE_ID)
    }
}

mod filegroup {
    use super::NO_FILEGROUP;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<String>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(value.as_deref().unwrap_or(NO_FILEGROUP))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.and_then(|name| super::normalize_filegroup(&name)))
    }
}

fn normalize_filegroup(name: &str) -> Option<String> {
    let name = name.trim();
    (!name.is_empty() && name != NO_FILEGROUP).then(|| name.to_string())
}

/// Point-in-time file layout handed to the host with a snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotManifest {
    pub db_files: Vec<FileDescriptor>,

    /// Start time of the backup the staging database was at, when known
    #[serde(default)]
    pub backup_time: Option<NaiveDateTime>,
}

impl SnapshotManifest {
    pub fn is_empty(&self) -> bool {
        self.db_files.is_empty()
    }
}

/// Last path component, for both Windows and POSIX separators.
pub fn basename(path: &str) -> &str {
    path.trim().rsplit(['/', '\\']).next().unwrap_or("")
}

/// Translate `RESTORE FILELISTONLY` rows.
pub fn from_backup_file_list(rows: &[Vec<String>]) -> Result<Vec<FileDescriptor>> {
    let files = rows
        .iter()
        .map(|cols| {
            if cols.len() < 7 {
                return Err(EngineError::InvalidManifest(format!(
                    "file list row has {} columns",
                    cols.len()
                )));
            }
            descriptor(&cols[0], &cols[1], &cols[2], &cols[3], &cols[6])
        })
        .collect::<Result<Vec<_>>>()?;
    validate(&files)?;
    Ok(files)
}

/// Translate rows of the live file catalog query
/// (`name|file_id|physical_name|type|filegroup`).
pub fn from_database_files(rows: &[Vec<String>]) -> Result<Vec<FileDescriptor>> {
    let files = rows
        .iter()
        .map(|cols| match cols.as_slice() {
            [logical, file_id, physical, kind, group] => {
                descriptor(logical, physical, kind, group, file_id)
            }
            _ => Err(EngineError::InvalidManifest(format!(
                "database file row has {} columns",
                cols.len()
            ))),
        })
        .collect::<Result<Vec<_>>>()?;
    validate(&files)?;
    Ok(files)
}

fn descriptor(
    logical: &str,
    physical: &str,
    kind: &str,
    group: &str,
    file_id: &str,
) -> Result<FileDescriptor> {
    let logical_name = logical.trim().to_string();
    let file_type = FileType::from_code(kind).ok_or_else(|| EngineError::UnknownFileType {
        code: kind.trim().to_string(),
        logical_name: logical_name.clone(),
    })?;
    let file_id = file_id
        .trim()
        .parse()
        .map_err(|_| EngineError::InvalidManifest(format!("bad file id '{}' for {}", file_id.trim(), logical_name)))?;

    Ok(FileDescriptor {
        logical_name,
        physical_name: basename(physical).to_string(),
        file_type,
        filegroup: normalize_filegroup(group),
        file_id,
    })
}

/// File IDs must be positive and unique within a manifest.
pub fn validate(files: &[FileDescriptor]) -> Result<()> {
    let mut seen = HashSet::new();
    for file in files {
        if file.file_id == 0 {
            return Err(EngineError::InvalidManifest(format!(
                "file {} has file id 0",
                file.logical_name
            )));
        }
        if !seen.insert(file.file_id) {
            return Err(EngineError::InvalidManifest(format!(
                "file id {} is used more than once",
                file.file_id
            )));
        }
    }
    Ok(())
}

/// Live file list of a stopped staging database, `{db}_filelist.json`.
pub struct FileListStore {
    sidecar: JsonSidecar<Vec<FileDescriptor>>,
}

impl FileListStore {
    pub fn new(ctx: Arc<OperationContext>) -> Self {
        let path = ctx
            .layout()
            .config_dir
            .join(format!("{}_filelist.json", ctx.database_name()));
        Self {
            sidecar: JsonSidecar::new(RemoteFs::new(ctx), path),
        }
    }

    pub fn load(&self) -> Result<Vec<FileDescriptor>> {
        let files = self.sidecar.load()?;
        validate(&files)?;
        Ok(files)
    }

    pub fn save(&self, files: &[FileDescriptor]) -> Result<()> {
        self.sidecar.save(&files.to_vec())
    }

    /// Whether a file list has been persisted.
    pub fn exists(&self) -> bool {
        self.sidecar.load().is_ok()
    }
}
