//! Order in which seed files are created so that SQL Server hands out the
//! same file IDs the manifest records.

use crate::manifest::{self, FileDescriptor, FileType, PRIMARY_DATA_FILE_ID, PRIMARY_LOG_FILE_ID};
use crate::{EngineError, Result};
use std::collections::BTreeSet;

/// First file ID available after the primary data and log files.
const FIRST_SECONDARY_ID: u32 = 3;

/// Filegroup every database already has.
const PRIMARY_FILEGROUP: &str = "PRIMARY";

/// One file added after the primary pair, in creation order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Slot {
    /// Throwaway data file consuming an ID missing from the manifest
    Placeholder { file_id: u32 },
    File(FileDescriptor),
}

impl Slot {
    pub fn file_id(&self) -> u32 {
        match self {
            Slot::Placeholder { file_id } => *file_id,
            Slot::File(file) => file.file_id,
        }
    }
}

/// Logical and physical name of the placeholder for `file_id`.
pub fn placeholder_name(file_id: u32) -> String {
    format!("dummy_{}", file_id)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedPlan {
    pub primary_data: FileDescriptor,
    pub primary_log: FileDescriptor,
    /// Filegroups to create, sorted by name
    pub filegroups: Vec<String>,
    pub slots: Vec<Slot>,
}

impl SeedPlan {
    pub fn new(files: &[FileDescriptor]) -> Result<Self> {
        manifest::validate(files)?;

        let primary = |file_id: u32, file_type: FileType| -> Result<FileDescriptor> {
            files
                .iter()
                .find(|f| f.file_id == file_id)
                .filter(|f| f.file_type == file_type)
                .cloned()
                .ok_or_else(|| {
                    EngineError::InvalidManifest(format!(
                        "file id {} must be the primary {} file",
                        file_id,
                        if file_type == FileType::Data { "data" } else { "log" }
                    ))
                })
        };
        let primary_data = primary(PRIMARY_DATA_FILE_ID, FileType::Data)?;
        let primary_log = primary(PRIMARY_LOG_FILE_ID, FileType::Log)?;

        let mut rest: Vec<&FileDescriptor> = files.iter().filter(|f| !f.is_primary()).collect();
        rest.sort_by_key(|f| f.file_id);

        let filegroups: BTreeSet<String> = rest
            .iter()
            .filter_map(|f| f.filegroup.clone())
            .filter(|g| !g.eq_ignore_ascii_case(PRIMARY_FILEGROUP))
            .collect();

        let mut slots = Vec::with_capacity(rest.len());
        let mut next_expected_id = FIRST_SECONDARY_ID;
        for file in rest {
            for file_id in next_expected_id..file.file_id {
                slots.push(Slot::Placeholder { file_id });
            }
            slots.push(Slot::File(file.clone()));
            next_expected_id = file.file_id + 1;
        }

        Ok(Self {
            primary_data,
            primary_log,
            filegroups: filegroups.into_iter().collect(),
            slots,
        })
    }

    pub fn placeholder_ids(&self) -> Vec<u32> {
        self.slots
            .iter()
            .filter_map(|s| match s {
                Slot::Placeholder { file_id } => Some(*file_id),
                Slot::File(_) => None,
            })
            .collect()
    }

    /// File IDs left in the database after placeholders are removed,
    /// assuming the engine numbers new files sequentially from 3.
    pub fn simulate_final_ids(&self) -> BTreeSet<u32> {
        let mut ids: BTreeSet<u32> = [PRIMARY_DATA_FILE_ID, PRIMARY_LOG_FILE_ID].into();
        let mut placeholders = Vec::new();
        let mut next = FIRST_SECONDARY_ID;
        for slot in &self.slots {
            let assigned = next;
            next += 1;
            match slot {
                Slot::Placeholder { .. } => placeholders.push(assigned),
                Slot::File(_) => {}
            }
            ids.insert(assigned);
        }
        for id in placeholders {
            ids.remove(&id);
        }
        ids
    }
}
