//! Restore progress marker kept in `{db}_last_backup.json`.

use crate::context::OperationContext;
use crate::fs::{JsonSidecar, RemoteFs};
use crate::Result;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Last backup set successfully restored into the staging database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreCheckpoint {
    /// Start time of the restored backup set
    #[serde(with = "timestamp")]
    pub backup: NaiveDateTime,
    pub filename: String,
    pub position: u32,
}

mod timestamp {
    use crate::backup::catalog::HEADER_TIMESTAMP_FORMAT;
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

    pub fn serialize<S: Serializer>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(raw.trim(), HEADER_TIMESTAMP_FORMAT)
            .map_err(serde::de::Error::custom)
    }
}

pub struct CheckpointStore {
    sidecar: JsonSidecar<RestoreCheckpoint>,
}

impl CheckpointStore {
    pub fn new(ctx: Arc<OperationContext>) -> Self {
        let path = ctx
            .layout()
            .config_dir
            .join(format!("{}_last_backup.json", ctx.database_name()));
        Self {
            sidecar: JsonSidecar::new(RemoteFs::new(ctx), path),
        }
    }

    /// The stored checkpoint; a missing or unreadable file means none.
    pub fn load(&self) -> Option<RestoreCheckpoint> {
        match self.sidecar.load() {
            Ok(checkpoint) => Some(checkpoint),
            Err(e) => {
                warn!(
                    path = %self.sidecar.path().display(),
                    error = %e,
                    "No usable restore checkpoint, treating as first restore"
                );
                None
            }
        }
    }

    pub fn save(&self, checkpoint: &RestoreCheckpoint) -> Result<()> {
        self.sidecar.save(checkpoint)?;
        info!(
            filename = %checkpoint.filename,
            position = checkpoint.position,
            backup = %checkpoint.backup,
            "Saved restore checkpoint"
        );
        Ok(())
    }
}
