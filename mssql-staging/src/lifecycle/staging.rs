//! Staging database lifecycle: resync, incremental restores, snapshot
//! metadata and start/stop.

use super::database::InstanceDatabase;
use super::status::{StagingState, Status};
use crate::backup::{
    select_next_backup, BackupType, CatalogReader, CheckpointStore, RestoreCheckpoint, Selection,
    SelectionMode,
};
use crate::context::OperationContext;
use crate::manifest::{FileListStore, SnapshotManifest};
use crate::seed::SeedBuilder;
use crate::sql::{RecoveryMode, RestoreKind, SqlCommand};
use crate::{CommandResultExt, EngineError, Result};
use std::sync::Arc;
use tracing::{debug, info, warn};

const CHECK_OUTPUT: &str = "Check output for details";

pub struct StagingController {
    ctx: Arc<OperationContext>,
    db: InstanceDatabase,
    catalog: CatalogReader,
    checkpoints: CheckpointStore,
    file_lists: FileListStore,
    seed: SeedBuilder,
}

impl StagingController {
    pub fn new(ctx: Arc<OperationContext>) -> Self {
        Self {
            db: InstanceDatabase::new(ctx.clone()),
            catalog: CatalogReader::new(ctx.clone()),
            checkpoints: CheckpointStore::new(ctx.clone()),
            file_lists: FileListStore::new(ctx.clone()),
            seed: SeedBuilder::new(ctx.clone()),
            ctx,
        }
    }

    pub fn state(&self) -> Result<StagingState> {
        let state = match self.db.probe()? {
            Some(state) => state,
            None if self.file_lists.exists() => StagingState::Detached,
            None => StagingState::Absent,
        };
        debug!(database = %self.db.name(), state = %state, "Probed staging state");
        Ok(state)
    }

    pub fn status(&self) -> Status {
        self.db.status()
    }

    /// Restore the newest full backup over whatever staging database exists.
    pub fn resync(&self) -> Result<RestoreCheckpoint> {
        self.select_and_apply(SelectionMode::Resync)
    }

    /// Restore the next backup newer than the checkpoint.
    pub fn incremental(&self) -> Result<RestoreCheckpoint> {
        self.select_and_apply(SelectionMode::Incremental)
    }

    pub fn select_and_apply(&self, mode: SelectionMode) -> Result<RestoreCheckpoint> {
        self.db.ensure_dirs()?;

        let checkpoint = match mode {
            SelectionMode::Resync => None,
            SelectionMode::Incremental => {
                let state = self.state()?;
                if !state.accepts_restores() {
                    return Err(EngineError::InvalidState {
                        database: self.db.name().to_string(),
                        expected: "in standby",
                        actual: state.to_string(),
                    });
                }
                self.checkpoints.load()
            }
        };

        let catalog = self.catalog.scan()?;
        let selection = select_next_backup(&catalog, checkpoint.as_ref(), mode).map_err(|not_found| {
            let location = self
                .ctx
                .backup_location()
                .map(|p| p.display().to_string())
                .unwrap_or_default();
            not_found.into_error(&location)
        })?;
        info!(
            database = %self.db.name(),
            ?mode,
            filename = %selection.filename,
            position = selection.position,
            backup_type = ?selection.backup_type,
            "Selected backup"
        );

        if mode == SelectionMode::Resync && self.db.exists()? {
            self.db.drop_database()?;
        }
        self.restore(&selection)?;

        let checkpoint = selection.checkpoint();
        self.checkpoints.save(&checkpoint)?;
        Ok(checkpoint)
    }

    fn restore(&self, selection: &Selection) -> Result<()> {
        let backup_path = self.catalog.backup_path(&selection.filename)?;
        let db_dir = &self.ctx.layout().db_dir;
        let moves = self
            .catalog
            .file_list(&selection.filename)?
            .into_iter()
            .map(|f| {
                let target = db_dir.join(&f.physical_name);
                (f.logical_name, target)
            })
            .collect();

        let (recovery, action) = if self.ctx.for_upgrade() {
            (
                RecoveryMode::NoRecovery,
                "Check if you are restoring valid backup or if for_upgrade flag need to be set",
            )
        } else {
            (
                RecoveryMode::Standby(self.ctx.layout().standby_file()),
                "Check if you are restoring valid backup",
            )
        };
        let kind = match selection.backup_type {
            BackupType::Log => RestoreKind::Log,
            _ => RestoreKind::Database,
        };

        self.db.run(
            SqlCommand::Restore {
                database: self.db.name().to_string(),
                kind,
                backup_path: backup_path.clone(),
                position: selection.position,
                recovery,
                moves,
            },
            || format!("Restore from backup location {} failed", backup_path.display()),
            action,
        )?;
        info!(database = %self.db.name(), backup = %backup_path.display(), "Restored backup");
        Ok(())
    }

    /// Live file list plus the time of the last restored backup. Falls back
    /// to an empty manifest so the snapshot itself never fails here.
    pub fn capture_manifest(&self) -> SnapshotManifest {
        match self.db.files() {
            Ok(db_files) => {
                let backup_time = self.checkpoints.load().map(|c| c.backup);
                if backup_time.is_none() {
                    warn!(database = %self.db.name(), "Snapshot taken without a restore checkpoint");
                }
                SnapshotManifest {
                    db_files,
                    backup_time,
                }
            }
            Err(e) => {
                warn!(database = %self.db.name(), error = %e, "Capturing snapshot manifest failed, returning an empty one");
                SnapshotManifest::default()
            }
        }
    }

    /// Bring a detached staging database back into standby.
    ///
    /// A standby database cannot be attached, so a seed with the saved
    /// layout is backed up and restored over itself, its files are pointed
    /// at the real ones and the restore sequence is finished in standby.
    pub fn start_staging(&self) -> Result<()> {
        if self.ctx.for_upgrade() {
            info!(database = %self.db.name(), "for_upgrade is set, start staging skipped");
            return Ok(());
        }
        match self.state()? {
            StagingState::Detached => {}
            StagingState::Standby => {
                info!(database = %self.db.name(), "Staging database already in standby");
                return Ok(());
            }
            other => {
                return Err(EngineError::InvalidState {
                    database: self.db.name().to_string(),
                    expected: "detached",
                    actual: other.to_string(),
                })
            }
        }

        let files = self.file_lists.load().or_user_error(
            || format!("Reading the saved file list of {} failed", self.db.name()),
            CHECK_OUTPUT,
        )?;
        let database = self.db.name().to_string();
        let layout = self.ctx.layout();
        let seed_backup = layout.seed_dir.join(format!("seed_backup_{}", database));

        self.seed.cleanup()?;
        self.seed.build(&files)?;

        self.db.run(
            SqlCommand::BackupDatabase {
                database: database.clone(),
                backup_path: seed_backup.clone(),
            },
            || format!("Backup database for {} failed", database),
            CHECK_OUTPUT,
        )?;
        self.db.drop_database()?;
        self.db.run(
            SqlCommand::RestoreSeed {
                database: database.clone(),
                backup_path: seed_backup,
            },
            || format!("Restore seed database for {} failed", database),
            CHECK_OUTPUT,
        )?;
        self.seed.relocate_files(&files, &layout.db_dir)?;
        self.db.run(
            SqlCommand::Recover {
                database: database.clone(),
                recovery: RecoveryMode::NoRecovery,
            },
            || format!("Restore norecovery staging database {} failed", database),
            CHECK_OUTPUT,
        )?;
        self.db.run(
            SqlCommand::Recover {
                database: database.clone(),
                recovery: RecoveryMode::Standby(layout.standby_file()),
            },
            || format!("Switch to standby staging database {} failed", database),
            CHECK_OUTPUT,
        )?;
        self.seed.cleanup()?;

        info!(database = %database, state = %StagingState::Standby, "Staging started");
        Ok(())
    }

    /// Save the live file list and detach the staging database.
    pub fn stop_staging(&self) -> Result<()> {
        if self.ctx.for_upgrade() {
            info!(database = %self.db.name(), "for_upgrade is set, stop staging skipped");
            return Ok(());
        }
        match self.state()? {
            StagingState::Standby | StagingState::Online => {}
            StagingState::Detached => {
                info!(database = %self.db.name(), "Staging database already detached");
                return Ok(());
            }
            other => {
                return Err(EngineError::InvalidState {
                    database: self.db.name().to_string(),
                    expected: "in standby or online",
                    actual: other.to_string(),
                })
            }
        }

        let files = self.db.files()?;
        self.file_lists.save(&files)?;
        self.db.detach()?;
        info!(database = %self.db.name(), files = files.len(), "Staging stopped");
        Ok(())
    }
}
