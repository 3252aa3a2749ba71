//! Virtual database lifecycle: provision from a snapshot manifest,
//! reattach after rewind, detach, start and stop.

use super::database::InstanceDatabase;
use super::status::Status;
use crate::context::{Layout, OperationContext};
use crate::manifest::{self, SnapshotManifest};
use crate::seed::SeedBuilder;
use crate::sql::SqlCommand;
use crate::{EngineError, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

pub struct VirtualController {
    ctx: Arc<OperationContext>,
    db: InstanceDatabase,
    seed: SeedBuilder,
}

impl VirtualController {
    pub fn new(ctx: Arc<OperationContext>) -> Self {
        Self {
            db: InstanceDatabase::new(ctx.clone()),
            seed: SeedBuilder::new(ctx.clone()),
            ctx,
        }
    }

    fn check_manifest(snapshot: &SnapshotManifest) -> Result<()> {
        if snapshot.is_empty() {
            return Err(EngineError::InvalidManifest(
                "snapshot manifest lists no database files".to_string(),
            ));
        }
        manifest::validate(&snapshot.db_files)
    }

    /// Make sure the database name is free before creating it.
    fn prepare(&self) -> Result<()> {
        self.db.ensure_dirs()?;
        if self.db.exists()? {
            return Err(EngineError::DatabaseExists(self.db.name().to_string()));
        }
        Ok(())
    }

    /// Create the virtual database over the snapshot files mounted at
    /// `mount_path`.
    pub fn provision(&self, manifest: &SnapshotManifest, mount_path: &Path) -> Result<()> {
        Self::check_manifest(manifest)?;
        self.prepare()?;

        let target = Layout::new(mount_path);
        self.seed.build(&manifest.db_files)?;
        self.db.set_offline()?;
        self.seed.relocate_files(&manifest.db_files, &target.db_dir)?;
        self.db.set_online()?;
        self.seed.cleanup()?;

        info!(database = %self.db.name(), mount_path = %mount_path.display(), "Provisioned virtual database");
        Ok(())
    }

    /// Attach the files already present under the mount path.
    pub fn reattach(&self, manifest: &SnapshotManifest) -> Result<()> {
        Self::check_manifest(manifest)?;
        self.prepare()?;

        let db_dir = &self.ctx.layout().db_dir;
        let files = manifest
            .db_files
            .iter()
            .map(|f| db_dir.join(&f.physical_name))
            .collect();
        self.db.run(
            SqlCommand::AttachDatabase {
                database: self.db.name().to_string(),
                files,
            },
            || format!("Attached a VDB {} failed", self.db.name()),
            "Please check output for detailed error",
        )?;

        info!(database = %self.db.name(), "Reattached virtual database");
        Ok(())
    }

    /// Detach, never drop: the data files belong to the storage layer.
    pub fn unconfigure(&self) -> Result<()> {
        if self.db.exists()? {
            self.db.detach()
        } else {
            info!(database = %self.db.name(), "Database not in instance, nothing to detach");
            Ok(())
        }
    }

    pub fn start(&self) -> Result<()> {
        self.db.set_online()?;
        info!(database = %self.db.name(), "Virtual database online");
        Ok(())
    }

    pub fn stop(&self) -> Result<()> {
        self.db.set_offline()?;
        info!(database = %self.db.name(), "Virtual database offline");
        Ok(())
    }

    pub fn status(&self) -> Status {
        self.db.status()
    }

    pub fn capture_manifest(&self) -> SnapshotManifest {
        match self.db.files() {
            Ok(db_files) => SnapshotManifest {
                db_files,
                backup_time: None,
            },
            Err(e) => {
                warn!(database = %self.db.name(), error = %e, "Capturing snapshot manifest failed, returning an empty one");
                SnapshotManifest::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::scripted::ScriptedExecutor;
    use crate::manifest::FileDescriptor;
    use crate::testing::{data_file, primary_pair, virtual_context};

    fn snapshot() -> SnapshotManifest {
        let mut db_files = primary_pair();
        db_files.push(data_file("archive", 4, Some("ARCHIVE")));
        db_files.push(data_file("bare", 5, None));
        SnapshotManifest {
            db_files,
            backup_time: None,
        }
    }

    /// Live catalog rows built from the `MODIFY FILE` commands that were
    /// issued, so paths come from what the engine actually did.
    fn live_rows_from(executor: &ScriptedExecutor, manifest: &[FileDescriptor]) -> String {
        manifest
            .iter()
            .map(|f| {
                let needle = format!("MODIFY FILE (NAME = N'{}', FILENAME = N'", f.logical_name);
                let command = executor.commands_matching(&needle).remove(0);
                let start = command.find(&needle).unwrap() + needle.len();
                let path = &command[start..start + command[start..].find('\'').unwrap()];
                format!(
                    "{}|{}|{}|{}|{}\n",
                    f.logical_name,
                    f.file_id,
                    path,
                    f.file_type,
                    f.filegroup.as_deref().unwrap_or("NULL")
                )
            })
            .collect()
    }

    #[test]
    fn test_provision_then_capture_round_trips() {
        let executor = ScriptedExecutor::new();
        let ctx = virtual_context(executor.clone());
        let vdb = VirtualController::new(ctx.clone());
        let manifest = snapshot();

        vdb.provision(&manifest, &ctx.layout().mount_path).unwrap();

        let offline = executor.position("SET OFFLINE").unwrap();
        let first_move = executor.position("MODIFY FILE").unwrap();
        let online = executor.position("SET ONLINE").unwrap();
        assert!(executor.position("CREATE DATABASE [sales_dev]").unwrap() < offline);
        assert!(offline < first_move && first_move < online);
        assert!(executor.commands().last().unwrap().contains("rm -rf"));

        let rows = live_rows_from(&executor, &manifest.db_files);
        let captured = VirtualController::new(virtual_context(
            ScriptedExecutor::new().respond("sys.database_files", &rows),
        ))
        .capture_manifest();

        assert_eq!(captured.db_files, manifest.db_files);
        assert_eq!(captured.backup_time, None);
    }

    #[test]
    fn test_provision_refuses_existing_database() {
        let executor = ScriptedExecutor::new().respond("SELECT name FROM sys.databases", "sales_dev\n");
        let ctx = virtual_context(executor.clone());
        let err = VirtualController::new(ctx.clone())
            .provision(&snapshot(), &ctx.layout().mount_path)
            .unwrap_err();

        assert!(matches!(err, EngineError::DatabaseExists(_)));
        assert!(executor.commands_matching("CREATE DATABASE").is_empty());
    }

    #[test]
    fn test_provision_rejects_empty_manifest() {
        let executor = ScriptedExecutor::new();
        let ctx = virtual_context(executor.clone());
        let err = VirtualController::new(ctx.clone())
            .provision(&SnapshotManifest::default(), &ctx.layout().mount_path)
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidManifest(_)));
        assert!(executor.commands().is_empty());
    }

    #[test]
    fn test_reattach_attaches_every_file() {
        let executor = ScriptedExecutor::new();
        VirtualController::new(virtual_context(executor.clone()))
            .reattach(&snapshot())
            .unwrap();

        let attach = executor.commands_matching("FOR ATTACH").remove(0);
        for name in ["sales.mdf", "sales_log.ldf", "archive.ndf", "bare.ndf"] {
            assert!(attach.contains(&format!("(FILENAME = N'/mnt/provision/sales_dev/db/{}')", name)));
        }
        assert!(executor.commands_matching("CREATE DATABASE [sales_dev] ON PRIMARY").is_empty());
    }

    #[test]
    fn test_unconfigure_detaches_only_when_present() {
        let executor = ScriptedExecutor::new();
        VirtualController::new(virtual_context(executor.clone()))
            .unconfigure()
            .unwrap();
        assert!(executor.commands_matching("sp_detach_db").is_empty());

        let executor = ScriptedExecutor::new().respond("SELECT name FROM sys.databases", "sales_dev\n");
        VirtualController::new(virtual_context(executor.clone()))
            .unconfigure()
            .unwrap();
        assert_eq!(executor.commands_matching("sp_detach_db").len(), 1);
        assert!(executor.commands_matching("DROP DATABASE").is_empty());
    }

    #[test]
    fn test_start_stop() {
        let executor = ScriptedExecutor::new();
        let vdb = VirtualController::new(virtual_context(executor.clone()));
        vdb.stop().unwrap();
        vdb.start().unwrap();
        assert!(executor.commands()[0].contains("SET OFFLINE WITH ROLLBACK IMMEDIATE"));
        assert!(executor.commands()[1].contains("SET ONLINE"));
    }
}
