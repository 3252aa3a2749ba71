//! Per-operation context shared by every engine component.
//!
//! Built once from [`Config`] at the start of an operation and never mutated
//! afterwards: connection, credentials, directory layout, sudo decision and
//! the flags that change engine behaviour all live here.

use crate::config::{Config, DatabaseRole};
use crate::executor::{self, CommandExecutor};
use crate::fs;
use crate::{EngineError, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Directories the engine uses beneath a mount path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub mount_path: PathBuf,
    /// JSON sidecar state
    pub config_dir: PathBuf,
    /// Final location of database files
    pub db_dir: PathBuf,
    /// Private scratch area for seed databases and placeholder files
    pub seed_dir: PathBuf,
}

impl Layout {
    pub fn new(mount_path: &Path) -> Self {
        Self {
            mount_path: mount_path.to_path_buf(),
            config_dir: mount_path.join(".config"),
            db_dir: mount_path.join("db"),
            seed_dir: mount_path.join(".seed"),
        }
    }

    /// Standby undo file used by every standby restore.
    pub fn standby_file(&self) -> PathBuf {
        self.db_dir.join("standby.bak")
    }
}

pub struct OperationContext {
    config: Config,
    executor: Arc<dyn CommandExecutor>,
    layout: Layout,
    sudo_uid: Option<u32>,
}

impl OperationContext {
    /// Open the configured connection and decide whether file commands need
    /// to run as the repository owner.
    pub fn connect(config: Config) -> Result<Arc<Self>> {
        let executor = executor::from_config(&config.connection)?;
        let sudo = fs::needs_sudo(executor.as_ref(), config.repository.uid, config.repository.gid)?;
        let sudo_uid = sudo.then_some(config.repository.uid);
        Ok(Arc::new(Self::new(config, executor, sudo_uid)))
    }

    pub fn new(config: Config, executor: Arc<dyn CommandExecutor>, sudo_uid: Option<u32>) -> Self {
        let layout = Layout::new(&config.database.mount_path);
        Self {
            config,
            executor,
            layout,
            sudo_uid,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn executor(&self) -> &dyn CommandExecutor {
        self.executor.as_ref()
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn sudo_uid(&self) -> Option<u32> {
        self.sudo_uid
    }

    pub fn role(&self) -> DatabaseRole {
        self.config.database.role
    }

    pub fn for_upgrade(&self) -> bool {
        self.config.database.for_upgrade
    }

    /// Logical database name, used to key sidecar files.
    pub fn database_name(&self) -> &str {
        &self.config.database.name
    }

    /// Name of the database inside the SQL Server instance.
    pub fn target_database(&self) -> String {
        match self.role() {
            DatabaseRole::Staging => format!("{}_staging", self.config.database.name),
            DatabaseRole::Virtual => self.config.database.name.clone(),
        }
    }

    pub fn backup_location(&self) -> Result<&Path> {
        self.config
            .database
            .backup_location
            .as_deref()
            .ok_or_else(|| EngineError::Config("database.backup_location is not set".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::scripted::ScriptedExecutor;

    #[test]
    fn test_layout_paths() {
        let layout = Layout::new(Path::new("/mnt/provision/sales"));
        assert_eq!(layout.config_dir, PathBuf::from("/mnt/provision/sales/.config"));
        assert_eq!(layout.db_dir, PathBuf::from("/mnt/provision/sales/db"));
        assert_eq!(layout.seed_dir, PathBuf::from("/mnt/provision/sales/.seed"));
        assert_eq!(layout.standby_file(), PathBuf::from("/mnt/provision/sales/db/standby.bak"));
    }

    #[test]
    fn test_target_database_per_role() {
        let staging = crate::testing::staging_context(ScriptedExecutor::new());
        assert_eq!(staging.target_database(), "sales_staging");
        assert_eq!(staging.database_name(), "sales");

        let virtual_db = crate::testing::virtual_context(ScriptedExecutor::new());
        assert_eq!(virtual_db.target_database(), "sales_dev");
        assert!(virtual_db.backup_location().is_err());
    }
}
