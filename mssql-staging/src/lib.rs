//! SQL Server staging engine library
//!
//! Keeps a staging copy of a database up to date from native backups and
//! rebuilds databases from file manifests for virtual copies.

pub mod backup;
pub mod config;
pub mod context;
pub mod executor;
pub mod fs;
pub mod lifecycle;
pub mod manifest;
pub mod seed;
pub mod sql;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use context::OperationContext;
pub use utils::errors::{CommandResultExt, EngineError, Result};

#[cfg(test)]
pub(crate) mod testing {
    use crate::config::Config;
    use crate::context::OperationContext;
    use crate::executor::scripted::ScriptedExecutor;
    use crate::manifest::{FileDescriptor, FileType};
    use std::sync::Arc;

    fn context(toml: &str, executor: ScriptedExecutor) -> Arc<OperationContext> {
        let config = Config::from_toml(toml).unwrap();
        config.validate().unwrap();
        Arc::new(OperationContext::new(config, Arc::new(executor), None))
    }

    fn staging_toml(for_upgrade: bool) -> String {
        format!(
            r#"
[connection]
kind = "local"

[repository]
uid = 999
gid = 999

[database]
role = "staging"
name = "sales"
mount_path = "/mnt/provision/sales"
backup_location = "/backups/sales"
instance_user = "sa"
instance_password = "secret"
for_upgrade = {}
"#,
            for_upgrade
        )
    }

    pub fn staging_context(executor: ScriptedExecutor) -> Arc<OperationContext> {
        context(&staging_toml(false), executor)
    }

    pub fn staging_upgrade_context(executor: ScriptedExecutor) -> Arc<OperationContext> {
        context(&staging_toml(true), executor)
    }

    pub fn virtual_context(executor: ScriptedExecutor) -> Arc<OperationContext> {
        context(
            r#"
[connection]
kind = "local"

[repository]
uid = 999
gid = 999

[database]
role = "virtual"
name = "sales_dev"
mount_path = "/mnt/provision/sales_dev"
instance_user = "sa"
instance_password = "secret"
"#,
            executor,
        )
    }

    /// A `RESTORE HEADERONLY` row with the columns the catalog reads filled in.
    pub fn header_row(backup_type: &str, position: u32, database: &str, started: &str) -> Vec<String> {
        let mut cols = vec![String::new(); 20];
        cols[0] = "backup".into();
        cols[2] = backup_type.into();
        cols[5] = position.to_string();
        cols[9] = database.into();
        cols[17] = started.into();
        cols
    }

    pub fn data_file(name: &str, file_id: u32, filegroup: Option<&str>) -> FileDescriptor {
        FileDescriptor {
            logical_name: name.into(),
            physical_name: format!("{}.ndf", name),
            file_type: FileType::Data,
            filegroup: filegroup.map(str::to_string),
            file_id,
        }
    }

    pub fn log_file(name: &str, file_id: u32) -> FileDescriptor {
        FileDescriptor {
            logical_name: name.into(),
            physical_name: format!("{}.ldf", name),
            file_type: FileType::Log,
            filegroup: None,
            file_id,
        }
    }

    /// `sales.mdf` (id 1, PRIMARY) and `sales_log.ldf` (id 2).
    pub fn primary_pair() -> Vec<FileDescriptor> {
        let mut data = data_file("sales", 1, Some("PRIMARY"));
        data.physical_name = "sales.mdf".into();
        vec![data, log_file("sales_log", 2)]
    }
}
