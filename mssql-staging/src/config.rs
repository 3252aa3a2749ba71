//! Configuration management for the staging engine.
//!
//! Loads configuration from a TOML file; secrets can be overridden from the
//! environment (a `.env` file is honoured).

use crate::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const INSTANCE_PASSWORD_ENV: &str = "MSSQL_STAGING_INSTANCE_PASSWORD";
pub const SSH_PASSWORD_ENV: &str = "MSSQL_STAGING_SSH_PASSWORD";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub connection: ConnectionConfig,
    pub repository: RepositoryConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub log: LogConfig,
}

/// How commands reach the database host.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ConnectionConfig {
    Local,
    Ssh {
        host: String,

        #[serde(default = "default_ssh_port")]
        port: u16,

        username: String,

        /// Password, or passphrase when `private_key` is set
        #[serde(default)]
        password: Option<String>,

        #[serde(default)]
        private_key: Option<PathBuf>,
    },
}

/// SQL Server installation on the host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Directory containing `sqlcmd`
    #[serde(default = "default_client_path")]
    pub client_path: PathBuf,

    /// Owner of the SQL Server installation; files are written as this user
    pub uid: u32,
    pub gid: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseRole {
    /// Staging copy fed from native backups
    Staging,
    /// Virtual database provisioned from a snapshot
    Virtual,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub role: DatabaseRole,

    /// Logical database name; staging databases get a `_staging` suffix
    pub name: String,

    pub mount_path: PathBuf,

    /// Directory holding native backups (staging only)
    #[serde(default)]
    pub backup_location: Option<PathBuf>,

    /// Glob of backup files inside `backup_location`
    #[serde(default = "default_backup_pattern")]
    pub backup_pattern: String,

    pub instance_user: String,

    #[serde(default)]
    pub instance_password: String,

    /// Backups come from an older SQL Server version
    #[serde(default)]
    pub for_upgrade: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// Default values
fn default_ssh_port() -> u16 {
    22
}

fn default_client_path() -> PathBuf {
    PathBuf::from("/opt/mssql-tools/bin")
}

fn default_backup_pattern() -> String {
    "*".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from a TOML file, then apply environment overrides.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml(&content)?;

        let _ = dotenvy::dotenv();
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| EngineError::Config(e.to_string()))
    }

    /// Replace secrets with values found through `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(password) = lookup(INSTANCE_PASSWORD_ENV) {
            self.database.instance_password = password;
        }
        if let ConnectionConfig::Ssh { password, .. } = &mut self.connection {
            if let Some(value) = lookup(SSH_PASSWORD_ENV) {
                *password = Some(value);
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.database.name.trim().is_empty() {
            return Err(EngineError::Config("database.name must not be empty".into()));
        }
        if !self.database.mount_path.is_absolute() {
            return Err(EngineError::Config(format!(
                "database.mount_path must be absolute, got {}",
                self.database.mount_path.display()
            )));
        }
        if self.database.role == DatabaseRole::Staging && self.database.backup_location.is_none() {
            return Err(EngineError::Config(
                "database.backup_location is required for staging databases".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STAGING: &str = r#"
[connection]
kind = "ssh"
host = "sql01"
username = "delphix"
password = "from-file"

[repository]
uid = 999
gid = 999

[database]
role = "staging"
name = "sales"
mount_path = "/mnt/provision/sales"
backup_location = "/backups/sales"
instance_user = "sa"
"#;

    #[test]
    fn test_parse_with_defaults() {
        let config = Config::from_toml(STAGING).unwrap();

        assert!(matches!(config.connection, ConnectionConfig::Ssh { port: 22, .. }));
        assert_eq!(config.repository.client_path, PathBuf::from("/opt/mssql-tools/bin"));
        assert_eq!(config.database.role, DatabaseRole::Staging);
        assert_eq!(config.database.backup_pattern, "*");
        assert!(!config.database.for_upgrade);
        assert_eq!(config.log.level, "info");
        config.validate().unwrap();
    }

    #[test]
    fn test_env_overrides_secrets() {
        let mut config = Config::from_toml(STAGING).unwrap();
        config.apply_overrides(|key| match key {
            INSTANCE_PASSWORD_ENV => Some("instance".to_string()),
            SSH_PASSWORD_ENV => Some("ssh".to_string()),
            _ => None,
        });

        assert_eq!(config.database.instance_password, "instance");
        match config.connection {
            ConnectionConfig::Ssh { password, .. } => assert_eq!(password.as_deref(), Some("ssh")),
            ConnectionConfig::Local => panic!("expected ssh connection"),
        }
    }

    #[test]
    fn test_staging_requires_backup_location() {
        let toml = STAGING.replace("backup_location = \"/backups/sales\"\n", "");
        let config = Config::from_toml(&toml).unwrap();
        assert!(matches!(config.validate(), Err(EngineError::Config(_))));
    }

    #[test]
    fn test_local_virtual_config() {
        let config = Config::from_toml(
            r#"
[connection]
kind = "local"

[repository]
uid = 0
gid = 0

[database]
role = "virtual"
name = "sales_dev"
mount_path = "/mnt/vdb/sales_dev"
instance_user = "sa"
"#,
        )
        .unwrap();

        assert!(matches!(config.connection, ConnectionConfig::Local));
        config.validate().unwrap();
    }
}
