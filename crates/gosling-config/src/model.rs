use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub const DEFAULT_VERSION_TABLE: &str = "goose_db_version";

/// Top-level configuration, as read from `gosling.yml` or `gosling.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub migrations: MigrationsConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Driver name. Only `sqlite` can be opened by the bundled CLI.
    pub driver: String,
    /// SQL dialect used for the version table. Defaults to the driver name.
    pub dialect: Option<String>,
    /// Path of the database file (or `:memory:`).
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: "sqlite".to_string(),
            dialect: None,
            path: PathBuf::from("gosling.db"),
        }
    }
}

impl DatabaseConfig {
    pub fn dialect_name(&self) -> &str {
        self.dialect.as_deref().unwrap_or(&self.driver)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationsConfig {
    pub dir: PathBuf,
    pub table: String,
    /// Per-migration timeout; `None` disables it.
    pub timeout_secs: Option<u64>,
}

impl Default for MigrationsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("migrations"),
            table: DEFAULT_VERSION_TABLE.to_string(),
            timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default filter directive, overridden by `RUST_LOG`.
    pub level: String,
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
