use std::path::{Path, PathBuf};

use gosling_common::{Error, Result};
use tracing::{debug, info};

use crate::model::AppConfig;

const CONFIG_FILE_NAMES: [&str; 3] = ["gosling.yml", "gosling.yaml", "gosling.toml"];

pub const ENV_DATABASE: &str = "GOSLING_DATABASE";
pub const ENV_DIR: &str = "GOSLING_DIR";
pub const ENV_TABLE: &str = "GOSLING_TABLE";

/// Loads `AppConfig` from YAML or TOML and layers environment overrides on top.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Read and parse a config file. The format is picked from the extension.
    pub fn load(path: &Path) -> Result<AppConfig> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;
        let config = Self::parse(path, &contents)?;
        info!("loaded config from {}", path.display());
        Ok(config)
    }

    fn parse(path: &Path, contents: &str) -> Result<AppConfig> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        match ext {
            "yml" | "yaml" => serde_yaml::from_str(contents)
                .map_err(|e| Error::Config(format!("YAML parse error: {e}"))),
            "toml" => {
                toml::from_str(contents).map_err(|e| Error::Config(format!("TOML parse error: {e}")))
            }
            other => Err(Error::Config(format!(
                "unsupported config extension: {other}"
            ))),
        }
    }

    /// Find a config file in `dir`, falling back to the user config directory
    /// (`~/.config/gosling` on Linux).
    pub fn discover(dir: &Path) -> Option<PathBuf> {
        let mut candidates = vec![dir.to_path_buf()];
        if let Some(user_dir) = dirs::config_dir() {
            candidates.push(user_dir.join("gosling"));
        }

        candidates.iter().find_map(|base| {
            CONFIG_FILE_NAMES
                .iter()
                .map(|name| base.join(name))
                .find(|p| p.is_file())
        })
    }

    /// Resolve the effective configuration: an explicit file wins, otherwise a
    /// discovered one, otherwise defaults. Environment overrides apply last.
    pub fn resolve(explicit: Option<&Path>, search_dir: &Path) -> Result<AppConfig> {
        let mut config = match explicit {
            Some(path) => Self::load(path)?,
            None => match Self::discover(search_dir) {
                Some(path) => Self::load(&path)?,
                None => {
                    debug!("no config file found, using defaults");
                    AppConfig::default()
                }
            },
        };
        Self::apply_env_overrides(&mut config, |key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn apply_env_overrides<F>(config: &mut AppConfig, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(db) = lookup(ENV_DATABASE).filter(|v| !v.is_empty()) {
            config.database.path = PathBuf::from(db);
        }
        if let Some(dir) = lookup(ENV_DIR).filter(|v| !v.is_empty()) {
            config.migrations.dir = PathBuf::from(dir);
        }
        if let Some(table) = lookup(ENV_TABLE).filter(|v| !v.is_empty()) {
            config.migrations.table = table;
        }
    }
}
