//! Configuration loading and data folder resolution

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable overriding the data folder
pub const DATA_FOLDER_ENV: &str = "TUNECHECK_DATA_FOLDER";

/// Bootstrap configuration read from the TOML file
///
/// Only the keys needed before the engine starts live here. Unknown keys
/// (detector tuning sections) are ignored so the same file can carry both.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Data folder holding the index snapshot and reference material
    #[serde(default)]
    pub data_folder: Option<PathBuf>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log filter directive (trace, debug, info, warn, error or a full EnvFilter string)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Default config file location: `<config_dir>/tunecheck/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("tunecheck").join("config.toml"))
}

/// OS-dependent default data folder
pub fn default_data_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("tunecheck"))
        .unwrap_or_else(|| PathBuf::from("./tunecheck_data"))
}

/// Load a TOML file into any deserializable config type
///
/// A missing file is not an error: the caller gets `None` and falls back to defaults.
pub fn load_toml_file<T>(path: &Path) -> Result<Option<T>>
where
    T: for<'de> Deserialize<'de>,
{
    if !path.exists() {
        debug!(path = %path.display(), "Config file not found");
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)?;
    let parsed = toml::from_str(&content)?;
    Ok(Some(parsed))
}

/// Write a TOML config atomically (temp file in the same directory, then rename)
pub fn write_toml_config<T: Serialize>(config: &T, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent)?;

    let tmp_path = parent.join(format!(
        ".{}.tmp",
        path.file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("config.toml")
    ));
    std::fs::write(&tmp_path, content)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Data folder resolution, highest priority first:
/// 1. Command-line argument
/// 2. `TUNECHECK_DATA_FOLDER` environment variable
/// 3. `data_folder` key in the TOML config file
/// 4. OS-dependent default
pub struct DataFolderResolver {
    module_name: String,
    cli_arg: Option<PathBuf>,
    config_path: Option<PathBuf>,
}

impl DataFolderResolver {
    pub fn new(module_name: impl Into<String>) -> Self {
        Self {
            module_name: module_name.into(),
            cli_arg: None,
            config_path: default_config_path(),
        }
    }

    /// Command-line override
    pub fn with_cli_arg(mut self, path: Option<PathBuf>) -> Self {
        self.cli_arg = path;
        self
    }

    /// Explicit config file instead of the default location
    pub fn with_config_path(mut self, path: Option<PathBuf>) -> Self {
        if path.is_some() {
            self.config_path = path;
        }
        self
    }

    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.cli_arg {
            return path.clone();
        }

        if let Ok(path) = std::env::var(DATA_FOLDER_ENV) {
            if !path.trim().is_empty() {
                return PathBuf::from(path);
            }
        }

        if let Some(config_path) = &self.config_path {
            match load_toml_file::<TomlConfig>(config_path) {
                Ok(Some(TomlConfig {
                    data_folder: Some(folder),
                    ..
                })) => return folder,
                Ok(_) => {}
                Err(e) => warn!(
                    module = %self.module_name,
                    path = %config_path.display(),
                    error = %e,
                    "Ignoring unreadable config file"
                ),
            }
        }

        default_data_folder()
    }
}

/// Creates the data folder layout on first use
pub struct DataFolderInitializer {
    data_folder: PathBuf,
}

impl DataFolderInitializer {
    pub fn new(data_folder: PathBuf) -> Self {
        Self { data_folder }
    }

    pub fn ensure_directory_exists(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_folder)?;
        Ok(())
    }

    pub fn data_folder(&self) -> &Path {
        &self.data_folder
    }

    /// Resolve a possibly-relative path against the data folder
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.data_folder.join(path)
        }
    }
}
