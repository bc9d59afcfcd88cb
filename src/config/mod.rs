//! Configuration management for idae

pub mod schema;

pub use schema::{Config, LogFormat};

use crate::error::{IdaeError, IdaeResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new config manager with default path
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }

    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("idae")
            .join("config.toml")
    }

    /// Platform cache directory for environments
    pub fn default_cache_dir() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("idae")
    }

    /// Load configuration, falling back to defaults if the file is missing
    pub async fn load(&self) -> IdaeResult<Config> {
        if !self.config_path.exists() {
            debug!("Config file not found, using defaults");
            return Ok(Config::default());
        }

        self.load_from_file(&self.config_path).await
    }

    /// Load configuration from a specific file
    pub async fn load_from_file(&self, path: &Path) -> IdaeResult<Config> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| IdaeError::io(format!("reading config from {}", path.display()), e))?;

        toml::from_str(&content).map_err(|e| IdaeError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Pick the cache root for this invocation
///
/// `--local` wins, then an explicit directory (flag or `IDAE_CACHE_DIR`),
/// then `cache.dir` from the config file, then the platform cache directory.
pub fn cache_root(config: &Config, explicit: Option<&Path>, local: bool, cwd: &Path) -> PathBuf {
    if local {
        return cwd.join(&config.cache.local_dir_name);
    }
    explicit
        .map(Path::to_path_buf)
        .or_else(|| config.cache.dir.clone())
        .unwrap_or_else(ConfigManager::default_cache_dir)
}
