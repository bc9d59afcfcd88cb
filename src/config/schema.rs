//! Configuration schema for idae
//!
//! Configuration is stored at `~/.config/idae/config.toml`

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Interpreter settings
    pub python: PythonConfig,

    /// Environment cache settings
    pub cache: CacheConfig,
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// General application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: LogFormat,
}

/// Interpreter settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PythonConfig {
    /// Interpreter used when a script has no version constraint
    pub default: String,
}

impl Default for PythonConfig {
    fn default() -> Self {
        Self {
            default: "python3".to_string(),
        }
    }
}

/// Environment cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache root (defaults to the platform cache directory)
    pub dir: Option<PathBuf>,

    /// Directory name used under the working directory with `--local`
    pub local_dir_name: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: None,
            local_dir_name: ".idae".to_string(),
        }
    }
}
