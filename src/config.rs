//! Configuration for observers, download tracking and logging.
//!
//! Layered with `figment`:
//! - Default values
//! - TOML configuration file (`.pathwatch/settings.toml`)
//! - Environment variable overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `PATHWATCH_` and use double
//! underscores to separate nested levels:
//! - `PATHWATCH_OBSERVER__NOTIFY_ON_ATTACH=true` sets `observer.notify_on_attach`
//! - `PATHWATCH_LOGGING__DEFAULT=debug` sets `logging.default`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::download::SearchScope;

/// Directory holding the settings file.
pub const CONFIG_DIR: &str = ".pathwatch";
const CONFIG_FILE: &str = "settings.toml";
const ENV_PREFIX: &str = "PATHWATCH_";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Change observation settings
    #[serde(default)]
    pub observer: ObserverConfig,

    /// Download tracking settings
    #[serde(default)]
    pub download: DownloadConfig,

    /// Log levels
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ObserverConfig {
    /// Invoke a callback once as soon as it is attached or replaced
    #[serde(default)]
    pub notify_on_attach: bool,

    /// Watch whole directory subtrees with the desktop service
    #[serde(default = "default_true")]
    pub recursive: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct DownloadConfig {
    /// Portions of the remote index status queries search
    #[serde(default = "default_scopes")]
    pub scopes: Vec<SearchScope>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LoggingConfig {
    /// Level for everything without a module override
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-module overrides, e.g. `pathwatch::download = "debug"`
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

fn default_version() -> u32 {
    1
}
fn default_true() -> bool {
    true
}
fn default_scopes() -> Vec<SearchScope> {
    SearchScope::ALL.to_vec()
}
fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            observer: ObserverConfig::default(),
            download: DownloadConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            notify_on_attach: false,
            recursive: true,
        }
    }
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            scopes: default_scopes(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

impl Settings {
    /// Load configuration from all sources, using the nearest settings file.
    pub fn load() -> Result<Self, Box<figment::Error>> {
        let config_path = Self::find_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join(CONFIG_FILE));
        Self::load_from(config_path)
    }

    /// Load configuration from a specific file plus the environment.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Self::figment(path.as_ref()).extract().map_err(Box::new)
    }

    fn figment(path: &Path) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path))
            // Double underscore separates nested levels; single underscores stay in field names
            .merge(Env::prefixed(ENV_PREFIX).map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
    }

    /// Find `.pathwatch/settings.toml` from the current directory up to the root.
    fn find_config() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        current
            .ancestors()
            .map(|ancestor| ancestor.join(CONFIG_DIR))
            .find(|dir| dir.is_dir())
            .map(|dir| dir.join(CONFIG_FILE))
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Write a default settings file under `dir`.
    pub fn init_config_file(dir: impl AsRef<Path>, force: bool) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_path = dir.as_ref().join(CONFIG_DIR).join(CONFIG_FILE);

        if !force && config_path.exists() {
            return Err("Configuration file already exists. Use --force to overwrite".into());
        }

        Settings::default().save(&config_path)?;
        Ok(config_path)
    }
}
