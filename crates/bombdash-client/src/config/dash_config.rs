use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::client::economy::END_GAME_ACCOUNT_LEVEL;
use crate::config::{
    account_config::AccountConfig, backend_config::BackendConfig, paths::ProjectPaths,
};

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("Config file not found")]
    NotFound,
    #[error("Failed to parse config: {0}")]
    ParseError(String),
    #[error("IO error reading config: {0}")]
    IoError(String),
    #[error("Could not determine the config directory")]
    NoConfigDir,
}

/// Scene entry thresholds that operators may tune
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Account level at which the forge opens
    pub forge_min_account_level: u32,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            forge_min_account_level: END_GAME_ACCOUNT_LEVEL,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Also write logs to a file in the data dir
    pub file: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { file: true }
    }
}

/// Contents of `config.toml`. Every section is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DashConfig {
    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub gates: GateConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Default account for `bombdash login`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<AccountConfig>,
}

impl DashConfig {
    pub fn config_path() -> Result<PathBuf, ConfigLoadError> {
        ProjectPaths::new("bombdash")
            .map(|paths| paths.config_file())
            .ok_or(ConfigLoadError::NoConfigDir)
    }

    pub fn load() -> Result<Self, ConfigLoadError> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigLoadError> {
        if !path.exists() {
            return Err(ConfigLoadError::NotFound);
        }

        let content =
            fs::read_to_string(path).map_err(|e| ConfigLoadError::IoError(e.to_string()))?;
        let config =
            toml::from_str(&content).map_err(|e| ConfigLoadError::ParseError(e.to_string()))?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn save(&self) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let path = Self::config_path()?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(&self)?;
        fs::write(path, content)?;
        info!("Saved config to {}", path.display());
        Ok(())
    }

    /// Config written on first run, with a placeholder account
    pub fn example() -> Self {
        Self {
            account: Some(AccountConfig {
                username: "player".to_string(),
                pin: "0000".to_string(),
            }),
            ..Self::default()
        }
    }
}
