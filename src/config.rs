use crate::history::{clamp_stack_size, DEFAULT_STACK_SIZE};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable that moves the base directory away from `~/.ul`.
pub const HOME_ENV: &str = "UL_HOME";

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub history: HistoryConfig,
    pub store: StoreConfig,
    pub display: DisplayConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct HistoryConfig {
    // relative paths are resolved against the base dir
    pub file: String,
    pub max_stack_size: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            file: "undo_history.json".to_string(),
            max_stack_size: DEFAULT_STACK_SIZE,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct StoreConfig {
    pub file: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            file: "store.json".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct DisplayConfig {
    pub max_history_shown: usize,
    // "auto", "en" or "es"
    pub language: String,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            max_history_shown: 20,
            language: "auto".to_string(),
        }
    }
}

impl Config {
    /// Load `config.toml` from the base dir, writing the defaults on first run.
    pub fn new() -> Result<Self> {
        Self::load_from(&Self::base_dir())
    }

    pub fn load_from(base_dir: &Path) -> Result<Self> {
        let config_path = base_dir.join("config.toml");

        if config_path.exists() {
            let content = fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read {}", config_path.display()))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Invalid config file {}", config_path.display()))?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(base_dir)?;
            Ok(config)
        }
    }

    pub fn save_to(&self, base_dir: &Path) -> Result<()> {
        fs::create_dir_all(base_dir)
            .with_context(|| format!("Failed to create {}", base_dir.display()))?;

        let content = toml::to_string_pretty(self)?;
        fs::write(base_dir.join("config.toml"), content)?;
        Ok(())
    }

    pub fn base_dir() -> PathBuf {
        if let Ok(dir) = std::env::var(HOME_ENV) {
            if !dir.trim().is_empty() {
                return PathBuf::from(dir);
            }
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".ul")
    }

    pub fn history_path(&self, base_dir: &Path) -> PathBuf {
        base_dir.join(&self.history.file)
    }

    pub fn store_path(&self, base_dir: &Path) -> PathBuf {
        base_dir.join(&self.store.file)
    }

    /// Configured stack bound, kept inside the range the history accepts at runtime.
    pub fn stack_size(&self) -> usize {
        clamp_stack_size(self.history.max_stack_size)
    }

    pub fn effective_language(&self) -> String {
        if self.display.language == "auto" {
            // LANG looks like es_ES.UTF-8
            std::env::var("LANG")
                .unwrap_or_else(|_| "en_US".to_string())
                .split('.')
                .next()
                .unwrap_or("en")
                .to_string()
        } else {
            self.display.language.clone()
        }
    }
}
