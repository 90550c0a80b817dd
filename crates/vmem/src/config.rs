//! Configuration management for vmem.
//!
//! Configuration is loaded from multiple sources with precedence:
//! 1. Environment variables (OPENROUTER_API_KEY, VMEM_DATABASE_PATH, VMEM_MODEL)
//! 2. Config file ($VMEM_CONFIG or <data dir>/config.toml)
//! 3. Default values

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;
use vmem_sdk::EngineConfig;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Paths
    pub paths: PathsConfig,

    /// Engine settings (database, matching, vision, retries)
    pub engine: EngineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Base directory for vmem data; relative database paths resolve here
    pub data_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    if let Some(proj_dirs) = ProjectDirs::from("dev", "vmem", "vmem") {
        proj_dirs.data_dir().to_path_buf()
    } else {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".vmem")
    }
}

impl Config {
    /// Load configuration from file and environment.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path())?;
        config.apply_env(|key| std::env::var(key).ok());
        config.resolve_paths();
        Ok(config)
    }

    /// Load the config file at `path`, or defaults if it does not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        debug!(path = %path.display(), "Loaded config file");
        Ok(config)
    }

    /// Get the config file path.
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("VMEM_CONFIG") {
            PathBuf::from(path)
        } else {
            default_data_dir().join("config.toml")
        }
    }

    /// Override file values from the environment.
    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(key) = var("OPENROUTER_API_KEY").filter(|v| !v.is_empty()) {
            self.engine.vision.api_key = Some(key);
        }
        if let Some(path) = var("VMEM_DATABASE_PATH").filter(|v| !v.is_empty()) {
            self.engine.database_path = PathBuf::from(path);
        }
        if let Some(model) = var("VMEM_MODEL").filter(|v| !v.is_empty()) {
            self.engine.vision.model = model;
        }
    }

    fn resolve_paths(&mut self) {
        if self.engine.database_path.is_relative() {
            self.engine.database_path = self.paths.data_dir.join(&self.engine.database_path);
        }
    }
}
