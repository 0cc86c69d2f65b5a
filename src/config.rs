//! Layered configuration.
//!
//! Sources, highest priority first:
//! 1. Environment variables (`TASKLOG_*`, e.g. `TASKLOG_TICK_INTERVAL_MS=500`)
//! 2. The TOML config file (`<config dir>/config.toml`, or `--config`)
//! 3. Built-in defaults

use directories::ProjectDirs;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    /// Figment extraction or merge error.
    #[error("configuration error: {0}")]
    Figment(#[from] figment::Error),

    #[error("invalid configuration value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    /// Database file. Defaults to `tasks.sqlite` in the data directory.
    pub database: Option<PathBuf>,
    /// How often `watch` refreshes, in milliseconds.
    pub tick_interval_ms: u64,
    /// Starting a task pauses any other running task.
    pub exclusive_running: bool,
    /// Pause running tasks when `watch` exits instead of leaving them open.
    pub pause_on_exit: bool,
    /// Default tracing filter when `TASKLOG_LOG` is not set.
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database: None,
            tick_interval_ms: 1000,
            exclusive_running: true,
            pause_on_exit: false,
            log_level: "warn".to_string(),
        }
    }
}

pub fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "gozque", "tasklog")
}

impl Config {
    /// Load from defaults, the config file and the environment.
    pub fn load(file: Option<&Path>) -> Result<Config, ConfigError> {
        let file = file
            .map(Path::to_path_buf)
            .or_else(|| project_dirs().map(|dirs| dirs.config_dir().join("config.toml")));
        let config: Config = Config::figment(file.as_deref()).extract()?;
        config.validate()?;
        Ok(config)
    }

    fn figment(file: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(file) = file {
            figment = figment.merge(Toml::file(file));
        }
        figment.merge(Env::prefixed("TASKLOG_").ignore(&["log"]))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "tick_interval_ms".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// The database file to use: the configured one, or `tasks.sqlite` in
    /// the platform data directory (created if missing).
    pub fn database_path(&self) -> std::io::Result<Option<PathBuf>> {
        if let Some(path) = &self.database {
            return Ok(Some(path.clone()));
        }
        match project_dirs() {
            Some(dirs) => {
                let root = dirs.data_dir();
                if !root.exists() {
                    std::fs::create_dir_all(root)?;
                }
                Ok(Some(root.join("tasks.sqlite")))
            }
            None => Ok(None),
        }
    }
}
