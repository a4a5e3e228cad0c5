//! Application configuration.
//!
//! Aggregates the log and snapshot settings into a single Config struct
//! that can be loaded from YAML files or environment variables.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "daybook.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "DAYBOOK_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "DAYBOOK";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "DAYBOOK_LOG";

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Event log configuration.
    pub log: LogConfig,
    /// Read-model snapshot configuration.
    pub snapshots: SnapshotConfig,
}

/// Event log configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Backing file for the append-only log.
    pub path: PathBuf,
    /// How long a caught-up tail sleeps before re-checking the log length.
    pub poll_interval_ms: u64,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/events.ndjson"),
            poll_interval_ms: 1000,
        }
    }
}

impl LogConfig {
    /// Poll interval as a [`Duration`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Read-model snapshot configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    /// Directory holding one `<store>.json` document per state store.
    pub dir: PathBuf,
    /// Minimum spacing between snapshot writes for one store.
    pub write_interval_ms: u64,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("data/snapshots"),
            write_interval_ms: 1000,
        }
    }
}

impl SnapshotConfig {
    /// Write throttle interval as a [`Duration`].
    pub fn write_interval(&self) -> Duration {
        Duration::from_millis(self.write_interval_ms)
    }

    /// Path of the snapshot document for the store named `store`.
    pub fn document_path(&self, store: &str) -> PathBuf {
        self.dir.join(format!("{}.json", store))
    }
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `daybook.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix
    ///    (e.g. `DAYBOOK__LOG__PATH`, `DAYBOOK__SNAPSHOTS__WRITE_INTERVAL_MS`)
    pub fn load(path: Option<&str>) -> Result<Self, Box<dyn std::error::Error>> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        // Add config file from path argument if provided
        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        // Add config file from CONFIG_ENV_VAR env var if set
        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config = builder
            // Environment variables with CONFIG_ENV_PREFIX prefix
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = config.try_deserialize()?;
        Ok(config)
    }
}
