//! Configuration management for the patch updater.
//!
//! Loads configuration from a TOML file with `PATCH_UPDATER__SECTION__KEY`
//! environment variable overrides. Every field has a default, so a partial file
//! (or none at all) is valid.

use crate::utils::errors::{Result, UpdaterError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Prefix for environment variable overrides.
const ENV_PREFIX: &str = "PATCH_UPDATER";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub manifest: ManifestConfig,
    pub download: DownloadConfig,
    pub settings: SettingsConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ManifestConfig {
    /// Manifest host used in production (`https`)
    pub host: String,

    /// Local development mode: `http` against `development_host`
    pub development: bool,

    /// Loopback host (and optional port) used in development mode
    pub development_host: String,

    /// Request timeout for the manifest fetch
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Inactivity timeout: longest wait for response headers or the next body
    /// chunk. A transfer that keeps receiving data is never cut off.
    pub timeout_secs: u64,

    /// Connection establishment timeout
    pub connect_timeout_secs: u64,

    /// Retries after the first attempt for transient failures
    pub max_retries: u32,

    /// Fixed delay between attempts
    pub retry_delay_ms: u64,

    /// Minimum interval between progress events for one file
    pub progress_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsConfig {
    /// Location of the persisted user settings (client directory, environment, key)
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log output (stdout, stderr)
    pub output: String,
}

impl Default for ManifestConfig {
    fn default() -> Self {
        Self {
            host: "launcher.example.com".to_string(),
            development: false,
            development_host: "127.0.0.1".to_string(),
            timeout_secs: 30,
        }
    }
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            connect_timeout_secs: 15,
            max_retries: 3,
            retry_delay_ms: 2000,
            progress_interval_ms: 250, // 4 updates per second
        }
    }
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("settings.toml"),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            output: "stdout".to_string(),
        }
    }
}

impl ManifestConfig {
    /// Scheme and authority of the manifest host for the current mode.
    pub fn base_url(&self) -> String {
        if self.development {
            format!("http://{}", self.development_host)
        } else {
            format!("https://{}", self.host)
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl DownloadConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }
}

impl Config {
    /// Load configuration from a TOML file, then apply environment overrides.
    pub fn from_file(path: &Path) -> Result<Self> {
        Self::load(Some(path))
    }

    /// Load defaults plus environment overrides, optionally layered over a file.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()
            .and_then(|layered| layered.try_deserialize::<Config>())
            .map_err(|e| UpdaterError::Config(e.to_string()))
    }
}
