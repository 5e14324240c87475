//! Persisted user settings.
//!
//! The core only ever reads and writes three keys through [`SettingsStore`]. The
//! file-backed store keeps them in a small TOML document next to the launcher;
//! the in-memory store backs isolated update cycles in tests.

use crate::utils::errors::{Result, UpdaterError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use tracing::{debug, info};

/// Keys understood by the settings store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingKey {
    ClientDirectory,
    Environment,
    Key,
}

impl SettingKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            SettingKey::ClientDirectory => "clientDirectory",
            SettingKey::Environment => "environment",
            SettingKey::Key => "key",
        }
    }

    /// Value returned when the key has never been set.
    pub fn default_value(&self) -> &'static str {
        match self {
            SettingKey::Environment => "production",
            SettingKey::ClientDirectory | SettingKey::Key => "",
        }
    }
}

/// Process-external settings storage, injected into the updater.
pub trait SettingsStore: Send + Sync {
    fn get(&self, key: SettingKey) -> String;

    fn set(&self, key: SettingKey, value: &str) -> Result<()>;
}

/// On-disk layout of the settings file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct SettingsData {
    client_directory: String,
    environment: String,
    key: String,
}

impl Default for SettingsData {
    fn default() -> Self {
        Self {
            client_directory: SettingKey::ClientDirectory.default_value().to_string(),
            environment: SettingKey::Environment.default_value().to_string(),
            key: SettingKey::Key.default_value().to_string(),
        }
    }
}

impl SettingsData {
    fn field(&self, key: SettingKey) -> &String {
        match key {
            SettingKey::ClientDirectory => &self.client_directory,
            SettingKey::Environment => &self.environment,
            SettingKey::Key => &self.key,
        }
    }

    fn field_mut(&mut self, key: SettingKey) -> &mut String {
        match key {
            SettingKey::ClientDirectory => &mut self.client_directory,
            SettingKey::Environment => &mut self.environment,
            SettingKey::Key => &mut self.key,
        }
    }
}

/// Settings persisted as TOML; every `set` rewrites the file.
#[derive(Debug)]
pub struct FileSettings {
    path: PathBuf,
    data: RwLock<SettingsData>,
}

impl FileSettings {
    /// Open the settings file, falling back to defaults if it does not exist yet.
    pub fn open(path: &Path) -> Result<Self> {
        let data = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content).map_err(|e| {
                UpdaterError::Settings(format!("{}: {}", path.display(), e))
            })?
        } else {
            info!("No settings file at {}, using defaults", path.display());
            SettingsData::default()
        };

        Ok(Self {
            path: path.to_path_buf(),
            data: RwLock::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, data: &SettingsData) -> Result<()> {
        let content =
            toml::to_string_pretty(data).map_err(|e| UpdaterError::Settings(e.to_string()))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&self.path, content)?;
        Ok(())
    }
}

impl SettingsStore for FileSettings {
    fn get(&self, key: SettingKey) -> String {
        let data = self.data.read().unwrap_or_else(PoisonError::into_inner);
        data.field(key).clone()
    }

    fn set(&self, key: SettingKey, value: &str) -> Result<()> {
        let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
        let mut updated = data.clone();
        *updated.field_mut(key) = value.to_string();
        self.persist(&updated)?;
        *data = updated;
        debug!("Setting {} updated", key.as_str());
        Ok(())
    }
}

/// Non-persistent store.
#[derive(Debug, Default)]
pub struct MemorySettings {
    values: RwLock<HashMap<SettingKey, String>>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, key: SettingKey, value: &str) -> Self {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, value.to_string());
        self
    }
}

impl SettingsStore for MemorySettings {
    fn get(&self, key: SettingKey) -> String {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned()
            .unwrap_or_else(|| key.default_value().to_string())
    }

    fn set(&self, key: SettingKey, value: &str) -> Result<()> {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, value.to_string());
        Ok(())
    }
}
