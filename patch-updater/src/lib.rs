//! Patch Updater Library
//!
//! Keeps a local game client in sync with the patch manifest published by the
//! launcher backend: fetch the manifest, verify the installation, download what
//! is missing or stale, and report every step to an observer.

pub mod config;
pub mod download;
pub mod events;
pub mod fs;
pub mod integrity;
pub mod manifest;
pub mod settings;
pub mod transfer;
pub mod updater;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use download::{CancelHandle, DownloadOrchestrator, DownloadOutcome};
pub use events::{EventBus, UpdateEvent};
pub use fs::ClientInstallation;
pub use integrity::{Classification, IntegrityChecker, IntegrityReport, UpdatableFileSet};
pub use manifest::{Manifest, ManifestClient, PatchFileEntry};
pub use settings::{FileSettings, MemorySettings, SettingKey, SettingsStore};
pub use updater::{UpdateState, Updater, UpdaterContext};
pub use utils::errors::UpdaterError;
pub type Result<T> = std::result::Result<T, UpdaterError>;
