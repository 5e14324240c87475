//! Integrity verification: diff the install root against a manifest.
//!
//! Stock assets (`Custom: false`) ship unmodified, so their size is enough to
//! tell a stale copy apart and large archives are never hashed. Custom content
//! can change without changing size and is compared by MD5.

use crate::events::{EventBus, UpdateEvent};
use crate::fs::hash::md5_file_async;
use crate::fs::ClientInstallation;
use crate::manifest::{Manifest, PatchFileEntry};
use crate::utils::errors::{Result, UpdaterError};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Overall situation of an installation relative to a manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Every manifest file needs downloading; no prompt is shown.
    FreshInstall,
    /// Some files need downloading; the user is offered the update.
    PartialUpdate,
    UpToDate,
}

impl Classification {
    /// An empty manifest is up to date; otherwise "everything stale" is a fresh
    /// install, even for a single-file manifest.
    pub fn from_counts(updatable: usize, total: usize) -> Self {
        if updatable == 0 {
            Classification::UpToDate
        } else if updatable == total {
            Classification::FreshInstall
        } else {
            Classification::PartialUpdate
        }
    }
}

/// Files selected for download by one integrity pass, in manifest order.
/// Built once per pass and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdatableFileSet {
    entries: Arc<[PatchFileEntry]>,
}

impl Default for UpdatableFileSet {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl UpdatableFileSet {
    pub fn new(entries: Vec<PatchFileEntry>) -> Self {
        Self {
            entries: entries.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PatchFileEntry> {
        self.entries.iter()
    }

    pub fn as_slice(&self) -> &[PatchFileEntry] {
        &self.entries
    }

    pub fn total_bytes(&self) -> u64 {
        self.entries.iter().map(|e| e.size_bytes).sum()
    }
}

impl<'a> IntoIterator for &'a UpdatableFileSet {
    type Item = &'a PatchFileEntry;
    type IntoIter = std::slice::Iter<'a, PatchFileEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Result of one integrity pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegrityReport {
    pub updatable: UpdatableFileSet,
    pub classification: Classification,
    /// Number of manifest entries examined
    pub checked: usize,
}

/// Runs integrity passes and reports per-file progress.
#[derive(Debug, Clone)]
pub struct IntegrityChecker {
    events: EventBus,
}

impl IntegrityChecker {
    pub fn new(events: EventBus) -> Self {
        Self { events }
    }

    /// Compare every manifest entry against the installation.
    ///
    /// Fails with [`UpdaterError::ElevationRequired`] before reading anything if
    /// the install root is not writable by this process.
    pub async fn check(
        &self,
        manifest: &Manifest,
        installation: &ClientInstallation,
    ) -> Result<IntegrityReport> {
        if installation.requires_elevation() {
            warn!(
                "Install root {} requires elevated permissions",
                installation.root().display()
            );
            return Err(UpdaterError::ElevationRequired(
                installation.root().to_path_buf(),
            ));
        }

        let total = manifest.len();
        let mut updatable = Vec::new();

        info!(
            "Verifying {} files against manifest v{} in {}",
            total,
            manifest.version,
            installation.root().display()
        );

        for (index, entry) in manifest.files.iter().enumerate() {
            self.events.broadcast(UpdateEvent::VerifyProgress {
                total,
                index,
                filename: entry.file_name(),
            });

            let path = installation.resolve(&entry.relative_path);
            if needs_update(entry, &path).await {
                updatable.push(entry.clone());
            }
        }

        let classification = Classification::from_counts(updatable.len(), total);
        info!(
            "Integrity pass complete: {} of {} files need downloading ({:?})",
            updatable.len(),
            total,
            classification
        );

        Ok(IntegrityReport {
            updatable: UpdatableFileSet::new(updatable),
            classification,
            checked: total,
        })
    }
}

/// Whether one entry must be (re)downloaded.
async fn needs_update(entry: &PatchFileEntry, path: &Path) -> bool {
    let metadata = match tokio::fs::metadata(path).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("Missing: {}", entry.relative_path.display());
            return true;
        }
        Err(e) => {
            warn!("Cannot stat {}: {}", path.display(), e);
            return true;
        }
    };

    if !metadata.is_file() {
        warn!("{} exists but is not a regular file", path.display());
        return true;
    }

    if !entry.is_custom {
        let stale = metadata.len() != entry.size_bytes;
        if stale {
            debug!(
                "Size mismatch: {} ({} on disk, {} expected)",
                entry.relative_path.display(),
                metadata.len(),
                entry.size_bytes
            );
        }
        return stale;
    }

    match md5_file_async(path.to_path_buf()).await {
        Ok(actual) => {
            let stale = !actual.eq_ignore_ascii_case(&entry.hash);
            if stale {
                debug!(
                    "Hash mismatch: {} ({} on disk, {} expected)",
                    entry.relative_path.display(),
                    actual,
                    entry.hash
                );
            }
            stale
        }
        Err(e) => {
            warn!("Cannot hash {}: {}", path.display(), e);
            true
        }
    }
}
