//! Download orchestrator - fetches an updatable-file set one file at a time.
//!
//! Files are transferred strictly in set order with a single transfer in flight,
//! which keeps progress reporting unambiguous and leaves the user's bandwidth to
//! one connection. The orchestrator only reads the set it is handed; what the
//! batch achieved is reported back as a [`DownloadOutcome`] and the caller
//! re-verifies the installation afterwards.

pub mod file;

use crate::config::DownloadConfig;
use crate::events::{EventBus, UpdateEvent};
use crate::fs::ClientInstallation;
use crate::integrity::UpdatableFileSet;
use crate::utils::errors::{Result, UpdaterError};
use file::{FileDownload, RetryPolicy};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// What one batch did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadOutcome {
    /// Files written successfully
    pub downloaded: usize,
    /// Files that failed after all retries, in attempt order
    pub failed: Vec<PathBuf>,
    /// Files never started because the batch was cancelled
    pub skipped: usize,
    pub cancelled: bool,
    /// Bytes written across all successful files
    pub bytes: u64,
}

/// Cancels the current update cycle.
///
/// A cancel reaches whichever token the latest [`reset`](Self::reset) handed out,
/// whether or not a batch is transferring at that moment.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    token: Arc<Mutex<CancellationToken>>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_cancelled()
    }

    /// Start a new cancellation scope. Cancels issued before this call do not
    /// carry over into the returned token.
    pub fn reset(&self) -> CancellationToken {
        let token = CancellationToken::new();
        *self.token.lock().unwrap_or_else(PoisonError::into_inner) = token.clone();
        token
    }
}

/// Sequential downloader for updatable files.
#[derive(Debug, Clone)]
pub struct DownloadOrchestrator {
    http: reqwest::Client,
    policy: RetryPolicy,
    events: EventBus,
    cancel: CancelHandle,
    batch_lock: Arc<tokio::sync::Mutex<()>>,
}

impl DownloadOrchestrator {
    pub fn new(config: &DownloadConfig, events: EventBus) -> Result<Self> {
        // Only connect and idle timeouts; a whole-request bound would cut off large archives.
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .build()?;

        Ok(Self {
            http,
            policy: RetryPolicy::from(config),
            events,
            cancel: CancelHandle::new(),
            batch_lock: Arc::new(tokio::sync::Mutex::new(())),
        })
    }

    /// Handle whose [`reset`](CancelHandle::reset) tokens callers pass to
    /// [`download_all`](Self::download_all).
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Cancel the batch started with the current token, or the next one if none
    /// is running yet.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Download every file in `files` into `installation`, in order.
    ///
    /// Per-file failures are logged and reported as `download-failed`; the batch
    /// moves on to the next file. Only a missing write permission aborts the
    /// whole batch, before anything is touched. Cancelling `cancel` stops the
    /// in-flight file and skips the rest; an already-cancelled token skips all.
    pub async fn download_all(
        &self,
        files: &UpdatableFileSet,
        installation: &ClientInstallation,
        cancel: &CancellationToken,
    ) -> Result<DownloadOutcome> {
        let _batch = self.batch_lock.lock().await;

        if installation.requires_elevation() {
            return Err(UpdaterError::ElevationRequired(
                installation.root().to_path_buf(),
            ));
        }

        let total = files.len();
        let mut outcome = DownloadOutcome::default();

        info!(
            "Starting download of {} files ({} bytes) into {}",
            total,
            files.total_bytes(),
            installation.root().display()
        );

        for (index, entry) in files.iter().enumerate() {
            if cancel.is_cancelled() {
                outcome.cancelled = true;
                outcome.skipped = total - index;
                info!("Download cancelled, skipping {} remaining files", outcome.skipped);
                break;
            }

            let destination = installation.resolve(&entry.relative_path);
            let filename = entry.file_name();

            self.events.broadcast(UpdateEvent::DownloadStarted {
                filename: filename.clone(),
                remaining: total - index,
                index,
                total,
            });

            let result = match destination.parent() {
                Some(parent) => tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(UpdaterError::from),
                None => Ok(()),
            };

            let result = match result {
                Ok(()) => {
                    FileDownload {
                        http: &self.http,
                        policy: &self.policy,
                        events: &self.events,
                        cancel,
                        entry,
                        destination,
                    }
                    .run()
                    .await
                }
                Err(e) => Err(e),
            };

            match result {
                Ok(bytes) => {
                    outcome.downloaded += 1;
                    outcome.bytes += bytes;
                }
                Err(UpdaterError::Cancelled) => {
                    outcome.cancelled = true;
                    outcome.skipped = total - index - 1;
                    self.events.broadcast(UpdateEvent::DownloadFinished);
                    info!(
                        "Download cancelled during {}, skipping {} remaining files",
                        entry.relative_path.display(),
                        outcome.skipped
                    );
                    break;
                }
                Err(e) => {
                    error!(
                        "Failed to download {} from {}: {}",
                        entry.relative_path.display(),
                        entry.download_url,
                        e
                    );
                    outcome.failed.push(entry.relative_path.clone());
                    self.events.broadcast(UpdateEvent::DownloadFailed {
                        filename,
                        error: e.to_string(),
                    });
                }
            }

            self.events.broadcast(UpdateEvent::DownloadFinished);
        }

        if !outcome.failed.is_empty() {
            warn!("{} files failed to download", outcome.failed.len());
        }
        info!(
            "Download batch finished: {} downloaded, {} failed, {} skipped",
            outcome.downloaded,
            outcome.failed.len(),
            outcome.skipped
        );

        Ok(outcome)
    }
}
