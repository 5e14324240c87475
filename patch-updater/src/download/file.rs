//! Single-file download with bounded retries.
//!
//! The body is streamed into `<name>.part` beside the destination and only
//! renamed into place once complete. Any failed, timed-out or cancelled attempt
//! removes the `.part` file, so a half-written file never sits at the
//! destination path.

use crate::config::DownloadConfig;
use crate::events::{DownloadProgressPayload, EventBus, UpdateEvent};
use crate::manifest::PatchFileEntry;
use crate::transfer::progress::{format_bytes, format_speed, ProgressTracker};
use crate::transfer::progress_stream::ProgressStream;
use crate::utils::errors::{Result, UpdaterError};
use futures_util::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Fixed retry policy and timeouts for file transfers.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Longest wait for the response headers or for the next body chunk
    pub idle_timeout: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub progress_interval: Duration,
}

impl From<&DownloadConfig> for RetryPolicy {
    fn from(config: &DownloadConfig) -> Self {
        Self {
            idle_timeout: config.timeout(),
            max_retries: config.max_retries,
            retry_delay: config.retry_delay(),
            progress_interval: config.progress_interval(),
        }
    }
}

/// One file transfer: entry, destination and the shared plumbing it reports through.
pub(crate) struct FileDownload<'a> {
    pub http: &'a reqwest::Client,
    pub policy: &'a RetryPolicy,
    pub events: &'a EventBus,
    pub cancel: &'a CancellationToken,
    pub entry: &'a PatchFileEntry,
    pub destination: PathBuf,
}

impl FileDownload<'_> {
    /// Download with retries. Returns the number of bytes written.
    pub async fn run(&self) -> Result<u64> {
        let part = part_path(&self.destination);
        let mut tracker = ProgressTracker::new(self.entry.size_bytes);
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            let result = tokio::select! {
                result = self.attempt(&part, &mut tracker) => result,
                _ = self.cancel.cancelled() => Err(UpdaterError::Cancelled),
            };

            match result {
                Ok(bytes) => {
                    tokio::fs::rename(&part, &self.destination).await.inspect_err(|_| {
                        discard_partial(&part);
                    })?;
                    info!(
                        "Downloaded {} ({}) in {:.1}s, average {}",
                        self.entry.relative_path.display(),
                        format_bytes(bytes),
                        tracker.elapsed().as_secs_f64(),
                        format_speed(tracker.average_speed())
                    );
                    return Ok(bytes);
                }
                Err(e) => {
                    discard_partial(&part);

                    if matches!(e, UpdaterError::Cancelled) {
                        info!("Download cancelled: {}", self.entry.relative_path.display());
                        return Err(e);
                    }

                    if !e.is_transient() || attempt > self.policy.max_retries {
                        return Err(e);
                    }

                    warn!(
                        "Attempt {}/{} for {} failed: {}. Retrying in {}ms",
                        attempt,
                        self.policy.max_retries + 1,
                        self.entry.relative_path.display(),
                        e,
                        self.policy.retry_delay.as_millis()
                    );

                    tokio::select! {
                        _ = tokio::time::sleep(self.policy.retry_delay) => {}
                        _ = self.cancel.cancelled() => return Err(UpdaterError::Cancelled),
                    }
                }
            }
        }
    }

    /// One GET, streamed to the `.part` file. The attempt fails as soon as the
    /// server stays silent for longer than the idle timeout, however long the
    /// transfer as a whole takes.
    async fn attempt(&self, part: &Path, tracker: &mut ProgressTracker) -> Result<u64> {
        let url = &self.entry.download_url;
        let idle = self.policy.idle_timeout;
        let response = tokio::time::timeout(idle, self.http.get(url).send())
            .await
            .map_err(|_| stalled(url, idle))??;

        let status = response.status();
        if !status.is_success() {
            return Err(UpdaterError::HttpStatus {
                url: url.clone(),
                status: status.as_u16(),
            });
        }

        let mut file = tokio::fs::File::create(part).await?;

        let name = self.entry.file_name();
        let events = self.events;
        let total = self.entry.size_bytes;
        let report = move |attempt_bytes: u64| {
            let progress = tracker.update(attempt_bytes);
            events.broadcast(UpdateEvent::DownloadProgress(DownloadProgressPayload {
                total,
                name: name.clone(),
                downloaded: progress.transferred_bytes,
                percent: progress.percent_complete,
                speed: progress.bytes_per_second,
            }));
        };

        let mut stream = ProgressStream::new(
            Box::pin(response.bytes_stream()),
            self.policy.progress_interval,
            Box::new(report),
        );

        while let Some(chunk) = tokio::time::timeout(idle, stream.next())
            .await
            .map_err(|_| stalled(url, idle))?
        {
            file.write_all(&chunk?).await?;
        }
        file.flush().await?;

        let written = stream.bytes_transferred();
        if written != self.entry.size_bytes {
            debug!(
                "{}: received {} bytes, manifest declares {}",
                self.entry.relative_path.display(),
                written,
                self.entry.size_bytes
            );
        }

        Ok(written)
    }
}

fn stalled(url: &str, idle: Duration) -> UpdaterError {
    UpdaterError::Network(format!(
        "no data from {} for {}s",
        url,
        idle.as_secs()
    ))
}

/// `<destination>.part`
pub(crate) fn part_path(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    destination.with_file_name(name)
}

fn discard_partial(part: &Path) {
    match std::fs::remove_file(part) {
        Ok(()) => debug!("Removed partial file {}", part.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove partial file {}: {}", part.display(), e),
    }
}
