//! Typed event channel between the updater and its observer (the UI).
//!
//! Every notification is one [`UpdateEvent`] variant on a single broadcast
//! channel. The serialized form is `{"type": "<event-name>", "payload": {..}}`,
//! matching the names the launcher frontend listens for.

use crate::updater::UpdateState;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

/// Maximum number of queued events per subscriber
const BROADCAST_CAPACITY: usize = 1000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum UpdateEvent {
    #[serde(rename = "state-changed")]
    StateChanged { state: UpdateState },

    #[serde(rename = "valid-directory-chosen")]
    ValidDirectoryChosen { path: String },

    #[serde(rename = "invalid-directory-chosen")]
    InvalidDirectoryChosen { message: String },

    /// A file download is about to start. `remaining` counts this file.
    #[serde(rename = "download-started")]
    DownloadStarted {
        filename: String,
        remaining: usize,
        index: usize,
        total: usize,
    },

    #[serde(rename = "download-progress")]
    DownloadProgress(DownloadProgressPayload),

    #[serde(rename = "download-finished")]
    DownloadFinished,

    /// A file could not be downloaded after all retries.
    #[serde(rename = "download-failed")]
    DownloadFailed { filename: String, error: String },

    #[serde(rename = "verify-progress")]
    VerifyProgress {
        total: usize,
        index: usize,
        filename: String,
    },
}

/// Progress of the file currently downloading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadProgressPayload {
    /// Expected size of the file
    pub total: u64,
    pub name: String,
    /// Bytes received so far; never decreases for one file
    pub downloaded: u64,
    pub percent: f64,
    /// Instantaneous speed in bytes/second
    pub speed: u64,
}

/// Shared event channel
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<UpdateEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(BROADCAST_CAPACITY);
        Self { tx }
    }

    /// Send an event to every subscriber. Having no subscriber is not an error.
    pub fn broadcast(&self, event: UpdateEvent) {
        match self.tx.send(event) {
            Ok(count) => {
                debug!("Broadcast event to {} subscriber(s)", count);
            }
            Err(broadcast::error::SendError(event)) => {
                debug!("No subscribers for event: {:?}", event);
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UpdateEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
