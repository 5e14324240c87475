//! Custom error types for the patch updater.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum UpdaterError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status}: {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Manifest parse error: {0}")]
    Parse(String),

    #[error("Elevated permissions required to write to {}", .0.display())]
    ElevationRequired(PathBuf),

    #[error("Cancelled")]
    Cancelled,
}

impl UpdaterError {
    /// Whether a download attempt that failed with this error may be retried.
    pub fn is_transient(&self) -> bool {
        match self {
            UpdaterError::Network(_) | UpdaterError::Http(_) => true,
            UpdaterError::HttpStatus { status, .. } => {
                *status == 408 || *status == 429 || *status >= 500
            }
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, UpdaterError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn status(status: u16) -> UpdaterError {
        UpdaterError::HttpStatus {
            url: "https://cdn.example.com/a.MPQ".to_string(),
            status,
        }
    }

    #[test]
    fn test_transient_statuses() {
        assert!(status(500).is_transient());
        assert!(status(503).is_transient());
        assert!(status(429).is_transient());
        assert!(status(408).is_transient());
        assert!(!status(404).is_transient());
        assert!(!status(403).is_transient());
    }

    #[test]
    fn test_local_errors_are_not_transient() {
        let io = UpdaterError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk full"));
        assert!(!io.is_transient());
        assert!(!UpdaterError::Cancelled.is_transient());
        assert!(UpdaterError::Network("connection reset".into()).is_transient());
    }
}
