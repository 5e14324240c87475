//! Conversion of manifest paths into local relative paths.
//!
//! Manifests are authored on Windows and use `\` separators, though `/` shows up
//! too. Both are accepted; the result always stays beneath the install root.

use crate::utils::errors::{Result, UpdaterError};
use std::path::PathBuf;

/// Normalize a manifest path into a relative path using the local separator.
pub fn normalize_manifest_path(raw: &str) -> Result<PathBuf> {
    let mut path = PathBuf::new();

    for segment in raw.split(['\\', '/']) {
        match segment {
            "" | "." => continue,
            ".." => {
                return Err(UpdaterError::Parse(format!(
                    "path escapes the install root: {}",
                    raw
                )))
            }
            s if s.contains(':') => {
                return Err(UpdaterError::Parse(format!(
                    "absolute or drive-qualified path: {}",
                    raw
                )))
            }
            s => path.push(s),
        }
    }

    if path.as_os_str().is_empty() {
        return Err(UpdaterError::Parse(format!("empty file path: {:?}", raw)));
    }

    Ok(path)
}
