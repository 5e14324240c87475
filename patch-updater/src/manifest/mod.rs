//! Patch manifest types.
//!
//! A manifest declares every file a complete installation must contain, with
//! the size or hash used to verify it and the URL to fetch it from. Paths are
//! normalized while parsing, so a [`Manifest`] never carries manifest-native
//! separators.

pub mod client;

pub use client::ManifestClient;

use crate::fs::paths::normalize_manifest_path;
use crate::utils::errors::{Result, UpdaterError};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::PathBuf;

/// Parsed, normalized manifest for one update cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    pub version: String,
    pub files: Vec<PatchFileEntry>,
}

/// One file's record within a manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchFileEntry {
    /// Relative to the install root, local separators
    pub relative_path: PathBuf,
    /// Hex MD5, only consulted for custom files
    pub hash: String,
    pub size_bytes: u64,
    /// Custom content is verified by hash, stock assets by size
    pub is_custom: bool,
    pub download_url: String,
}

/// Wire format served by `/api/manifest`.
#[derive(Debug, Deserialize)]
struct ManifestWire {
    #[serde(rename = "Version")]
    version: String,
    #[serde(rename = "Files", default)]
    files: Vec<PatchFileWire>,
}

#[derive(Debug, Deserialize)]
struct PatchFileWire {
    #[serde(rename = "Path")]
    path: String,
    #[serde(rename = "Hash", default)]
    hash: String,
    #[serde(rename = "Size")]
    size: u64,
    #[serde(rename = "Custom", default)]
    custom: bool,
    #[serde(rename = "URL")]
    url: String,
}

impl Manifest {
    /// Parse a manifest body. Any shape error, including a missing `Version`,
    /// is a [`UpdaterError::Parse`].
    pub fn from_json(body: &str) -> Result<Self> {
        let wire: ManifestWire =
            serde_json::from_str(body).map_err(|e| UpdaterError::Parse(e.to_string()))?;

        let mut seen = HashSet::with_capacity(wire.files.len());
        let mut files = Vec::with_capacity(wire.files.len());

        for file in wire.files {
            let relative_path = normalize_manifest_path(&file.path)?;
            if !seen.insert(relative_path.clone()) {
                return Err(UpdaterError::Parse(format!(
                    "duplicate path in manifest: {}",
                    file.path
                )));
            }

            files.push(PatchFileEntry {
                relative_path,
                hash: file.hash,
                size_bytes: file.size,
                is_custom: file.custom,
                download_url: file.url,
            });
        }

        Ok(Self {
            version: wire.version,
            files,
        })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Sum of all declared file sizes
    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.size_bytes).sum()
    }
}

impl PatchFileEntry {
    /// Final path component, used in progress events.
    pub fn file_name(&self) -> String {
        self.relative_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.relative_path.display().to_string())
    }
}
