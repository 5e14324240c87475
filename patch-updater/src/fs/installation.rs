//! The local client installation the updater writes into.

use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Directory holding the game archives.
const DATA_DIR: &str = "Data";

/// Archive that only exists in a complete Wrath of the Lich King client.
const MARKER_ARCHIVE: &str = "lichking.MPQ";

/// The only locale the server accepts.
const LOCALE: &str = "enUS";

/// Client-side cache, safe to clear before launching the game.
const CACHE_DIR: &str = "Cache";

/// Why a user-selected directory was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryRejection {
    Missing,
    NotADirectory,
    WrongLocale,
    NotAGameDirectory,
}

impl DirectoryRejection {
    /// Message shown to the user.
    pub fn message(&self) -> &'static str {
        match self {
            DirectoryRejection::Missing => "The selected directory does not exist.",
            DirectoryRejection::NotADirectory => "The selected path is not a directory.",
            DirectoryRejection::WrongLocale => {
                "The selected client is not an enUS client. Please choose an enUS installation."
            }
            DirectoryRejection::NotAGameDirectory => {
                "The selected directory is not empty and does not contain a game client. \
                 Choose an existing client or an empty directory."
            }
        }
    }
}

/// Answers whether the current process may write to an existing path.
pub type WriteCheck = fn(&Path) -> bool;

/// Root of a client installation plus the predicates the launcher needs.
#[derive(Debug, Clone)]
pub struct ClientInstallation {
    root: PathBuf,
    write_check: WriteCheck,
}

impl ClientInstallation {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_check: is_writable,
        }
    }

    /// Replace the permission check used by [`requires_elevation`](Self::requires_elevation),
    /// for hosts that decide writability through their own ACL handling.
    pub fn with_write_check(mut self, write_check: WriteCheck) -> Self {
        self.write_check = write_check;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute location of a normalized manifest path.
    pub fn resolve(&self, relative_path: &Path) -> PathBuf {
        self.root.join(relative_path)
    }

    pub fn exists(&self) -> bool {
        self.root.is_dir()
    }

    pub fn is_empty(&self) -> io::Result<bool> {
        Ok(std::fs::read_dir(&self.root)?.next().is_none())
    }

    /// Whether the directory holds a game client (data directory plus marker archive).
    pub fn is_game_directory(&self) -> bool {
        let data = self.root.join(DATA_DIR);
        data.is_dir() && data.join(MARKER_ARCHIVE).is_file()
    }

    pub fn is_correct_locale(&self) -> bool {
        let locale_dir = self.root.join(DATA_DIR).join(LOCALE);
        locale_dir.is_dir() && locale_dir.join(format!("locale-{}.MPQ", LOCALE)).is_file()
    }

    /// A directory the updater can work with: an existing client, or an empty
    /// directory to install into.
    pub fn is_usable(&self) -> bool {
        self.exists() && (self.is_game_directory() || self.is_empty().unwrap_or(false))
    }

    /// Validate a directory chosen by the user.
    pub fn validate(&self) -> Result<(), DirectoryRejection> {
        if self.root.as_os_str().is_empty() || !self.root.exists() {
            return Err(DirectoryRejection::Missing);
        }
        if !self.root.is_dir() {
            return Err(DirectoryRejection::NotADirectory);
        }
        if self.is_empty().unwrap_or(false) {
            return Ok(());
        }
        if !self.is_game_directory() {
            return Err(DirectoryRejection::NotAGameDirectory);
        }
        if !self.is_correct_locale() {
            return Err(DirectoryRejection::WrongLocale);
        }
        Ok(())
    }

    /// Whether writing beneath the root needs permissions this process lacks.
    /// Only checks permissions; never creates anything.
    pub fn requires_elevation(&self) -> bool {
        let target = self.nearest_existing_ancestor();
        let writable = (self.write_check)(&target);
        if !writable {
            debug!("{} is not writable by the current user", target.display());
        }
        !writable
    }

    fn nearest_existing_ancestor(&self) -> PathBuf {
        self.root
            .ancestors()
            .find(|p| p.exists())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone())
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.root.join(CACHE_DIR)
    }

    /// Remove the client cache directory if present.
    pub fn clear_cache(&self) -> io::Result<()> {
        let cache = self.cache_dir();
        match std::fs::remove_dir_all(&cache) {
            Ok(()) => {
                info!("Cleared client cache at {}", cache.display());
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(unix)]
fn is_writable(path: &Path) -> bool {
    use nix::unistd::{access, AccessFlags};

    access(path, AccessFlags::W_OK).is_ok()
}

#[cfg(not(unix))]
fn is_writable(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|m| !m.permissions().readonly())
        .unwrap_or(false)
}
