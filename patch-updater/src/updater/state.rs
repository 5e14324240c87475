//! Update phases.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Current phase of the update cycle, as shown to the observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpdateState {
    #[default]
    None,
    /// No usable installation directory is configured.
    Setup,
    GetManifest,
    VerifyingIntegrity,
    /// A partial update is waiting for the user to accept it.
    UpdateAvailable,
    Downloading,
    /// The install root is not writable by this process.
    RequiresElevation,
    Done,
}

impl UpdateState {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateState::None => "none",
            UpdateState::Setup => "setup",
            UpdateState::GetManifest => "get-manifest",
            UpdateState::VerifyingIntegrity => "verifying-integrity",
            UpdateState::UpdateAvailable => "update-available",
            UpdateState::Downloading => "downloading",
            UpdateState::RequiresElevation => "requires-elevation",
            UpdateState::Done => "done",
        }
    }
}

impl fmt::Display for UpdateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialized_names_match_as_str() {
        for state in [
            UpdateState::None,
            UpdateState::Setup,
            UpdateState::GetManifest,
            UpdateState::VerifyingIntegrity,
            UpdateState::UpdateAvailable,
            UpdateState::Downloading,
            UpdateState::RequiresElevation,
            UpdateState::Done,
        ] {
            let json = serde_json::to_string(&state).unwrap();
            assert_eq!(json, format!("\"{}\"", state.as_str()));
        }
    }

    #[test]
    fn test_default_is_none() {
        assert_eq!(UpdateState::default(), UpdateState::None);
    }
}
