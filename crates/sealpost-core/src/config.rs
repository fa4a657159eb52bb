//! Client configuration.

use std::path::{Path, PathBuf};

/// Directory holding one session file per peer.
pub const SESSIONS_DIR: &str = "ratchets";

/// Directory holding one bootstrap marker per peer.
pub const MARKERS_DIR: &str = "new";

/// File holding the local identity key.
pub const IDENTITY_FILE: &str = "identity";

/// Resolved storage locations for a sealpost home directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Root directory for all persistent state.
    pub home: PathBuf,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self { home: PathBuf::from(".") }
    }
}

impl ClientConfig {
    /// Configuration rooted at `home`.
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }

    /// Root directory.
    pub fn home(&self) -> &Path {
        &self.home
    }

    /// Directory of session files.
    pub fn sessions_dir(&self) -> PathBuf {
        self.home.join(SESSIONS_DIR)
    }

    /// Directory of bootstrap markers.
    pub fn markers_dir(&self) -> PathBuf {
        self.home.join(MARKERS_DIR)
    }

    /// Path of the identity key file.
    pub fn identity_path(&self) -> PathBuf {
        self.home.join(IDENTITY_FILE)
    }
}
