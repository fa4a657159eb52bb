//! Filesystem storage.
//!
//! Layout under the configured home:
//!
//! ```text
//! <home>/ratchets/<hex peer>   armored session state
//! <home>/new/<hex peer>        zero-byte bootstrap marker
//! <home>/identity              armored identity key
//! ```
//!
//! Writes go to a temporary file in the target directory which is synced and
//! then renamed over the destination, so a crash mid-write leaves either the
//! old or the new content, never a mix.

use std::{
    fs,
    io::{self, Write},
    path::PathBuf,
};

use tempfile::NamedTempFile;

use super::{Namespace, Storage, StorageError, validate_key};
use crate::config::ClientConfig;

/// Storage rooted in a directory on disk.
#[derive(Debug, Clone)]
pub struct FileStorage {
    config: ClientConfig,
}

impl FileStorage {
    /// Storage using the layout described by `config`.
    ///
    /// Directories are created lazily on first write.
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }

    /// Configuration this storage was opened with.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn slot_path(&self, namespace: Namespace, key: &str) -> Result<PathBuf, StorageError> {
        validate_key(key)?;
        Ok(match namespace {
            Namespace::Sessions => self.config.sessions_dir().join(key),
            Namespace::Markers => self.config.markers_dir().join(key),
            Namespace::Identity => self.config.home().join(key),
        })
    }

    fn io_error<'a>(
        operation: &'static str,
        namespace: Namespace,
        key: &'a str,
    ) -> impl FnOnce(io::Error) -> StorageError + 'a {
        move |source| StorageError::Io { operation, namespace, key: key.to_string(), source }
    }

    fn write_atomic(path: &std::path::Path, data: &[u8]) -> io::Result<()> {
        let dir = path.parent().ok_or_else(|| io::Error::other("slot path has no parent"))?;
        fs::create_dir_all(dir)?;

        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(data)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }
}

impl Storage for FileStorage {
    fn read(&self, namespace: Namespace, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let path = self.slot_path(namespace, key)?;
        match fs::read(&path) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Self::io_error("read", namespace, key)(e)),
        }
    }

    fn write(&self, namespace: Namespace, key: &str, data: &[u8]) -> Result<(), StorageError> {
        let path = self.slot_path(namespace, key)?;
        Self::write_atomic(&path, data).map_err(Self::io_error("write", namespace, key))?;
        tracing::trace!(%namespace, key, bytes = data.len(), "slot written");
        Ok(())
    }

    fn remove(&self, namespace: Namespace, key: &str) -> Result<(), StorageError> {
        let path = self.slot_path(namespace, key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Self::io_error("remove", namespace, key)(e)),
        }
    }

    fn contains(&self, namespace: Namespace, key: &str) -> Result<bool, StorageError> {
        let path = self.slot_path(namespace, key)?;
        path.try_exists().map_err(Self::io_error("stat", namespace, key))
    }
}
