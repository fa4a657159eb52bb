//! Storage backends.
//!
//! A [`Storage`] is a flat key/value slot store split into namespaces. The
//! session and marker stores are built on top of it, so the same
//! orchestration code runs against the filesystem in production and against
//! in-memory or fault-injecting backends in tests.
//!
//! # Invariants
//!
//! - `write` fully replaces prior content; readers never observe a partial
//!   write
//! - `read` returns `Ok(None)` only when the slot is absent; every other
//!   failure is an error
//! - `remove` of an absent slot succeeds

mod chaotic;
mod file;
mod memory;

use std::fmt;

pub use chaotic::ChaoticStorage;
pub use file::FileStorage;
pub use memory::MemoryStorage;

/// Independent key spaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// Encoded ratchet state, one slot per peer.
    Sessions,
    /// Zero-length bootstrap markers, one slot per peer.
    Markers,
    /// Local identity material.
    Identity,
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sessions => "sessions",
            Self::Markers => "markers",
            Self::Identity => "identity",
        })
    }
}

/// Storage failures.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Underlying I/O failed.
    #[error("{operation} {namespace}/{key} failed: {source}")]
    Io {
        /// Operation that failed.
        operation: &'static str,
        /// Namespace of the slot.
        namespace: Namespace,
        /// Slot key.
        key: String,
        /// I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Key cannot name a slot (empty or contains path syntax).
    #[error("invalid storage key {key:?}")]
    InvalidKey {
        /// Rejected key.
        key: String,
    },

    /// Failure injected by [`ChaoticStorage`].
    #[error("injected {operation} failure on {namespace}/{key}")]
    Injected {
        /// Operation that was failed.
        operation: &'static str,
        /// Namespace of the slot.
        namespace: Namespace,
        /// Slot key.
        key: String,
    },
}

/// Durable slot storage.
pub trait Storage {
    /// Read a slot. `Ok(None)` if absent.
    fn read(&self, namespace: Namespace, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Replace a slot's content.
    fn write(&self, namespace: Namespace, key: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Delete a slot. Idempotent.
    fn remove(&self, namespace: Namespace, key: &str) -> Result<(), StorageError>;

    /// Whether a slot exists.
    fn contains(&self, namespace: Namespace, key: &str) -> Result<bool, StorageError>;
}

impl<S: Storage + ?Sized> Storage for &S {
    fn read(&self, namespace: Namespace, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        (**self).read(namespace, key)
    }

    fn write(&self, namespace: Namespace, key: &str, data: &[u8]) -> Result<(), StorageError> {
        (**self).write(namespace, key, data)
    }

    fn remove(&self, namespace: Namespace, key: &str) -> Result<(), StorageError> {
        (**self).remove(namespace, key)
    }

    fn contains(&self, namespace: Namespace, key: &str) -> Result<bool, StorageError> {
        (**self).contains(namespace, key)
    }
}

/// Reject keys that could escape their namespace directory.
pub(crate) fn validate_key(key: &str) -> Result<(), StorageError> {
    let bad = key.is_empty()
        || key == "."
        || key == ".."
        || key.contains(['/', '\\', '\0'])
        || key.starts_with('.');
    if bad {
        return Err(StorageError::InvalidKey { key: key.to_string() });
    }
    Ok(())
}
