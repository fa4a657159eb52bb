//! Bootstrap marker store.
//!
//! One advisory flag per peer meaning "our handshake material has not yet
//! been confirmed delivered". Set when a session is created, cleared after
//! the first fully successful send (or a successfully decrypted message from
//! the peer). Absence is the steady state.
//!
//! The marker is never authoritative about cryptographic state: losing it
//! only skips a re-announcement, and a stale marker only causes a redundant
//! one.

use crate::{
    peer::PeerId,
    storage::{Namespace, Storage, StorageError},
};

/// Per-peer existence flags, independent of session state.
#[derive(Debug, Clone)]
pub struct MarkerStore<S> {
    storage: S,
}

impl<S: Storage> MarkerStore<S> {
    /// Marker store on `storage`.
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    /// Flag `peer` as freshly bootstrapped.
    pub fn mark_new(&self, peer: &PeerId) -> Result<(), StorageError> {
        self.storage.write(Namespace::Markers, &peer.storage_key(), &[])
    }

    /// Whether `peer` still needs handshake re-announcement.
    pub fn is_new(&self, peer: &PeerId) -> Result<bool, StorageError> {
        self.storage.contains(Namespace::Markers, &peer.storage_key())
    }

    /// Clear the flag for `peer`. Succeeds if already clear.
    pub fn clear_new(&self, peer: &PeerId) -> Result<(), StorageError> {
        self.storage.remove(Namespace::Markers, &peer.storage_key())
    }
}
