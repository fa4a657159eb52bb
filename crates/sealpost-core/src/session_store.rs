//! Session store.
//!
//! Durable mapping from peer to encoded ratchet state. The state is an opaque
//! serializable value: it is CBOR-encoded, wrapped in a `RATCHET` envelope
//! and written whole to the peer's slot.
//!
//! # Invariants
//!
//! - Exactly one authoritative copy per peer
//! - `save` fully replaces prior content (the backend guarantees atomic
//!   replacement)
//! - `load` distinguishes a missing session (`Ok(None)`) from one that
//!   exists but cannot be used (`Err(Corrupt)`)

use sealpost_proto::{Envelope, EnvelopeKind};
use serde::{Serialize, de::DeserializeOwned};

use crate::{
    engine::{IdentityKey, RatchetEngine},
    error::SessionStoreError,
    marker_store::MarkerStore,
    peer::PeerId,
    storage::{Namespace, Storage, StorageError},
};

/// Per-peer ratchet state persistence.
#[derive(Debug, Clone)]
pub struct SessionStore<S> {
    storage: S,
    markers: MarkerStore<S>,
}

impl<S: Storage + Clone> SessionStore<S> {
    /// Session store (and its marker store) on `storage`.
    pub fn new(storage: S) -> Self {
        Self { markers: MarkerStore::new(storage.clone()), storage }
    }
}

impl<S: Storage> SessionStore<S> {
    /// Bootstrap markers sharing this store's backend.
    pub fn markers(&self) -> &MarkerStore<S> {
        &self.markers
    }

    /// Load the state for `peer`.
    ///
    /// Returns `Ok(None)` on first contact. A slot that exists but cannot be
    /// read, is not a `RATCHET` envelope, or does not deserialize is
    /// [`SessionStoreError::Corrupt`].
    pub fn load<T: DeserializeOwned>(&self, peer: &PeerId) -> Result<Option<T>, SessionStoreError> {
        let corrupt = |reason: String| SessionStoreError::Corrupt { peer: peer.clone(), reason };

        let Some(bytes) = self
            .storage
            .read(Namespace::Sessions, &peer.storage_key())
            .map_err(|e| corrupt(e.to_string()))?
        else {
            return Ok(None);
        };

        let text = std::str::from_utf8(&bytes).map_err(|e| corrupt(e.to_string()))?;
        let envelope = Envelope::decode_kind(text, EnvelopeKind::Ratchet)
            .map_err(|e| corrupt(e.to_string()))?;
        let state = ciborium::de::from_reader(&envelope.payload[..])
            .map_err(|e| corrupt(format!("undecodable state: {e}")))?;

        tracing::debug!(%peer, bytes = bytes.len(), "session loaded");
        Ok(Some(state))
    }

    /// Serialize `state` and replace the stored session for `peer`.
    pub fn save<T: Serialize>(&self, peer: &PeerId, state: &T) -> Result<(), SessionStoreError> {
        let mut payload = Vec::new();
        ciborium::ser::into_writer(state, &mut payload)
            .map_err(|e| SessionStoreError::Encode { reason: e.to_string() })?;

        let text = Envelope::new(EnvelopeKind::Ratchet, payload)
            .encode()
            .map_err(|e| SessionStoreError::Encode { reason: e.to_string() })?;

        self.storage.write(Namespace::Sessions, &peer.storage_key(), text.as_bytes())?;

        tracing::debug!(%peer, bytes = text.len(), "session saved");
        Ok(())
    }

    /// Create, mark and persist a fresh session for `peer`.
    ///
    /// The marker is set before the state is written: a marker without a
    /// session is harmless (the next create sets it again), while a session
    /// without its marker would skip the handshake re-announcement.
    pub fn create<E: RatchetEngine>(
        &self,
        peer: &PeerId,
        engine: &E,
        identity: &IdentityKey,
    ) -> Result<E::State, SessionStoreError> {
        let state = engine.create(identity)?;
        self.insert(peer, &state)?;
        Ok(state)
    }

    /// Mark and persist `state` as a new session for `peer`.
    ///
    /// Same ordering as [`create`](Self::create), for states the caller built
    /// itself.
    pub fn insert<T: Serialize>(&self, peer: &PeerId, state: &T) -> Result<(), SessionStoreError> {
        self.markers.mark_new(peer)?;
        self.save(peer, state)?;

        tracing::info!(%peer, "session created");
        Ok(())
    }

    /// Whether a session slot exists for `peer`, valid or not.
    pub fn exists(&self, peer: &PeerId) -> Result<bool, StorageError> {
        self.storage.contains(Namespace::Sessions, &peer.storage_key())
    }

    /// Delete the session for `peer`. Succeeds if none exists.
    pub fn remove(&self, peer: &PeerId) -> Result<(), StorageError> {
        self.storage.remove(Namespace::Sessions, &peer.storage_key())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde::Deserialize;

    use super::*;
    use crate::storage::{ChaoticStorage, MemoryStorage};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct State {
        counter: u64,
        key: Vec<u8>,
    }

    fn peer() -> PeerId {
        "bob".parse().unwrap()
    }

    #[test]
    fn missing_session_is_none() {
        let store = SessionStore::new(MemoryStorage::new());
        assert_eq!(store.load::<State>(&peer()).unwrap(), None);
    }

    #[test]
    fn save_then_load() {
        let store = SessionStore::new(MemoryStorage::new());
        let state = State { counter: 7, key: vec![1, 2, 3] };

        store.save(&peer(), &state).unwrap();

        assert_eq!(store.load::<State>(&peer()).unwrap(), Some(state));
    }

    #[test]
    fn stored_session_is_ratchet_envelope() {
        let storage = MemoryStorage::new();
        let store = SessionStore::new(storage.clone());

        store.save(&peer(), &State { counter: 1, key: vec![] }).unwrap();

        let raw = storage.read(Namespace::Sessions, "626f62").unwrap().unwrap();
        let text = String::from_utf8(raw).unwrap();
        assert!(text.starts_with("-----BEGIN SEALPOST RATCHET-----"));
    }

    #[test]
    fn truncated_session_is_corrupt_not_missing() {
        let storage = MemoryStorage::new();
        let store = SessionStore::new(storage.clone());
        store.save(&peer(), &State { counter: 1, key: vec![9; 64] }).unwrap();

        let raw = storage.read(Namespace::Sessions, "626f62").unwrap().unwrap();
        storage.put_raw(Namespace::Sessions, "626f62", raw[..raw.len() / 2].to_vec());

        assert!(matches!(store.load::<State>(&peer()), Err(SessionStoreError::Corrupt { .. })));
    }

    #[test]
    fn wrong_envelope_kind_is_corrupt() {
        let storage = MemoryStorage::new();
        let store = SessionStore::new(storage.clone());

        let text = Envelope::new(EnvelopeKind::KeyExchange, vec![0xa0]).encode().unwrap();
        storage.put_raw(Namespace::Sessions, "626f62", text.into_bytes());

        assert!(matches!(store.load::<State>(&peer()), Err(SessionStoreError::Corrupt { .. })));
    }

    #[test]
    fn wrong_state_shape_is_corrupt() {
        let storage = MemoryStorage::new();
        let store = SessionStore::new(storage.clone());

        store.save(&peer(), &"not a state").unwrap();

        assert!(matches!(store.load::<State>(&peer()), Err(SessionStoreError::Corrupt { .. })));
    }

    #[test]
    fn binary_garbage_is_corrupt() {
        let storage = MemoryStorage::new();
        let store = SessionStore::new(storage.clone());
        storage.put_raw(Namespace::Sessions, "626f62", vec![0xff, 0xfe, 0x00]);

        assert!(matches!(store.load::<State>(&peer()), Err(SessionStoreError::Corrupt { .. })));
    }

    #[test]
    fn unreadable_session_is_corrupt() {
        let storage = ChaoticStorage::new(MemoryStorage::new());
        let store = SessionStore::new(storage.clone());
        store.save(&peer(), &State { counter: 1, key: vec![] }).unwrap();

        storage.fail_next_reads(Namespace::Sessions, 1);

        assert!(matches!(store.load::<State>(&peer()), Err(SessionStoreError::Corrupt { .. })));
    }

    #[test]
    fn failed_save_reports_storage_error() {
        let storage = ChaoticStorage::new(MemoryStorage::new());
        let store = SessionStore::new(storage.clone());
        storage.fail_next_writes(Namespace::Sessions, 1);

        let result = store.save(&peer(), &State { counter: 1, key: vec![] });

        assert!(matches!(result, Err(SessionStoreError::Storage(StorageError::Injected { .. }))));
    }

    #[test]
    fn insert_marks_then_saves() {
        let storage = ChaoticStorage::new(MemoryStorage::new());
        let store = SessionStore::new(storage.clone());
        storage.fail_next_writes(Namespace::Sessions, 1);

        assert!(store.insert(&peer(), &State { counter: 0, key: vec![] }).is_err());
        assert!(store.markers().is_new(&peer()).unwrap());
        assert!(!store.exists(&peer()).unwrap());

        store.insert(&peer(), &State { counter: 0, key: vec![] }).unwrap();
        assert!(store.exists(&peer()).unwrap());
    }

    #[test]
    fn remove_deletes_only_the_session() {
        let storage = MemoryStorage::new();
        let store = SessionStore::new(storage.clone());
        store.save(&peer(), &State { counter: 1, key: vec![] }).unwrap();
        store.markers().mark_new(&peer()).unwrap();

        store.remove(&peer()).unwrap();

        assert!(!store.exists(&peer()).unwrap());
        assert!(store.markers().is_new(&peer()).unwrap());
    }
}
