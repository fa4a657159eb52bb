//! In-memory storage.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};

use super::{Namespace, Storage, StorageError, validate_key};

type Slots = HashMap<(Namespace, String), Vec<u8>>;

/// In-memory storage for tests.
///
/// Clones share the same slots, so a test can keep a handle for inspection
/// while the orchestrator owns another.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    slots: Arc<Mutex<Slots>>,
}

impl MemoryStorage {
    /// Empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of slots in a namespace.
    pub fn count(&self, namespace: Namespace) -> usize {
        self.with_slots(|slots| slots.keys().filter(|(ns, _)| *ns == namespace).count())
    }

    /// Overwrite a slot directly, bypassing validation. For corrupting state
    /// in tests.
    pub fn put_raw(&self, namespace: Namespace, key: &str, data: Vec<u8>) {
        self.with_slots(|slots| slots.insert((namespace, key.to_string()), data));
    }

    fn with_slots<T>(&self, f: impl FnOnce(&mut Slots) -> T) -> T {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut slots)
    }
}

impl Storage for MemoryStorage {
    fn read(&self, namespace: Namespace, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        validate_key(key)?;
        Ok(self.with_slots(|slots| slots.get(&(namespace, key.to_string())).cloned()))
    }

    fn write(&self, namespace: Namespace, key: &str, data: &[u8]) -> Result<(), StorageError> {
        validate_key(key)?;
        self.with_slots(|slots| slots.insert((namespace, key.to_string()), data.to_vec()));
        Ok(())
    }

    fn remove(&self, namespace: Namespace, key: &str) -> Result<(), StorageError> {
        validate_key(key)?;
        self.with_slots(|slots| slots.remove(&(namespace, key.to_string())));
        Ok(())
    }

    fn contains(&self, namespace: Namespace, key: &str) -> Result<bool, StorageError> {
        validate_key(key)?;
        Ok(self.with_slots(|slots| slots.contains_key(&(namespace, key.to_string()))))
    }
}
