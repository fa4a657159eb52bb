//! Local identity key persistence.

use sealpost_proto::{Envelope, EnvelopeKind};

use crate::{
    config::IDENTITY_FILE,
    engine::{IDENTITY_KEY_SIZE, IdentityKey},
    env::Environment,
    error::IdentityError,
    storage::{Namespace, Storage},
};

/// Stores the local long-term identity as an `IDENTITY KEY` envelope.
#[derive(Debug, Clone)]
pub struct IdentityStore<S> {
    storage: S,
}

impl<S: Storage> IdentityStore<S> {
    /// Identity store on `storage`.
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    /// Load the identity, if one has been generated.
    pub fn load(&self) -> Result<Option<IdentityKey>, IdentityError> {
        let Some(bytes) = self.storage.read(Namespace::Identity, IDENTITY_FILE)? else {
            return Ok(None);
        };

        let corrupt = |reason: String| IdentityError::Corrupt { reason };
        let text = std::str::from_utf8(&bytes).map_err(|e| corrupt(e.to_string()))?;
        let envelope = Envelope::decode_kind(text, EnvelopeKind::IdentityKey)
            .map_err(|e| corrupt(e.to_string()))?;
        let key: [u8; IDENTITY_KEY_SIZE] = envelope.payload.as_slice().try_into().map_err(|_| {
            corrupt(format!(
                "expected {IDENTITY_KEY_SIZE} key bytes, found {}",
                envelope.payload.len()
            ))
        })?;

        Ok(Some(IdentityKey::from_bytes(key)))
    }

    /// Persist `identity`, replacing any existing one.
    pub fn save(&self, identity: &IdentityKey) -> Result<(), IdentityError> {
        let text = Envelope::new(EnvelopeKind::IdentityKey, identity.as_bytes().to_vec()).encode()?;
        self.storage.write(Namespace::Identity, IDENTITY_FILE, text.as_bytes())?;
        Ok(())
    }

    /// Load the identity, generating and persisting one on first use.
    ///
    /// A corrupt identity is reported, never replaced: every session was
    /// seeded with it.
    pub fn load_or_generate<E: Environment>(&self, env: &E) -> Result<IdentityKey, IdentityError> {
        if let Some(identity) = self.load()? {
            return Ok(identity);
        }

        let identity = IdentityKey::generate(env);
        self.save(&identity)?;
        tracing::info!("generated new identity key");
        Ok(identity)
    }
}
