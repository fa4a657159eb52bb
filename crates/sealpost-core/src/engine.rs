//! Ratchet engine capability.
//!
//! The engine owns all cryptography: key derivation, AEAD, handshake
//! material. Sealpost treats its state as an opaque serializable value and
//! only ever asks it to perform one of the operations below.
//!
//! Operations take the current state by reference and return the advanced
//! state as a new value. A failed operation therefore leaves the caller's
//! state untouched, and nothing is advanced until the caller decides to
//! persist the returned value.

use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;

use crate::env::Environment;

/// Size of the local identity secret in bytes.
pub const IDENTITY_KEY_SIZE: usize = 32;

/// Local long-term identity secret.
///
/// # Security
///
/// - **Debug Redaction**: The `Debug` impl never prints key bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct IdentityKey([u8; IDENTITY_KEY_SIZE]);

impl IdentityKey {
    /// Wrap existing key bytes.
    pub fn from_bytes(bytes: [u8; IDENTITY_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Generate a fresh identity from the environment's RNG.
    pub fn generate<E: Environment>(env: &E) -> Self {
        Self(env.random_array())
    }

    /// Secret key bytes.
    pub fn as_bytes(&self) -> &[u8; IDENTITY_KEY_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for IdentityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("IdentityKey(<redacted>)")
    }
}

/// Errors reported by a ratchet engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// The peer's handshake material has not been absorbed yet, so no
    /// sending chain exists.
    #[error("handshake not complete")]
    HandshakeIncomplete,

    /// Peer handshake material is malformed or conflicts with the session.
    #[error("invalid handshake material: {reason}")]
    InvalidHandshake {
        /// Description of the problem.
        reason: String,
    },

    /// Ciphertext failed to authenticate or parse.
    #[error("decryption failed: {reason}")]
    Decrypt {
        /// Description of the failure.
        reason: String,
    },

    /// Encryption failed.
    #[error("encryption failed: {reason}")]
    Encrypt {
        /// Description of the failure.
        reason: String,
    },

    /// Engine state is internally inconsistent.
    #[error("inconsistent engine state: {reason}")]
    InvalidState {
        /// Description of the inconsistency.
        reason: String,
    },
}

/// Capability interface of a forward-secret ratchet.
///
/// Implementations seed fresh state from their own randomness source; the
/// core never supplies entropy directly.
pub trait RatchetEngine {
    /// Opaque per-peer state. Serialized whole; never inspected.
    type State: Serialize + DeserializeOwned;

    /// Initialise fresh state seeded with the local identity.
    fn create(&self, identity: &IdentityKey) -> Result<Self::State, EngineError>;

    /// Handshake material the peer needs to complete the exchange.
    ///
    /// Must be callable repeatedly without advancing the state.
    fn handshake_material(&self, state: &Self::State) -> Result<Vec<u8>, EngineError>;

    /// Absorb the peer's handshake material.
    fn complete_handshake(
        &self,
        state: &Self::State,
        material: &[u8],
    ) -> Result<Self::State, EngineError>;

    /// Encrypt `plaintext`, advancing the sending chain.
    ///
    /// Returns [`EngineError::HandshakeIncomplete`] until the peer's
    /// material has been absorbed.
    fn encrypt(
        &self,
        state: &Self::State,
        plaintext: &[u8],
    ) -> Result<(Self::State, Vec<u8>), EngineError>;

    /// Decrypt `ciphertext`, advancing the receiving chain.
    fn decrypt(
        &self,
        state: &Self::State,
        ciphertext: &[u8],
    ) -> Result<(Self::State, Vec<u8>), EngineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_debug_is_redacted() {
        let key = IdentityKey::from_bytes([0x5a; IDENTITY_KEY_SIZE]);
        assert_eq!(format!("{key:?}"), "IdentityKey(<redacted>)");
    }

    #[test]
    fn engine_error_display() {
        let err = EngineError::Decrypt { reason: "tag mismatch".to_string() };
        assert_eq!(err.to_string(), "decryption failed: tag mismatch");
        assert_eq!(EngineError::HandshakeIncomplete.to_string(), "handshake not complete");
    }
}
