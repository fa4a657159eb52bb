//! X25519 + symmetric-chain ratchet engine.
//!
//! Each session holds a copy of the local identity secret and a per-session
//! ephemeral secret. Handshake material is the two matching public keys.
//! Once both sides have each other's material they run the same triple
//! Diffie-Hellman, ordered by ephemeral public key so neither side needs a
//! fixed initiator role, and derive one chain per direction:
//!
//! ```text
//! dh1 = DH(low.identity, high.ephemeral)
//! dh2 = DH(low.ephemeral, high.identity)
//! dh3 = DH(low.ephemeral, high.ephemeral)
//!
//! HKDF(salt = low.eph || high.eph, ikm = dh1 || dh2 || dh3)
//!   ├─ "sealpost chain low->high" ─► low's sending chain
//!   └─ "sealpost chain high->low" ─► high's sending chain
//! ```
//!
//! Messages are sealed with XChaCha20-Poly1305 under a one-time message key
//! and a random nonce; the chain index is bound as associated data.

use chacha20poly1305::{
    XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit, Payload},
};
use hkdf::Hkdf;
use sealpost_core::{EngineError, Environment, IdentityKey, RatchetEngine};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use x25519_dalek::{PublicKey, SharedSecret, StaticSecret};

use crate::chain::{ChainKey, KEY_SIZE, MessageKey};

/// XChaCha20-Poly1305 nonce size.
pub const NONCE_SIZE: usize = 24;

/// Largest forward jump in a receiving chain accepted from one message.
pub const MAX_SKIP: u64 = 256;

/// Upper bound on retained keys for messages not yet received.
///
/// Oldest keys are discarded first; their messages become undecryptable.
pub const MAX_SKIPPED_KEYS: usize = 256;

const LOW_TO_HIGH: &[u8] = b"sealpost chain low->high";
const HIGH_TO_LOW: &[u8] = b"sealpost chain high->low";

/// Public half of a session, exchanged as handshake material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct Handshake {
    identity: [u8; KEY_SIZE],
    ephemeral: [u8; KEY_SIZE],
}

#[derive(Clone, Serialize, Deserialize)]
struct SkippedKey {
    index: u64,
    key: MessageKey,
}

#[derive(Serialize, Deserialize)]
struct WireMessage {
    index: u64,
    nonce: [u8; NONCE_SIZE],
    #[serde(with = "serde_bytes")]
    ciphertext: Vec<u8>,
}

/// Per-peer engine state.
///
/// Serialized whole by the session store. Contains secret key material.
#[derive(Clone, Serialize, Deserialize)]
pub struct SessionState {
    identity: [u8; KEY_SIZE],
    ephemeral: [u8; KEY_SIZE],
    peer: Option<Handshake>,
    sending: Option<ChainKey>,
    receiving: Option<ChainKey>,
    skipped: Vec<SkippedKey>,
}

impl SessionState {
    /// Whether the peer's handshake material has been absorbed.
    pub fn is_established(&self) -> bool {
        self.peer.is_some()
    }

    /// Messages sent on this session so far.
    pub fn sent(&self) -> u64 {
        self.sending.as_ref().map_or(0, ChainKey::index)
    }

    fn public(&self) -> Handshake {
        Handshake {
            identity: public_key(&self.identity),
            ephemeral: public_key(&self.ephemeral),
        }
    }
}

impl std::fmt::Debug for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionState")
            .field("established", &self.is_established())
            .field("sending", &self.sending)
            .field("receiving", &self.receiving)
            .field("skipped", &self.skipped.len())
            .finish_non_exhaustive()
    }
}

/// Reference [`RatchetEngine`].
///
/// Fresh ephemeral secrets and nonces come from `E`.
#[derive(Debug, Clone)]
pub struct SealEngine<E> {
    env: E,
}

impl<E: Environment> SealEngine<E> {
    /// Engine drawing randomness from `env`.
    pub fn new(env: E) -> Self {
        Self { env }
    }
}

impl<E: Environment> RatchetEngine for SealEngine<E> {
    type State = SessionState;

    fn create(&self, identity: &IdentityKey) -> Result<SessionState, EngineError> {
        Ok(SessionState {
            identity: *identity.as_bytes(),
            ephemeral: self.env.random_array(),
            peer: None,
            sending: None,
            receiving: None,
            skipped: Vec::new(),
        })
    }

    fn handshake_material(&self, state: &SessionState) -> Result<Vec<u8>, EngineError> {
        let mut material = Vec::new();
        ciborium::ser::into_writer(&state.public(), &mut material)
            .map_err(|e| EngineError::InvalidState { reason: e.to_string() })?;
        Ok(material)
    }

    fn complete_handshake(
        &self,
        state: &SessionState,
        material: &[u8],
    ) -> Result<SessionState, EngineError> {
        let theirs: Handshake = ciborium::de::from_reader(material)
            .map_err(|e| invalid_handshake(format!("undecodable material: {e}")))?;

        if let Some(known) = state.peer {
            if known == theirs {
                tracing::debug!("handshake material already absorbed");
                return Ok(state.clone());
            }
            return Err(invalid_handshake("conflicts with previously absorbed material"));
        }

        let ours = state.public();
        if theirs.ephemeral == ours.ephemeral {
            return Err(invalid_handshake("material is our own"));
        }

        let (low_to_high, high_to_low) = agree(state, &theirs)?;
        let (sending, receiving) = if ours.ephemeral < theirs.ephemeral {
            (low_to_high, high_to_low)
        } else {
            (high_to_low, low_to_high)
        };

        Ok(SessionState {
            peer: Some(theirs),
            sending: Some(ChainKey::new(sending)),
            receiving: Some(ChainKey::new(receiving)),
            skipped: Vec::new(),
            ..state.clone()
        })
    }

    fn encrypt(
        &self,
        state: &SessionState,
        plaintext: &[u8],
    ) -> Result<(SessionState, Vec<u8>), EngineError> {
        let chain = state.sending.as_ref().ok_or(EngineError::HandshakeIncomplete)?;
        let (next, key) = chain.advance()?;

        let nonce: [u8; NONCE_SIZE] = self.env.random_array();
        let ciphertext = XChaCha20Poly1305::new_from_slice(&key)
            .map_err(|e| EngineError::Encrypt { reason: e.to_string() })?
            .encrypt(
                XNonce::from_slice(&nonce),
                Payload { msg: plaintext, aad: &chain.index().to_be_bytes() },
            )
            .map_err(|e| EngineError::Encrypt { reason: e.to_string() })?;

        let mut wire = Vec::new();
        ciborium::ser::into_writer(&WireMessage { index: chain.index(), nonce, ciphertext }, &mut wire)
            .map_err(|e| EngineError::Encrypt { reason: e.to_string() })?;

        let mut advanced = state.clone();
        advanced.sending = Some(next);
        Ok((advanced, wire))
    }

    fn decrypt(
        &self,
        state: &SessionState,
        ciphertext: &[u8],
    ) -> Result<(SessionState, Vec<u8>), EngineError> {
        let chain = state.receiving.as_ref().ok_or(EngineError::HandshakeIncomplete)?;
        let message: WireMessage = ciborium::de::from_reader(ciphertext)
            .map_err(|e| decrypt_failure(format!("malformed message: {e}")))?;

        let mut advanced = state.clone();
        let key = if message.index < chain.index() {
            let position = advanced
                .skipped
                .iter()
                .position(|s| s.index == message.index)
                .ok_or_else(|| decrypt_failure("message key already used or discarded"))?;
            advanced.skipped.remove(position).key
        } else {
            let gap = message.index - chain.index();
            if gap > MAX_SKIP {
                return Err(decrypt_failure(format!("message skips {gap} keys (max {MAX_SKIP})")));
            }

            let mut chain = chain.clone();
            while chain.index() < message.index {
                let (next, key) = chain.advance()?;
                advanced.skipped.push(SkippedKey { index: chain.index(), key });
                chain = next;
            }
            let (next, key) = chain.advance()?;
            advanced.receiving = Some(next);
            key
        };

        let excess = advanced.skipped.len().saturating_sub(MAX_SKIPPED_KEYS);
        if excess > 0 {
            tracing::debug!(excess, "discarding oldest skipped message keys");
            advanced.skipped.drain(..excess);
        }

        let plaintext = XChaCha20Poly1305::new_from_slice(&key)
            .map_err(|e| decrypt_failure(e.to_string()))?
            .decrypt(
                XNonce::from_slice(&message.nonce),
                Payload { msg: &message.ciphertext, aad: &message.index.to_be_bytes() },
            )
            .map_err(|_| decrypt_failure("authentication failed"))?;

        Ok((advanced, plaintext))
    }
}

/// Chain keys `(low->high, high->low)` shared with the peer.
fn agree(
    state: &SessionState,
    theirs: &Handshake,
) -> Result<([u8; KEY_SIZE], [u8; KEY_SIZE]), EngineError> {
    let ours = state.public();
    let identity = StaticSecret::from(state.identity);
    let ephemeral = StaticSecret::from(state.ephemeral);
    let their_identity = PublicKey::from(theirs.identity);
    let their_ephemeral = PublicKey::from(theirs.ephemeral);

    let we_are_low = ours.ephemeral < theirs.ephemeral;
    let (dh1, dh2) = if we_are_low {
        (identity.diffie_hellman(&their_ephemeral), ephemeral.diffie_hellman(&their_identity))
    } else {
        (ephemeral.diffie_hellman(&their_identity), identity.diffie_hellman(&their_ephemeral))
    };
    let dh3 = ephemeral.diffie_hellman(&their_ephemeral);

    let shared: [&SharedSecret; 3] = [&dh1, &dh2, &dh3];
    if shared.iter().any(|dh| !dh.was_contributory()) {
        return Err(invalid_handshake("peer key is a low-order point"));
    }

    let (low, high) = if we_are_low { (ours, *theirs) } else { (*theirs, ours) };
    let mut salt = Vec::with_capacity(2 * KEY_SIZE);
    salt.extend_from_slice(&low.ephemeral);
    salt.extend_from_slice(&high.ephemeral);

    let mut ikm = Vec::with_capacity(3 * KEY_SIZE);
    for dh in shared {
        ikm.extend_from_slice(dh.as_bytes());
    }

    let hkdf = Hkdf::<Sha256>::new(Some(salt.as_slice()), &ikm);
    let mut low_to_high = [0u8; KEY_SIZE];
    let mut high_to_low = [0u8; KEY_SIZE];
    hkdf.expand(LOW_TO_HIGH, &mut low_to_high)
        .map_err(|e| EngineError::InvalidState { reason: e.to_string() })?;
    hkdf.expand(HIGH_TO_LOW, &mut high_to_low)
        .map_err(|e| EngineError::InvalidState { reason: e.to_string() })?;

    Ok((low_to_high, high_to_low))
}

fn public_key(secret: &[u8; KEY_SIZE]) -> [u8; KEY_SIZE] {
    PublicKey::from(&StaticSecret::from(*secret)).to_bytes()
}

fn invalid_handshake(reason: impl Into<String>) -> EngineError {
    EngineError::InvalidHandshake { reason: reason.into() }
}

fn decrypt_failure(reason: impl Into<String>) -> EngineError {
    EngineError::Decrypt { reason: reason.into() }
}
