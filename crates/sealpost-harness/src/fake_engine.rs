//! Transparent ratchet engine with observable counters.
//!
//! No cryptography: handshake material is the session id and ciphertext is
//! the plaintext prefixed with `(sender, recipient, counter)`. This makes
//! every one-time key visible to tests as the pair `(sender, counter)`.
//!
//! Session ids come from a counter shared by all clones, so sessions created
//! through clones of one engine are globally unique and numbered from 1.

use std::sync::{Arc, Mutex, PoisonError};

use sealpost_core::{EngineError, IdentityKey, RatchetEngine};
use serde::{Deserialize, Serialize};

const HEADER_LEN: usize = 24;

/// State of a fake session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FakeState {
    /// Globally unique session id.
    pub session: u64,
    /// Session id of the peer, once their material has been absorbed.
    pub peer: Option<u64>,
    /// Messages encrypted so far.
    pub sent: u64,
    /// Lowest counter still accepted from the peer.
    pub next_expected: u64,
}

/// Decoded fake ciphertext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeCiphertext {
    /// Sending session.
    pub sender: u64,
    /// Receiving session.
    pub recipient: u64,
    /// Position in the sender's chain.
    pub counter: u64,
    /// Carried plaintext.
    pub plaintext: Vec<u8>,
}

impl FakeCiphertext {
    /// Parse a ciphertext produced by [`FakeEngine::encrypt`].
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < HEADER_LEN {
            return None;
        }
        let word = |i: usize| {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(&bytes[i * 8..(i + 1) * 8]);
            u64::from_be_bytes(buf)
        };
        Some(Self {
            sender: word(0),
            recipient: word(1),
            counter: word(2),
            plaintext: bytes[HEADER_LEN..].to_vec(),
        })
    }

    /// Identifier of the one-time key this ciphertext used.
    pub fn key_id(&self) -> (u64, u64) {
        (self.sender, self.counter)
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.plaintext.len());
        out.extend_from_slice(&self.sender.to_be_bytes());
        out.extend_from_slice(&self.recipient.to_be_bytes());
        out.extend_from_slice(&self.counter.to_be_bytes());
        out.extend_from_slice(&self.plaintext);
        out
    }
}

/// Call counts observed by a [`FakeEngine`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineCalls {
    /// `create` calls.
    pub creates: u64,
    /// `handshake_material` calls.
    pub materials: u64,
    /// `complete_handshake` calls.
    pub handshakes: u64,
    /// `encrypt` calls.
    pub encrypts: u64,
    /// `decrypt` calls.
    pub decrypts: u64,
}

#[derive(Debug, Default)]
struct Shared {
    last_session: u64,
    calls: EngineCalls,
    fail_next: Option<EngineError>,
}

/// Deterministic engine for orchestration tests.
#[derive(Debug, Clone, Default)]
pub struct FakeEngine {
    shared: Arc<Mutex<Shared>>,
}

impl FakeEngine {
    /// Engine with no sessions created yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Calls observed so far, across all clones.
    pub fn calls(&self) -> EngineCalls {
        self.with_shared(|s| s.calls)
    }

    /// Make the next engine operation fail with `error`.
    pub fn fail_next(&self, error: EngineError) {
        self.with_shared(|s| s.fail_next = Some(error));
    }

    fn with_shared<T>(&self, f: impl FnOnce(&mut Shared) -> T) -> T {
        let mut shared = self.shared.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut shared)
    }

    /// Record a call and return the armed failure, if any.
    fn enter(&self, record: impl FnOnce(&mut EngineCalls)) -> Result<(), EngineError> {
        self.with_shared(|s| {
            record(&mut s.calls);
            s.fail_next.take().map_or(Ok(()), Err)
        })
    }
}

impl RatchetEngine for FakeEngine {
    type State = FakeState;

    fn create(&self, _identity: &IdentityKey) -> Result<FakeState, EngineError> {
        self.enter(|c| c.creates += 1)?;
        let session = self.with_shared(|s| {
            s.last_session += 1;
            s.last_session
        });
        Ok(FakeState { session, peer: None, sent: 0, next_expected: 0 })
    }

    fn handshake_material(&self, state: &FakeState) -> Result<Vec<u8>, EngineError> {
        self.enter(|c| c.materials += 1)?;
        Ok(state.session.to_be_bytes().to_vec())
    }

    fn complete_handshake(
        &self,
        state: &FakeState,
        material: &[u8],
    ) -> Result<FakeState, EngineError> {
        self.enter(|c| c.handshakes += 1)?;
        let bytes: [u8; 8] = material.try_into().map_err(|_| EngineError::InvalidHandshake {
            reason: format!("expected 8 bytes, got {}", material.len()),
        })?;
        let peer = u64::from_be_bytes(bytes);

        if peer == state.session {
            return Err(EngineError::InvalidHandshake { reason: "own material".into() });
        }
        match state.peer {
            Some(known) if known == peer => Ok(state.clone()),
            Some(known) => Err(EngineError::InvalidHandshake {
                reason: format!("already paired with session {known}, got {peer}"),
            }),
            None => Ok(FakeState { peer: Some(peer), ..state.clone() }),
        }
    }

    fn encrypt(
        &self,
        state: &FakeState,
        plaintext: &[u8],
    ) -> Result<(FakeState, Vec<u8>), EngineError> {
        self.enter(|c| c.encrypts += 1)?;
        let recipient = state.peer.ok_or(EngineError::HandshakeIncomplete)?;

        let ciphertext = FakeCiphertext {
            sender: state.session,
            recipient,
            counter: state.sent,
            plaintext: plaintext.to_vec(),
        };
        Ok((FakeState { sent: state.sent + 1, ..state.clone() }, ciphertext.to_bytes()))
    }

    fn decrypt(
        &self,
        state: &FakeState,
        ciphertext: &[u8],
    ) -> Result<(FakeState, Vec<u8>), EngineError> {
        self.enter(|c| c.decrypts += 1)?;
        let peer = state.peer.ok_or(EngineError::HandshakeIncomplete)?;
        let message = FakeCiphertext::parse(ciphertext)
            .ok_or_else(|| EngineError::Decrypt { reason: "truncated".into() })?;

        if message.sender != peer || message.recipient != state.session {
            return Err(EngineError::Decrypt { reason: "wrong session".into() });
        }
        if message.counter < state.next_expected {
            return Err(EngineError::Decrypt { reason: "replayed counter".into() });
        }

        let advanced = FakeState { next_expected: message.counter + 1, ..state.clone() };
        Ok((advanced, message.plaintext))
    }
}
