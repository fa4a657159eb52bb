//! Symmetric chain keys.
//!
//! ```text
//! CK_n ──HMAC(0x01)──► MK_n      (message key, used once)
//!   │
//!   └──HMAC(0x02)──► CK_{n+1}
//! ```
//!
//! Deriving the next chain key is one-way, so holding `CK_{n+1}` reveals
//! nothing about `MK_n` or earlier keys.

use hmac::{Hmac, Mac};
use sealpost_core::EngineError;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

/// Size of chain and message keys in bytes.
pub const KEY_SIZE: usize = 32;

const MESSAGE_KEY_SEED: u8 = 0x01;
const CHAIN_KEY_SEED: u8 = 0x02;

/// One-time key for a single message.
pub type MessageKey = [u8; KEY_SIZE];

/// Position in a symmetric ratchet.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainKey {
    key: [u8; KEY_SIZE],
    index: u64,
}

impl ChainKey {
    /// Chain starting at index 0.
    pub fn new(key: [u8; KEY_SIZE]) -> Self {
        Self { key, index: 0 }
    }

    /// Index of the next message key this chain yields.
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Message key for the current index and the chain advanced past it.
    pub fn advance(&self) -> Result<(Self, MessageKey), EngineError> {
        let message_key = self.derive(MESSAGE_KEY_SEED)?;
        let next = Self { key: self.derive(CHAIN_KEY_SEED)?, index: self.index + 1 };
        Ok((next, message_key))
    }

    fn derive(&self, seed: u8) -> Result<[u8; KEY_SIZE], EngineError> {
        let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(&self.key)
            .map_err(|e| EngineError::InvalidState { reason: e.to_string() })?;
        mac.update(&[seed]);

        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(&mac.finalize().into_bytes());
        Ok(key)
    }
}

impl std::fmt::Debug for ChainKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainKey").field("key", &"<redacted>").field("index", &self.index).finish()
    }
}
