//! Sealpost reference ratchet engine.
//!
//! A [`RatchetEngine`](sealpost_core::RatchetEngine) built from X25519
//! agreement, HKDF-SHA256, HMAC-SHA256 chain keys and XChaCha20-Poly1305.
//! Sealpost core never depends on this crate; the binary injects it.
//!
//! # Security Properties
//!
//! - Forward Secrecy: every message uses a fresh key derived one-way from
//!   the chain, and the chain only moves forward
//! - Replay Rejection: a message key is consumed on first successful use
//! - Bounded Skipping: out-of-order delivery is tolerated up to
//!   [`MAX_SKIP`] messages ahead
//!
//! There is no Diffie-Hellman ratchet step after the initial agreement, so
//! compromise of a session's state exposes all of its future messages. The
//! remedy is to forget the session and bootstrap a new one.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod chain;
pub mod engine;

pub use chain::{ChainKey, KEY_SIZE, MessageKey};
pub use engine::{MAX_SKIP, MAX_SKIPPED_KEYS, NONCE_SIZE, SealEngine, SessionState};
