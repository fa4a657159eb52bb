//! Sealpost core.
//!
//! Lifecycle management for per-peer ratchet sessions: durable storage of
//! opaque engine state, the per-peer bootstrap marker, and the one-shot
//! send/receive orchestration that keeps the two consistent with what was
//! written to the transport.
//!
//! # Architecture
//!
//! ```text
//! Orchestrator ──► SessionStore ──► Storage (file / memory / chaotic)
//!      │                └─► MarkerStore ─┘
//!      ├─► RatchetEngine (injected, opaque state)
//!      └─► Envelope codec ──► output
//! ```
//!
//! The cryptographic engine is a collaborator behind [`RatchetEngine`]. The
//! core never interprets engine state; it only serializes, stores and hands
//! it back.
//!
//! # Invariants
//!
//! - Persist before emit: ciphertext reaches the output only after the
//!   advanced state is durably stored
//! - A failed post-encrypt save removes the peer's session, forcing a
//!   re-bootstrap instead of risking one-time key reuse
//! - A corrupt session is never treated as a missing one

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod engine;
pub mod env;
mod error;
pub mod identity;
pub mod marker_store;
pub mod orchestrator;
pub mod peer;
pub mod session_store;
pub mod storage;

pub use config::ClientConfig;
pub use engine::{EngineError, IdentityKey, RatchetEngine};
pub use env::Environment;
pub use error::{
    EXIT_CORRUPT, EXIT_FAILURE, EXIT_HANDSHAKE_INCOMPLETE, EXIT_OK, EXIT_PERSISTENCE,
    EXIT_TRANSPORT, IdentityError, ReceiveError, SendError, SessionStoreError,
};
pub use identity::IdentityStore;
pub use marker_store::MarkerStore;
pub use orchestrator::{Orchestrator, ReceiveOutcome, SendOutcome, SessionStatus};
pub use peer::{MAX_PEER_LEN, PeerError, PeerId};
pub use session_store::SessionStore;
pub use storage::{ChaoticStorage, FileStorage, MemoryStorage, Namespace, Storage, StorageError};
