//! Error taxonomy.
//!
//! Each orchestrator operation returns a closed error type. The send error
//! distinguishes exactly the conditions an operator must react to
//! differently: corrupt state, an incomplete handshake, a persistence
//! failure that discarded the session, and a transport failure.

use sealpost_proto::{DecodeError, EncodeError, EnvelopeKind};
use thiserror::Error;

use crate::{engine::EngineError, peer::PeerId, storage::StorageError};

/// Exit status for success.
pub const EXIT_OK: u8 = 0;
/// Exit status for failures without a dedicated code.
pub const EXIT_FAILURE: u8 = 1;
/// Exit status when the peer has not completed the handshake.
pub const EXIT_HANDSHAKE_INCOMPLETE: u8 = 2;
/// Exit status for unreadable or undecodable session state.
pub const EXIT_CORRUPT: u8 = 3;
/// Exit status after a persistence failure discarded the session.
pub const EXIT_PERSISTENCE: u8 = 4;
/// Exit status when writing to the transport failed.
pub const EXIT_TRANSPORT: u8 = 5;

/// Session store failures.
#[derive(Debug, Error)]
pub enum SessionStoreError {
    /// Stored session exists but cannot be read or decoded.
    #[error("session for {peer} is corrupt: {reason}")]
    Corrupt {
        /// Peer whose session is corrupt.
        peer: PeerId,
        /// What failed.
        reason: String,
    },

    /// Engine state could not be serialized.
    #[error("failed to encode session state: {reason}")]
    Encode {
        /// Serializer failure.
        reason: String,
    },

    /// Engine failed to create fresh state.
    #[error("engine failed to create session: {0}")]
    Engine(#[from] EngineError),

    /// Storage backend failure.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Identity store failures.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// Identity file exists but is not a valid identity key.
    #[error("identity key is corrupt: {reason}")]
    Corrupt {
        /// What failed.
        reason: String,
    },

    /// Identity key could not be encoded.
    #[error("failed to encode identity key: {0}")]
    Encode(#[from] EncodeError),

    /// Storage backend failure.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Failures of a send invocation.
///
/// A missing session is not an error: it produces
/// [`SendOutcome::Bootstrapped`](crate::SendOutcome::Bootstrapped).
#[derive(Debug, Error)]
pub enum SendError {
    /// Session exists but cannot be read or decoded. Nothing was written to
    /// the output and no state changed.
    #[error("session for {peer} is unusable, refusing to continue: {source}")]
    Corrupt {
        /// Peer whose session is corrupt.
        peer: PeerId,
        /// Underlying failure.
        #[source]
        source: SessionStoreError,
    },

    /// Peer has not sent their handshake material yet. Our own material was
    /// re-emitted; nothing was persisted.
    #[error("handshake with {peer} is not complete")]
    HandshakeIncomplete {
        /// Peer with the pending handshake.
        peer: PeerId,
    },

    /// Advanced state could not be stored, so the ciphertext was withheld
    /// and the session was discarded.
    #[error("failed to persist session for {peer} (session removed: {removed}): {source}")]
    PersistenceFailure {
        /// Peer whose session was discarded.
        peer: PeerId,
        /// Whether the on-disk session was successfully removed.
        removed: bool,
        /// Underlying failure.
        #[source]
        source: SessionStoreError,
    },

    /// Writing an envelope to the output failed.
    #[error("failed to emit envelope: {0}")]
    Transport(#[source] EncodeError),

    /// Reading the plaintext failed.
    #[error("failed to read message: {0}")]
    Input(#[source] std::io::Error),

    /// Engine failure other than an incomplete handshake.
    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl SendError {
    /// Process exit status for this failure.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::HandshakeIncomplete { .. } => EXIT_HANDSHAKE_INCOMPLETE,
            Self::Corrupt { .. } => EXIT_CORRUPT,
            Self::PersistenceFailure { .. } => EXIT_PERSISTENCE,
            Self::Transport(_) => EXIT_TRANSPORT,
            Self::Input(_) | Self::Engine(_) => EXIT_FAILURE,
        }
    }

    /// Whether repeating the same invocation later can succeed without
    /// operator intervention on the session.
    pub fn is_retriable(&self) -> bool {
        match self {
            // Transient: the stored session is still valid
            Self::HandshakeIncomplete { .. } | Self::Transport(_) | Self::Input(_) => true,

            // Needs intervention: corrupt or discarded state
            Self::Corrupt { .. } | Self::PersistenceFailure { .. } | Self::Engine(_) => false,
        }
    }
}

/// Failures of a receive invocation.
#[derive(Debug, Error)]
pub enum ReceiveError {
    /// Input contained no envelope.
    #[error("no envelope found in input")]
    NoEnvelope,

    /// Input was not a well-formed envelope stream.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// A store-only envelope arrived over the transport.
    #[error("{kind} envelopes are not accepted from peers")]
    UnexpectedEnvelope {
        /// Kind that was received.
        kind: EnvelopeKind,
    },

    /// A message arrived for a peer we have no session with.
    #[error("no session with {peer}, exchange key material first")]
    NoSession {
        /// Sending peer.
        peer: PeerId,
    },

    /// Session exists but cannot be read or decoded.
    #[error("session for {peer} is unusable, refusing to continue: {source}")]
    Corrupt {
        /// Peer whose session is corrupt.
        peer: PeerId,
        /// Underlying failure.
        #[source]
        source: SessionStoreError,
    },

    /// Advanced state could not be stored; plaintext was withheld and the
    /// session was discarded.
    #[error("failed to persist session for {peer} (session removed: {removed}): {source}")]
    PersistenceFailure {
        /// Peer whose session was discarded.
        peer: PeerId,
        /// Whether the on-disk session was successfully removed.
        removed: bool,
        /// Underlying failure.
        #[source]
        source: SessionStoreError,
    },

    /// Engine rejected the handshake material or ciphertext.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Writing plaintext or a reply envelope failed.
    #[error("failed to write output: {0}")]
    Transport(#[source] EncodeError),

    /// Reading the input failed.
    #[error("failed to read input: {0}")]
    Input(#[source] std::io::Error),
}

impl ReceiveError {
    /// Process exit status for this failure.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Corrupt { .. } => EXIT_CORRUPT,
            Self::PersistenceFailure { .. } => EXIT_PERSISTENCE,
            Self::Transport(_) => EXIT_TRANSPORT,
            Self::NoEnvelope
            | Self::Decode(_)
            | Self::UnexpectedEnvelope { .. }
            | Self::NoSession { .. }
            | Self::Engine(_)
            | Self::Input(_) => EXIT_FAILURE,
        }
    }
}
