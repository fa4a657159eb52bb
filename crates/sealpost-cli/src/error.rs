//! CLI error type.

use sealpost_core::{
    EXIT_CORRUPT, EXIT_FAILURE, EXIT_TRANSPORT, IdentityError, PeerError, ReceiveError,
    SendError, SessionStoreError, StorageError,
};
use thiserror::Error;

/// Everything a subcommand can fail with.
#[derive(Debug, Error)]
pub enum CliError {
    /// Peer argument is empty or too long.
    #[error("invalid peer: {0}")]
    InvalidPeer(#[from] PeerError),

    /// Local identity could not be loaded or created.
    #[error("identity unavailable: {0}")]
    Identity(#[from] IdentityError),

    /// OS entropy source is unavailable.
    #[error("no entropy source: {0}")]
    Entropy(String),

    /// Send failed.
    #[error(transparent)]
    Send(#[from] SendError),

    /// Receive failed.
    #[error(transparent)]
    Receive(#[from] ReceiveError),

    /// Session could not be inspected.
    #[error(transparent)]
    Session(#[from] SessionStoreError),

    /// Storage backend failure outside send/receive.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Writing a report to stdout failed.
    #[error("failed to write output: {0}")]
    Output(#[from] std::io::Error),
}

impl CliError {
    /// Process exit status.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Send(e) => e.exit_code(),
            Self::Receive(e) => e.exit_code(),
            Self::Identity(IdentityError::Corrupt { .. })
            | Self::Session(SessionStoreError::Corrupt { .. }) => EXIT_CORRUPT,
            Self::Output(_) => EXIT_TRANSPORT,
            Self::InvalidPeer(_)
            | Self::Identity(_)
            | Self::Entropy(_)
            | Self::Session(_)
            | Self::Storage(_) => EXIT_FAILURE,
        }
    }
}
