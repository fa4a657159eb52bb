//! Peer identifiers.

use std::{fmt, str::FromStr};

use thiserror::Error;

/// Longest accepted peer name in bytes.
///
/// The storage key is the hex encoding, so this keeps file names under the
/// common 255-byte limit.
pub const MAX_PEER_LEN: usize = 127;

/// Invalid peer identifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PeerError {
    /// Peer name is empty.
    #[error("peer name must not be empty")]
    Empty,

    /// Peer name is too long to map to a storage slot.
    #[error("peer name is {len} bytes, at most {max} allowed")]
    TooLong {
        /// Length of the rejected name.
        len: usize,
        /// Maximum accepted length.
        max: usize,
    },
}

/// Name of a conversation partner.
///
/// Opaque bytes supplied by the operator. Used only as a lookup key: every
/// storage location for the peer is derived from [`PeerId::storage_key`].
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct PeerId(Vec<u8>);

impl PeerId {
    /// Validate and wrap a peer name.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self, PeerError> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(PeerError::Empty);
        }
        if bytes.len() > MAX_PEER_LEN {
            return Err(PeerError::TooLong { len: bytes.len(), max: MAX_PEER_LEN });
        }
        Ok(Self(bytes))
    }

    /// Raw name bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Filesystem-safe key naming this peer's storage slots.
    ///
    /// Lowercase hex of the name: injective, so distinct peers never share a
    /// slot.
    pub fn storage_key(&self) -> String {
        hex::encode(&self.0)
    }
}

impl FromStr for PeerId {
    type Err = PeerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.as_bytes())
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({})", self.storage_key())
    }
}
