//! Envelope content kinds.

use std::fmt;

/// Kind of content carried by an [`Envelope`](crate::Envelope).
///
/// The discriminant is part of the encoded body and must never be reordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EnvelopeKind {
    /// Persisted ratchet state. Store-only.
    Ratchet = 1,
    /// Handshake material for a peer to complete the key exchange.
    KeyExchange = 2,
    /// Ciphertext produced by the ratchet engine.
    EncryptedMessage = 3,
    /// Local long-term identity secret. Store-only.
    IdentityKey = 4,
}

impl EnvelopeKind {
    /// All kinds, in discriminant order.
    pub const ALL: [Self; 4] =
        [Self::Ratchet, Self::KeyExchange, Self::EncryptedMessage, Self::IdentityKey];

    /// Armor label that follows the `SEALPOST` prefix.
    pub fn label(self) -> &'static str {
        match self {
            Self::Ratchet => "RATCHET",
            Self::KeyExchange => "KEY EXCHANGE",
            Self::EncryptedMessage => "ENCRYPTED MESSAGE",
            Self::IdentityKey => "IDENTITY KEY",
        }
    }

    /// Parse an armor label (without prefix).
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.label() == label)
    }

    /// Parse the on-wire discriminant.
    pub fn from_u8(value: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.to_u8() == value)
    }

    /// On-wire discriminant.
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Whether this kind may travel over the transport channel.
    ///
    /// Store-only kinds are rejected by receivers so that a leaked session
    /// file pasted into `receive` is refused rather than interpreted.
    pub fn is_transport(self) -> bool {
        matches!(self, Self::KeyExchange | Self::EncryptedMessage)
    }
}

impl fmt::Display for EnvelopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
