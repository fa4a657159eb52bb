//! Operations for model-based testing.

use arbitrary::Arbitrary;

/// Party identifier: 0 is alice, 1 is bob. Larger values wrap.
pub type PartyId = u8;

/// Operations that can be applied to both worlds.
#[derive(Debug, Clone, Arbitrary)]
pub enum Operation {
    /// Party sends a message to the other party.
    Send {
        /// Sending party.
        from: PartyId,
        /// Message content.
        content: SmallMessage,
    },

    /// Party receives everything waiting in its inbox in one invocation.
    Deliver {
        /// Receiving party.
        to: PartyId,
    },

    /// Party forgets its session with the other party.
    Forget {
        /// Forgetting party.
        party: PartyId,
    },

    /// The next session write by this party fails.
    FailNextSave {
        /// Affected party.
        party: PartyId,
    },
}

impl Operation {
    /// The same operation with party ids folded into range.
    pub fn normalized(self) -> Self {
        match self {
            Self::Send { from, content } => Self::Send { from: from % 2, content },
            Self::Deliver { to } => Self::Deliver { to: to % 2 },
            Self::Forget { party } => Self::Forget { party: party % 2 },
            Self::FailNextSave { party } => Self::FailNextSave { party: party % 2 },
        }
    }
}

/// Small message content for testing.
///
/// The content is deterministic from the seed.
#[derive(Debug, Clone, Arbitrary)]
pub struct SmallMessage {
    /// Message seed.
    pub seed: u8,
    /// Message length hint (0-3 maps to empty/small/medium/large).
    pub size_class: u8,
}

impl SmallMessage {
    /// Expand to actual message bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let len: u8 = match self.size_class % 4 {
            0 => 0,
            1 => 8,
            2 => 64,
            _ => 255,
        };

        (0..len).map(|i| self.seed.wrapping_add(i)).collect()
    }
}

/// Observable result of an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationResult {
    /// Send created a session and announced it.
    Bootstrapped,
    /// Send emitted a message.
    Sent {
        /// Whether handshake material preceded it.
        announced: bool,
    },
    /// Send found the handshake incomplete.
    HandshakeIncomplete,
    /// A session write failed and the session was discarded.
    PersistenceFailure,
    /// Receive succeeded.
    Received {
        /// Messages delivered.
        messages: usize,
        /// Concatenated plaintext.
        plaintext: Vec<u8>,
    },
    /// Forget ran.
    Forgotten {
        /// Whether a session existed.
        existed: bool,
    },
    /// Fault armed.
    Armed,
    /// Any other failure.
    Failed,
}
