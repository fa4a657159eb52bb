//! Model world.

use super::operation::{Operation, OperationResult, PartyId, SmallMessage};

/// Envelope in flight, as the model sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelEnvelope {
    /// Handshake material of a session.
    KeyExchange {
        /// Announcing session.
        session: u64,
    },
    /// Encrypted message.
    Message {
        /// Sending session.
        sender: u64,
        /// Session the sender had paired with.
        recipient: u64,
        /// Position in the sender's chain.
        counter: u64,
        /// Carried plaintext.
        plaintext: Vec<u8>,
    },
}

/// A stored session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSession {
    /// Session id, numbered from 1 in creation order.
    pub id: u64,
    /// Absorbed peer session.
    pub peer: Option<u64>,
    /// Messages sent.
    pub sent: u64,
    /// Lowest accepted incoming counter.
    pub next_expected: u64,
}

impl ModelSession {
    fn new(id: u64) -> Self {
        Self { id, peer: None, sent: 0, next_expected: 0 }
    }
}

/// One side of the conversation.
#[derive(Debug, Clone, Default)]
pub struct ModelParty {
    /// Session with the other party.
    pub session: Option<ModelSession>,
    /// Bootstrap marker.
    pub marker: bool,
    /// Envelopes waiting to be received.
    pub inbox: Vec<ModelEnvelope>,
    failing_saves: u32,
}

impl ModelParty {
    /// Consume one armed save failure.
    fn save_fails(&mut self) -> bool {
        if self.failing_saves > 0 {
            self.failing_saves -= 1;
            true
        } else {
            false
        }
    }
}

/// Two-party reference world.
#[derive(Debug, Clone, Default)]
pub struct ModelWorld {
    parties: [ModelParty; 2],
    last_session: u64,
}

impl ModelWorld {
    /// Empty world: no sessions, no markers, empty inboxes.
    pub fn new() -> Self {
        Self::default()
    }

    /// State of `party`.
    pub fn party(&self, party: PartyId) -> &ModelParty {
        &self.parties[usize::from(party % 2)]
    }

    /// Apply an operation and return the expected observable result.
    pub fn apply(&mut self, op: &Operation) -> OperationResult {
        match op.clone().normalized() {
            Operation::Send { from, content } => self.send(from, &content),
            Operation::Deliver { to } => self.deliver(to),
            Operation::Forget { party } => {
                let party = &mut self.parties[usize::from(party)];
                let existed = party.session.take().is_some();
                party.marker = false;
                OperationResult::Forgotten { existed }
            },
            Operation::FailNextSave { party } => {
                self.parties[usize::from(party)].failing_saves += 1;
                OperationResult::Armed
            },
        }
    }

    fn next_session(&mut self) -> u64 {
        self.last_session += 1;
        self.last_session
    }

    fn send(&mut self, from: PartyId, content: &SmallMessage) -> OperationResult {
        let me = usize::from(from);
        let other = 1 - me;

        let Some(mut session) = self.parties[me].session.clone() else {
            let id = self.next_session();
            let party = &mut self.parties[me];
            party.marker = true;
            if party.save_fails() {
                return OperationResult::PersistenceFailure;
            }
            party.session = Some(ModelSession::new(id));
            self.parties[other].inbox.push(ModelEnvelope::KeyExchange { session: id });
            return OperationResult::Bootstrapped;
        };

        let Some(recipient) = session.peer else {
            self.parties[other].inbox.push(ModelEnvelope::KeyExchange { session: session.id });
            return OperationResult::HandshakeIncomplete;
        };

        let party = &mut self.parties[me];
        if party.save_fails() {
            party.session = None;
            return OperationResult::PersistenceFailure;
        }

        let counter = session.sent;
        session.sent += 1;
        let announced = party.marker;
        party.marker = false;
        party.session = Some(session.clone());

        let inbox = &mut self.parties[other].inbox;
        if announced {
            inbox.push(ModelEnvelope::KeyExchange { session: session.id });
        }
        inbox.push(ModelEnvelope::Message {
            sender: session.id,
            recipient,
            counter,
            plaintext: content.to_bytes(),
        });
        OperationResult::Sent { announced }
    }

    fn deliver(&mut self, to: PartyId) -> OperationResult {
        let me = usize::from(to);
        let other = 1 - me;

        let envelopes = std::mem::take(&mut self.parties[me].inbox);
        if envelopes.is_empty() {
            return OperationResult::Failed;
        }

        let mut messages = 0;
        let mut plaintext = Vec::new();
        for envelope in envelopes {
            match envelope {
                ModelEnvelope::KeyExchange { session: theirs } => {
                    if self.parties[me].session.is_none() {
                        // Paired in memory first; one write stores it
                        let id = self.next_session();
                        let party = &mut self.parties[me];
                        party.marker = true;
                        if party.save_fails() {
                            return OperationResult::PersistenceFailure;
                        }
                        party.session =
                            Some(ModelSession { peer: Some(theirs), ..ModelSession::new(id) });
                        self.parties[other].inbox.push(ModelEnvelope::KeyExchange { session: id });
                        continue;
                    }

                    let party = &mut self.parties[me];
                    let Some(session) = party.session.as_mut() else {
                        return OperationResult::Failed;
                    };
                    match session.peer {
                        Some(known) if known == theirs => {},
                        Some(_) => return OperationResult::Failed,
                        None => session.peer = Some(theirs),
                    }
                    if party.save_fails() {
                        party.session = None;
                        return OperationResult::PersistenceFailure;
                    }
                },
                ModelEnvelope::Message { sender, recipient, counter, plaintext: content } => {
                    let party = &mut self.parties[me];
                    let Some(session) = party.session.as_mut() else {
                        return OperationResult::Failed;
                    };
                    if session.peer != Some(sender)
                        || recipient != session.id
                        || counter < session.next_expected
                    {
                        return OperationResult::Failed;
                    }
                    session.next_expected = counter + 1;

                    if party.save_fails() {
                        party.session = None;
                        return OperationResult::PersistenceFailure;
                    }
                    party.marker = false;
                    plaintext.extend_from_slice(&content);
                    messages += 1;
                },
            }
        }

        OperationResult::Received { messages, plaintext }
    }
}
