//! Real two-party world mirroring [`ModelWorld`](crate::ModelWorld).
//!
//! Each party runs the real orchestrator over its own fault-injecting
//! in-memory storage. Both share one [`FakeEngine`] so session ids follow
//! global creation order, exactly as the model numbers them.

use std::collections::HashSet;

use sealpost_core::{
    ChaoticStorage, IdentityKey, MemoryStorage, Namespace, Orchestrator, PeerId, ReceiveError,
    SendError, SendOutcome, SessionStore,
};
use sealpost_proto::{Envelope, EnvelopeKind};

use crate::{
    fake_engine::{FakeCiphertext, FakeEngine, FakeState},
    model::{ModelWorld, Operation, OperationResult, PartyId},
    sim_env::SimEnv,
};

const NAMES: [&str; 2] = ["alice", "bob"];

type Store = ChaoticStorage<MemoryStorage>;

struct RealParty {
    storage: Store,
    sessions: SessionStore<Store>,
    identity: IdentityKey,
    inbox: String,
}

/// Two parties driven through the real orchestrator.
pub struct RealWorld {
    engine: FakeEngine,
    parties: [RealParty; 2],
    names: [PeerId; 2],
    emitted_keys: HashSet<(u64, u64)>,
    reused_keys: usize,
}

impl RealWorld {
    /// Fresh world; identities are drawn from `seed`.
    pub fn new(seed: u64) -> Self {
        let env = SimEnv::with_seed(seed);
        let party = || {
            let storage = ChaoticStorage::new(MemoryStorage::new());
            RealParty {
                sessions: SessionStore::new(storage.clone()),
                storage,
                identity: IdentityKey::generate(&env),
                inbox: String::new(),
            }
        };

        Self {
            engine: FakeEngine::new(),
            parties: [party(), party()],
            names: NAMES.map(|name| PeerId::new(name.as_bytes()).unwrap_or_else(|_| unreachable!())),
            emitted_keys: HashSet::new(),
            reused_keys: 0,
        }
    }

    /// Engine shared by both parties.
    pub fn engine(&self) -> &FakeEngine {
        &self.engine
    }

    /// Number of emitted messages whose one-time key had already been used
    /// by an earlier emitted message.
    pub fn reused_keys(&self) -> usize {
        self.reused_keys
    }

    /// Apply an operation to the real orchestrator.
    pub fn apply(&mut self, op: &Operation) -> OperationResult {
        match op.clone().normalized() {
            Operation::Send { from, content } => {
                let (me, other) = sides(from);
                let party = &self.parties[me];
                let orchestrator = Orchestrator::new(&self.engine, &party.sessions, &party.identity);

                let mut output = Vec::new();
                let result =
                    orchestrator.send(&self.names[other], &mut content.to_bytes().as_slice(), &mut output);
                self.transmit(other, &output);

                match result {
                    Ok(SendOutcome::Bootstrapped) => OperationResult::Bootstrapped,
                    Ok(SendOutcome::Sent { announced_handshake }) => {
                        OperationResult::Sent { announced: announced_handshake }
                    },
                    Err(SendError::HandshakeIncomplete { .. }) => OperationResult::HandshakeIncomplete,
                    Err(SendError::PersistenceFailure { .. }) => OperationResult::PersistenceFailure,
                    Err(_) => OperationResult::Failed,
                }
            },
            Operation::Deliver { to } => {
                let (me, other) = sides(to);
                let input = std::mem::take(&mut self.parties[me].inbox);
                let party = &self.parties[me];
                let orchestrator = Orchestrator::new(&self.engine, &party.sessions, &party.identity);

                let mut plaintext = Vec::new();
                let mut replies = Vec::new();
                let result = orchestrator.receive(
                    &self.names[other],
                    &mut input.as_bytes(),
                    &mut plaintext,
                    Some(&mut replies as &mut dyn std::io::Write),
                );
                self.transmit(other, &replies);

                match result {
                    Ok(outcome) => OperationResult::Received { messages: outcome.messages, plaintext },
                    Err(ReceiveError::PersistenceFailure { .. }) => OperationResult::PersistenceFailure,
                    Err(_) => OperationResult::Failed,
                }
            },
            Operation::Forget { party } => {
                let (me, other) = sides(party);
                let party = &self.parties[me];
                let orchestrator = Orchestrator::new(&self.engine, &party.sessions, &party.identity);
                match orchestrator.forget(&self.names[other]) {
                    Ok(existed) => OperationResult::Forgotten { existed },
                    Err(_) => OperationResult::Failed,
                }
            },
            Operation::FailNextSave { party } => {
                self.parties[usize::from(party)].storage.fail_next_writes(Namespace::Sessions, 1);
                OperationResult::Armed
            },
        }
    }

    /// Compare stored sessions and markers with the model.
    pub fn check(&self, model: &ModelWorld) -> Result<(), String> {
        for me in 0..2u8 {
            let (index, other) = sides(me);
            let peer = &self.names[other];
            let party = &self.parties[index];
            let expected = model.party(me);

            let stored = party
                .sessions
                .load::<FakeState>(peer)
                .map_err(|e| format!("{}: load failed: {e}", NAMES[index]))?;
            let marker = party
                .sessions
                .markers()
                .is_new(peer)
                .map_err(|e| format!("{}: marker check failed: {e}", NAMES[index]))?;

            if marker != expected.marker {
                return Err(format!(
                    "{}: marker is {marker}, model says {}",
                    NAMES[index], expected.marker
                ));
            }

            match (&stored, &expected.session) {
                (None, None) => {},
                (Some(real), Some(model)) => {
                    let same = real.session == model.id
                        && real.peer == model.peer
                        && real.sent == model.sent
                        && real.next_expected == model.next_expected;
                    if !same {
                        return Err(format!("{}: stored {real:?}, model {model:?}", NAMES[index]));
                    }
                },
                (real, model) => {
                    return Err(format!("{}: stored {real:?}, model {model:?}", NAMES[index]));
                },
            }
        }
        Ok(())
    }

    fn transmit(&mut self, to: usize, output: &[u8]) {
        let text = String::from_utf8_lossy(output);
        if let Ok(envelopes) = Envelope::decode_all(&text) {
            for envelope in envelopes {
                if envelope.kind != EnvelopeKind::EncryptedMessage {
                    continue;
                }
                if let Some(message) = FakeCiphertext::parse(&envelope.payload) {
                    if !self.emitted_keys.insert(message.key_id()) {
                        self.reused_keys += 1;
                    }
                }
            }
        }
        self.parties[to].inbox.push_str(&text);
    }
}

fn sides(party: PartyId) -> (usize, usize) {
    let me = usize::from(party % 2);
    (me, 1 - me)
}
