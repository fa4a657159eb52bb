//! Lifecycle properties of the orchestrator, checked against the fake engine
//! and fault-injecting storage.

#![allow(clippy::unwrap_used)]

use std::{collections::HashSet, io};

use sealpost_core::{
    ChaoticStorage, EXIT_CORRUPT, EXIT_HANDSHAKE_INCOMPLETE, EXIT_PERSISTENCE, EXIT_TRANSPORT,
    EngineError, IdentityKey, MemoryStorage, Namespace, Orchestrator, PeerId, ReceiveError,
    ReceiveOutcome, SendError, SendOutcome, SessionStatus, SessionStore, Storage,
};
use sealpost_harness::{FakeCiphertext, FakeEngine, FakeState, SimEnv};
use sealpost_proto::{Envelope, EnvelopeKind};

type Store = ChaoticStorage<MemoryStorage>;

struct Party {
    storage: Store,
    sessions: SessionStore<Store>,
    identity: IdentityKey,
}

impl Party {
    fn new(seed: u64) -> Self {
        let storage = ChaoticStorage::new(MemoryStorage::new());
        Self {
            sessions: SessionStore::new(storage.clone()),
            storage,
            identity: IdentityKey::generate(&SimEnv::with_seed(seed)),
        }
    }

    fn orchestrator<'a>(&'a self, engine: &'a FakeEngine) -> Orchestrator<'a, FakeEngine, Store> {
        Orchestrator::new(engine, &self.sessions, &self.identity)
    }

    fn send(
        &self,
        engine: &FakeEngine,
        peer: &PeerId,
        message: &[u8],
    ) -> (Result<SendOutcome, SendError>, String) {
        let mut output = Vec::new();
        let result = self.orchestrator(engine).send(peer, &mut &message[..], &mut output);
        (result, String::from_utf8(output).unwrap())
    }

    /// Replies and plaintext share one output.
    fn receive(
        &self,
        engine: &FakeEngine,
        peer: &PeerId,
        input: &str,
    ) -> (Result<ReceiveOutcome, ReceiveError>, String) {
        let mut output = Vec::new();
        let result = self.orchestrator(engine).receive(peer, &mut input.as_bytes(), &mut output, None);
        (result, String::from_utf8(output).unwrap())
    }

    fn state(&self, peer: &PeerId) -> Option<FakeState> {
        self.sessions.load(peer).unwrap()
    }

    fn is_new(&self, peer: &PeerId) -> bool {
        self.sessions.markers().is_new(peer).unwrap()
    }

    fn count(&self, namespace: Namespace) -> usize {
        self.storage.inner().count(namespace)
    }
}

fn alice() -> PeerId {
    "alice".parse().unwrap()
}

fn bob() -> PeerId {
    "bob".parse().unwrap()
}

fn kinds(text: &str) -> Vec<EnvelopeKind> {
    Envelope::decode_all(text).unwrap().into_iter().map(|e| e.kind).collect()
}

fn messages(text: &str) -> Vec<FakeCiphertext> {
    Envelope::decode_all(text)
        .unwrap()
        .into_iter()
        .filter(|e| e.kind == EnvelopeKind::EncryptedMessage)
        .map(|e| FakeCiphertext::parse(&e.payload).unwrap())
        .collect()
}

/// Alice (session 1) and Bob (session 2) with a completed handshake. Both
/// markers are still set.
fn paired() -> (FakeEngine, Party, Party) {
    let engine = FakeEngine::new();
    let a = Party::new(1);
    let b = Party::new(2);

    let (result, hello) = a.send(&engine, &bob(), b"");
    assert_eq!(result.unwrap(), SendOutcome::Bootstrapped);
    let (result, reply) = b.receive(&engine, &alice(), &hello);
    assert!(result.unwrap().replied);
    a.receive(&engine, &bob(), &reply).0.unwrap();

    (engine, a, b)
}

/// Writer that accepts nothing.
struct BrokenPipe;

impl io::Write for BrokenPipe {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn first_contact_creates_session_and_marker_only() {
    let engine = FakeEngine::new();
    let a = Party::new(1);
    let mut input: &[u8] = b"held back";

    let mut output = Vec::new();
    let outcome = a.orchestrator(&engine).send(&bob(), &mut input, &mut output).unwrap();

    assert_eq!(outcome, SendOutcome::Bootstrapped);
    assert_eq!(a.count(Namespace::Sessions), 1);
    assert_eq!(a.count(Namespace::Markers), 1);
    assert_eq!(kinds(&String::from_utf8(output).unwrap()), vec![EnvelopeKind::KeyExchange]);
    assert_eq!(input, b"held back", "input is not consumed on bootstrap");
    assert_eq!(engine.calls().encrypts, 0);
}

#[test]
fn repeated_first_contact_reannounces_unchanged_session() {
    let engine = FakeEngine::new();
    let a = Party::new(1);
    let (_, first) = a.send(&engine, &bob(), b"");
    let before = a.state(&bob()).unwrap();

    let (result, second) = a.send(&engine, &bob(), b"too early");

    let err = result.unwrap_err();
    assert!(matches!(err, SendError::HandshakeIncomplete { .. }));
    assert_eq!(err.exit_code(), EXIT_HANDSHAKE_INCOMPLETE);
    assert_eq!(second, first);
    assert_eq!(a.state(&bob()).unwrap(), before);
    assert_eq!(engine.calls().creates, 1);
}

#[test]
fn sends_advance_counter_and_never_reuse_keys() {
    let (engine, a, _b) = paired();
    let mut seen = HashSet::new();

    for n in 1..=5u64 {
        let (result, output) = a.send(&engine, &bob(), format!("message {n}").as_bytes());
        result.unwrap();

        assert_eq!(a.state(&bob()).unwrap().sent, n);
        for message in messages(&output) {
            assert!(seen.insert(message.key_id()), "key {:?} reused", message.key_id());
        }
    }
    assert_eq!(seen.len(), 5);
}

#[test]
fn first_message_announces_then_marker_clears() {
    let (engine, a, b) = paired();
    assert!(a.is_new(&bob()));

    let (result, first) = a.send(&engine, &bob(), b"one");
    assert_eq!(result.unwrap(), SendOutcome::Sent { announced_handshake: true });
    assert_eq!(kinds(&first), vec![EnvelopeKind::KeyExchange, EnvelopeKind::EncryptedMessage]);
    assert!(!a.is_new(&bob()));

    let (result, second) = a.send(&engine, &bob(), b"two");
    assert_eq!(result.unwrap(), SendOutcome::Sent { announced_handshake: false });
    assert_eq!(kinds(&second), vec![EnvelopeKind::EncryptedMessage]);

    // Receiving a message proves the peer has our material
    assert!(b.is_new(&alice()));
    let (result, plaintext) = b.receive(&engine, &alice(), &first);
    assert_eq!(result.unwrap().messages, 1);
    assert_eq!(plaintext, "one");
    assert!(!b.is_new(&alice()));
}

#[test]
fn failed_save_withholds_ciphertext_and_discards_session() {
    let (engine, a, _b) = paired();
    a.storage.fail_next_writes(Namespace::Sessions, 1);

    let (result, output) = a.send(&engine, &bob(), b"secret");

    let err = result.unwrap_err();
    assert!(matches!(err, SendError::PersistenceFailure { removed: true, .. }));
    assert_eq!(err.exit_code(), EXIT_PERSISTENCE);
    assert!(!output.contains("ENCRYPTED MESSAGE"));
    assert!(!output.contains("secret"));
    assert!(a.state(&bob()).is_none());

    // Next send starts over
    let (result, _) = a.send(&engine, &bob(), b"secret");
    assert_eq!(result.unwrap(), SendOutcome::Bootstrapped);
}

#[test]
fn failed_bootstrap_save_leaves_no_session() {
    let engine = FakeEngine::new();
    let a = Party::new(1);
    a.storage.fail_next_writes(Namespace::Sessions, 1);

    let (result, output) = a.send(&engine, &bob(), b"");

    assert!(matches!(result, Err(SendError::PersistenceFailure { .. })));
    assert!(output.is_empty());
    assert!(a.state(&bob()).is_none());
}

#[test]
fn failed_remove_is_reported() {
    let (engine, a, _b) = paired();
    a.storage.fail_next_writes(Namespace::Sessions, 1);
    a.storage.fail_next_removes(Namespace::Sessions, 1);

    let (result, _) = a.send(&engine, &bob(), b"secret");

    assert!(matches!(result, Err(SendError::PersistenceFailure { removed: false, .. })));
}

#[test]
fn torn_save_withholds_ciphertext_and_discards_half_written_session() {
    let (engine, a, _b) = paired();
    a.storage.tear_next_writes(Namespace::Sessions, 1);

    let (result, output) = a.send(&engine, &bob(), b"secret");

    assert!(matches!(result, Err(SendError::PersistenceFailure { removed: true, .. })));
    assert!(!output.contains("ENCRYPTED MESSAGE"));
    assert_eq!(a.count(Namespace::Sessions), 0, "half-written session must not survive");
    assert_eq!(a.storage.injected(), 1);
}

#[test]
fn handshake_incomplete_is_reported_even_if_reannouncement_fails() {
    let engine = FakeEngine::new();
    let a = Party::new(1);
    a.send(&engine, &bob(), b"").0.unwrap();

    let result = a.orchestrator(&engine).send(&bob(), &mut &b"too early"[..], &mut BrokenPipe);

    let err = result.unwrap_err();
    assert!(matches!(err, SendError::HandshakeIncomplete { .. }));
    assert_eq!(err.exit_code(), EXIT_HANDSHAKE_INCOMPLETE);
    assert!(a.state(&bob()).is_some());
}

#[test]
fn failed_reply_write_lets_retry_reply() {
    let engine = FakeEngine::new();
    let a = Party::new(1);
    let b = Party::new(2);
    let (_, hello) = a.send(&engine, &bob(), b"");

    let mut output = Vec::new();
    let result = b.orchestrator(&engine).receive(
        &alice(),
        &mut hello.as_bytes(),
        &mut output,
        Some(&mut BrokenPipe as &mut dyn io::Write),
    );
    assert!(matches!(result, Err(ReceiveError::Transport(_))));
    assert!(b.state(&alice()).is_none(), "session without a delivered reply is dropped");

    let (result, reply) = b.receive(&engine, &alice(), &hello);

    assert!(result.unwrap().replied);
    assert_eq!(kinds(&reply), vec![EnvelopeKind::KeyExchange]);
    a.receive(&engine, &bob(), &reply).0.unwrap();
    let (result, _) = a.send(&engine, &bob(), b"now paired");
    assert!(matches!(result, Ok(SendOutcome::Sent { .. })));
}

#[test]
fn rejected_first_handshake_stores_nothing() {
    let engine = FakeEngine::new();
    let a = Party::new(1);
    let b = Party::new(2);
    let garbage = Envelope::new(EnvelopeKind::KeyExchange, vec![1, 2, 3]).encode().unwrap();

    let (result, output) = b.receive(&engine, &alice(), &garbage);

    assert!(matches!(result, Err(ReceiveError::Engine(EngineError::InvalidHandshake { .. }))));
    assert!(output.is_empty());
    assert_eq!(b.count(Namespace::Sessions), 0);
    assert_eq!(b.count(Namespace::Markers), 0);

    let (_, hello) = a.send(&engine, &bob(), b"");
    let (result, reply) = b.receive(&engine, &alice(), &hello);
    assert!(result.unwrap().replied);
    assert_eq!(kinds(&reply), vec![EnvelopeKind::KeyExchange]);
}

#[test]
fn corrupt_session_is_not_treated_as_missing() {
    let engine = FakeEngine::new();
    let a = Party::new(1);
    let key = bob().storage_key();
    a.storage.inner().put_raw(Namespace::Sessions, &key, b"garbage".to_vec());

    let (result, output) = a.send(&engine, &bob(), b"message");

    let err = result.unwrap_err();
    assert!(matches!(err, SendError::Corrupt { .. }));
    assert_eq!(err.exit_code(), EXIT_CORRUPT);
    assert!(output.is_empty());
    assert_eq!(engine.calls().creates, 0);
    assert_eq!(a.storage.read(Namespace::Sessions, &key).unwrap().unwrap(), b"garbage");

    let material = Envelope::new(EnvelopeKind::KeyExchange, 9u64.to_be_bytes()).encode().unwrap();
    let (result, _) = a.receive(&engine, &bob(), &material);
    assert!(matches!(result, Err(ReceiveError::Corrupt { .. })));
    assert!(a.orchestrator(&engine).status(&bob()).is_err());
}

#[test]
fn transport_failure_after_save_keeps_advanced_state() {
    let (engine, a, _b) = paired();

    let result = a.orchestrator(&engine).send(&bob(), &mut &b"lost"[..], &mut BrokenPipe);

    let err = result.unwrap_err();
    assert_eq!(err.exit_code(), EXIT_TRANSPORT);
    assert!(err.is_retriable());
    assert_eq!(a.state(&bob()).unwrap().sent, 1, "key is burned even though nothing was written");
}

#[test]
fn engine_failure_propagates_without_state_change() {
    let (engine, a, _b) = paired();
    let before = a.state(&bob()).unwrap();
    engine.fail_next(EngineError::Encrypt { reason: "boom".into() });

    let (result, output) = a.send(&engine, &bob(), b"x");

    assert!(matches!(result, Err(SendError::Engine(EngineError::Encrypt { .. }))));
    assert!(output.is_empty());
    assert_eq!(a.state(&bob()).unwrap(), before);
}

#[test]
fn marker_check_failure_announces_handshake() {
    let (engine, a, _b) = paired();
    a.send(&engine, &bob(), b"clears marker").0.unwrap();
    a.storage.fail_next_contains(Namespace::Markers, 1);

    let (result, output) = a.send(&engine, &bob(), b"after failure");

    assert_eq!(result.unwrap(), SendOutcome::Sent { announced_handshake: true });
    assert_eq!(kinds(&output), vec![EnvelopeKind::KeyExchange, EnvelopeKind::EncryptedMessage]);
}

#[test]
fn marker_clear_failure_does_not_fail_send() {
    let (engine, a, _b) = paired();
    a.storage.fail_next_removes(Namespace::Markers, 1);

    let (result, _) = a.send(&engine, &bob(), b"x");

    assert_eq!(result.unwrap(), SendOutcome::Sent { announced_handshake: true });
    assert!(a.is_new(&bob()), "stale marker only causes another announcement");
}

#[test]
fn message_without_session_is_rejected() {
    let (engine, a, _b) = paired();
    a.send(&engine, &bob(), b"first").0.unwrap();
    let (_, second) = a.send(&engine, &bob(), b"second");
    let carol = Party::new(3);

    let (result, output) = carol.receive(&engine, &alice(), &second);

    assert!(matches!(result, Err(ReceiveError::NoSession { .. })));
    assert!(output.is_empty());
    assert_eq!(carol.count(Namespace::Sessions), 0);
}

#[test]
fn ratchet_envelope_is_not_accepted_from_peer() {
    let engine = FakeEngine::new();
    let a = Party::new(1);
    let input = Envelope::new(EnvelopeKind::Ratchet, vec![1, 2, 3]).encode().unwrap();

    let (result, _) = a.receive(&engine, &bob(), &input);

    assert!(matches!(
        result,
        Err(ReceiveError::UnexpectedEnvelope { kind: EnvelopeKind::Ratchet })
    ));
    assert_eq!(a.count(Namespace::Sessions), 0);
}

#[test]
fn empty_input_has_no_envelope() {
    let engine = FakeEngine::new();
    let a = Party::new(1);

    let (result, _) = a.receive(&engine, &bob(), "");

    assert!(matches!(result, Err(ReceiveError::NoEnvelope)));
}

#[test]
fn replayed_message_leaves_state_unchanged() {
    let (engine, a, b) = paired();
    let (_, sent) = a.send(&engine, &bob(), b"once");
    b.receive(&engine, &alice(), &sent).0.unwrap();
    let before = b.state(&alice()).unwrap();

    let (result, output) = b.receive(&engine, &alice(), &sent);

    assert!(matches!(result, Err(ReceiveError::Engine(_))));
    assert!(output.is_empty());
    assert_eq!(b.state(&alice()).unwrap(), before);
}

#[test]
fn failed_receive_save_withholds_plaintext() {
    let (engine, a, b) = paired();
    let (_, first) = a.send(&engine, &bob(), b"first");
    b.receive(&engine, &alice(), &first).0.unwrap();
    let (_, sent) = a.send(&engine, &bob(), b"withheld");
    b.storage.fail_next_writes(Namespace::Sessions, 1);

    let (result, output) = b.receive(&engine, &alice(), &sent);

    assert!(matches!(result, Err(ReceiveError::PersistenceFailure { .. })));
    assert!(!output.contains("withheld"));
    assert!(b.state(&alice()).is_none());
}

#[test]
fn reply_goes_to_separate_sink() {
    let engine = FakeEngine::new();
    let a = Party::new(1);
    let b = Party::new(2);
    let (_, hello) = a.send(&engine, &bob(), b"");

    let mut output = Vec::new();
    let mut replies = Vec::new();
    let outcome = b
        .orchestrator(&engine)
        .receive(&alice(), &mut hello.as_bytes(), &mut output, Some(&mut replies as &mut dyn io::Write))
        .unwrap();

    assert_eq!(outcome, ReceiveOutcome { handshakes: 1, messages: 0, replied: true });
    assert!(output.is_empty());
    assert_eq!(kinds(&String::from_utf8(replies).unwrap()), vec![EnvelopeKind::KeyExchange]);
}

#[test]
fn forget_removes_session_and_marker() {
    let (engine, a, _b) = paired();
    let orchestrator = a.orchestrator(&engine);

    assert!(orchestrator.forget(&bob()).unwrap());
    assert_eq!(a.count(Namespace::Sessions), 0);
    assert_eq!(a.count(Namespace::Markers), 0);
    assert!(!orchestrator.forget(&bob()).unwrap());
}

#[test]
fn status_follows_lifecycle() {
    let (engine, a, _b) = paired();
    let orchestrator = a.orchestrator(&engine);

    assert_eq!(orchestrator.status(&alice()).unwrap(), SessionStatus::NoSession);
    assert_eq!(orchestrator.status(&bob()).unwrap(), SessionStatus::Bootstrapping);

    a.send(&engine, &bob(), b"x").0.unwrap();
    assert_eq!(orchestrator.status(&bob()).unwrap(), SessionStatus::Established);
}

#[test]
fn sessions_are_per_peer() {
    let engine = FakeEngine::new();
    let a = Party::new(1);
    let carol: PeerId = "carol".parse().unwrap();

    a.send(&engine, &bob(), b"").0.unwrap();
    a.send(&engine, &carol, b"").0.unwrap();

    assert_eq!(a.state(&bob()).unwrap().session, 1);
    assert_eq!(a.state(&carol).unwrap().session, 2);
    assert_eq!(a.count(Namespace::Markers), 2);
}
