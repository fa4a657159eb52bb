//! Send and receive orchestration.
//!
//! One invocation handles one peer end to end, synchronously: at most one
//! load, one engine call and one save per processed envelope, followed by
//! output. There is no cancellation point between computing an advanced
//! state and deciding its fate: it is either persisted and its output
//! emitted, or the session is discarded and nothing is emitted.
//!
//! # Send state machine
//!
//! ```text
//! NoSession ──create──► Bootstrapping ──emit KEY EXCHANGE──► done
//!     │
//!   load ok
//!     ▼
//!   Ready ──encrypt──► HandshakeIncomplete ──re-emit KEY EXCHANGE──► error
//!     │
//!     └─ save ─► [marker? emit KEY EXCHANGE] ─► emit ENCRYPTED MESSAGE ─► Sent
//!          │
//!          └─ save failed ─► remove session ─► PersistenceFailure
//! ```
//!
//! Concurrent invocations for the same peer are not coordinated here;
//! callers that need them must serialize per peer.

use std::io::{Read, Write};

use sealpost_proto::{EncodeError, Envelope, EnvelopeKind};

use crate::{
    engine::{EngineError, IdentityKey, RatchetEngine},
    error::{ReceiveError, SendError, SessionStoreError},
    peer::PeerId,
    session_store::SessionStore,
    storage::{Storage, StorageError},
};

/// Terminal state of a successful send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// No session existed. A fresh one was created and only our handshake
    /// material was emitted; the message input was not consumed.
    Bootstrapped,

    /// Advanced state was persisted and the ciphertext emitted.
    Sent {
        /// Whether handshake material preceded the ciphertext because the
        /// session was still marked new.
        announced_handshake: bool,
    },
}

/// Summary of a successful receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReceiveOutcome {
    /// Handshake envelopes absorbed.
    pub handshakes: usize,
    /// Messages decrypted and delivered to the output.
    pub messages: usize,
    /// Whether our own handshake material was emitted in reply.
    pub replied: bool,
}

/// Observable session status for a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// No session stored.
    NoSession,
    /// Session stored and still marked new: the next send re-announces our
    /// handshake material.
    Bootstrapping,
    /// Session stored, marker cleared.
    Established,
}

/// Drives the session lifecycle for one local identity.
///
/// Holds borrowed handles only; construct one per invocation.
pub struct Orchestrator<'a, E, S> {
    engine: &'a E,
    sessions: &'a SessionStore<S>,
    identity: &'a IdentityKey,
}

impl<'a, E, S> Orchestrator<'a, E, S>
where
    E: RatchetEngine,
    S: Storage,
{
    /// Orchestrator over the given engine, store and identity.
    pub fn new(engine: &'a E, sessions: &'a SessionStore<S>, identity: &'a IdentityKey) -> Self {
        Self { engine, sessions, identity }
    }

    /// Send the plaintext read from `input` to `peer`, writing envelopes to
    /// `output`.
    ///
    /// On first contact nothing is read from `input`: a session is created
    /// and only its handshake material is emitted. The operator retries once
    /// the peer's material has been received.
    pub fn send<R, W>(
        &self,
        peer: &PeerId,
        input: &mut R,
        output: &mut W,
    ) -> Result<SendOutcome, SendError>
    where
        R: Read + ?Sized,
        W: Write + ?Sized,
    {
        let Some(state) = self
            .sessions
            .load::<E::State>(peer)
            .map_err(|source| SendError::Corrupt { peer: peer.clone(), source })?
        else {
            return self.bootstrap(peer, output);
        };

        let mut plaintext = Vec::new();
        input.read_to_end(&mut plaintext).map_err(SendError::Input)?;

        let (advanced, ciphertext) = match self.engine.encrypt(&state, &plaintext) {
            Ok(sealed) => sealed,
            Err(EngineError::HandshakeIncomplete) => {
                tracing::warn!(
                    %peer,
                    "handshake not complete; ask the peer for their key exchange material \
                     and receive it first. Re-emitting ours"
                );
                let reannounced = self
                    .emit_handshake(&state, output)
                    .map_err(SendError::from)
                    .and_then(|()| output.flush().map_err(|e| SendError::Transport(e.into())));
                if let Err(e) = reannounced {
                    // The pending handshake is still the status to report.
                    tracing::warn!(%peer, error = %e, "could not re-emit key exchange");
                }
                return Err(SendError::HandshakeIncomplete { peer: peer.clone() });
            },
            Err(e) => return Err(SendError::Engine(e)),
        };

        if let Err(source) = self.sessions.save(peer, &advanced) {
            let removed = self.discard(peer);
            tracing::error!(
                %peer,
                removed,
                error = %source,
                "could not persist advanced session; ciphertext withheld"
            );
            return Err(SendError::PersistenceFailure { peer: peer.clone(), removed, source });
        }

        let announce = self.sessions.markers().is_new(peer).unwrap_or_else(|e| {
            tracing::warn!(%peer, error = %e, "marker check failed; re-announcing handshake");
            true
        });
        if announce {
            self.emit_handshake(&advanced, output).map_err(SendError::from)?;
        }

        Envelope::new(EnvelopeKind::EncryptedMessage, ciphertext)
            .write_to(output)
            .map_err(SendError::Transport)?;
        output.flush().map_err(|e| SendError::Transport(e.into()))?;

        if announce {
            self.clear_marker(peer);
        }

        tracing::info!(%peer, bytes = plaintext.len(), announce, "message sent");
        Ok(SendOutcome::Sent { announced_handshake: announce })
    }

    /// Process every envelope read from `input` as coming from `peer`.
    ///
    /// Handshake material is absorbed into the session. On first contact a
    /// session is created and our own material is emitted in reply to
    /// `replies`, or to `output` when no separate sink is given. Material
    /// the engine rejects leaves nothing stored, and a reply that cannot be
    /// written removes the new session, so retrying the same input starts
    /// over.
    /// Messages are decrypted and their plaintext written to `output` after
    /// the advanced state has been persisted.
    ///
    /// Envelopes are processed in order and processing stops at the first
    /// failure; effects of earlier envelopes are kept.
    pub fn receive<R, W>(
        &self,
        peer: &PeerId,
        input: &mut R,
        output: &mut W,
        mut replies: Option<&mut dyn Write>,
    ) -> Result<ReceiveOutcome, ReceiveError>
    where
        R: Read + ?Sized,
        W: Write,
    {
        let mut text = String::new();
        input.read_to_string(&mut text).map_err(ReceiveError::Input)?;

        let envelopes = Envelope::decode_all(&text)?;
        if envelopes.is_empty() {
            return Err(ReceiveError::NoEnvelope);
        }
        if let Some(envelope) = envelopes.iter().find(|e| !e.kind.is_transport()) {
            return Err(ReceiveError::UnexpectedEnvelope { kind: envelope.kind });
        }

        let mut outcome = ReceiveOutcome::default();
        for envelope in envelopes {
            if envelope.kind == EnvelopeKind::KeyExchange {
                let sink: &mut dyn Write = match replies.as_deref_mut() {
                    Some(replies) => replies,
                    None => &mut *output,
                };
                outcome.replied |= self.absorb_handshake(peer, &envelope.payload, sink)?;
                outcome.handshakes += 1;
            } else {
                self.deliver_message(peer, &envelope.payload, output)?;
                outcome.messages += 1;
            }
        }

        output.flush().map_err(|e| ReceiveError::Transport(e.into()))?;
        if let Some(replies) = replies {
            replies.flush().map_err(|e| ReceiveError::Transport(e.into()))?;
        }
        Ok(outcome)
    }

    /// Delete the session and marker for `peer`.
    ///
    /// Returns whether a session existed. The next send bootstraps afresh.
    pub fn forget(&self, peer: &PeerId) -> Result<bool, StorageError> {
        let existed = self.sessions.exists(peer)?;
        self.sessions.remove(peer)?;
        self.sessions.markers().clear_new(peer)?;

        tracing::info!(%peer, existed, "session forgotten");
        Ok(existed)
    }

    /// Current status of the session with `peer`.
    ///
    /// Decodes the stored state so that corruption is surfaced here rather
    /// than on the next send.
    pub fn status(&self, peer: &PeerId) -> Result<SessionStatus, SessionStoreError> {
        if self.sessions.load::<E::State>(peer)?.is_none() {
            return Ok(SessionStatus::NoSession);
        }

        if self.sessions.markers().is_new(peer)? {
            Ok(SessionStatus::Bootstrapping)
        } else {
            Ok(SessionStatus::Established)
        }
    }

    fn bootstrap<W>(&self, peer: &PeerId, output: &mut W) -> Result<SendOutcome, SendError>
    where
        W: Write + ?Sized,
    {
        tracing::info!(
            %peer,
            "no session; send the emitted key exchange to the peer and receive their reply"
        );

        let state = match self.sessions.create(peer, self.engine, self.identity) {
            Ok(state) => state,
            Err(SessionStoreError::Engine(e)) => return Err(SendError::Engine(e)),
            Err(source) => {
                let removed = self.discard(peer);
                tracing::error!(%peer, removed, error = %source, "could not persist new session");
                return Err(SendError::PersistenceFailure { peer: peer.clone(), removed, source });
            },
        };

        self.emit_handshake(&state, output).map_err(SendError::from)?;
        output.flush().map_err(|e| SendError::Transport(e.into()))?;
        Ok(SendOutcome::Bootstrapped)
    }

    /// Returns whether a reply was emitted.
    ///
    /// A new session is stored only once the peer's material has been
    /// accepted, and only kept once our reply has been written out.
    fn absorb_handshake(
        &self,
        peer: &PeerId,
        material: &[u8],
        replies: &mut dyn Write,
    ) -> Result<bool, ReceiveError> {
        let corrupt = |source| ReceiveError::Corrupt { peer: peer.clone(), source };

        if let Some(state) = self.sessions.load::<E::State>(peer).map_err(corrupt)? {
            let completed = self.engine.complete_handshake(&state, material)?;
            self.sessions
                .save(peer, &completed)
                .map_err(|source| self.persistence_failure(peer, source))?;

            tracing::info!(%peer, "handshake absorbed");
            return Ok(false);
        }

        tracing::info!(%peer, "handshake from new peer; creating session");
        let fresh = self.engine.create(self.identity)?;
        let completed = self.engine.complete_handshake(&fresh, material)?;
        self.sessions
            .insert(peer, &completed)
            .map_err(|source| self.persistence_failure(peer, source))?;

        let replied = self
            .emit_handshake(&completed, replies)
            .map_err(ReceiveError::from)
            .and_then(|()| replies.flush().map_err(|e| ReceiveError::Transport(e.into())));
        if let Err(e) = replied {
            // The peer can never complete their side without our material.
            let removed = self.discard(peer);
            tracing::error!(%peer, removed, error = %e, "could not emit key exchange reply");
            return Err(e);
        }

        tracing::info!(%peer, "handshake absorbed; reply emitted");
        Ok(true)
    }

    fn deliver_message<W>(
        &self,
        peer: &PeerId,
        ciphertext: &[u8],
        output: &mut W,
    ) -> Result<(), ReceiveError>
    where
        W: Write + ?Sized,
    {
        let state = self
            .sessions
            .load::<E::State>(peer)
            .map_err(|source| ReceiveError::Corrupt { peer: peer.clone(), source })?
            .ok_or_else(|| ReceiveError::NoSession { peer: peer.clone() })?;

        let (advanced, plaintext) = self.engine.decrypt(&state, ciphertext)?;
        self.sessions.save(peer, &advanced).map_err(|source| self.persistence_failure(peer, source))?;

        output.write_all(&plaintext).map_err(|e| ReceiveError::Transport(e.into()))?;

        // The peer could only encrypt to us after absorbing our material.
        self.clear_marker(peer);

        tracing::info!(%peer, bytes = plaintext.len(), "message received");
        Ok(())
    }

    fn persistence_failure(&self, peer: &PeerId, source: SessionStoreError) -> ReceiveError {
        if let SessionStoreError::Engine(e) = source {
            return ReceiveError::Engine(e);
        }
        let removed = self.discard(peer);
        tracing::error!(%peer, removed, error = %source, "could not persist session; output withheld");
        ReceiveError::PersistenceFailure { peer: peer.clone(), removed, source }
    }

    fn emit_handshake<W>(&self, state: &E::State, output: &mut W) -> Result<(), EmitError>
    where
        W: Write + ?Sized,
    {
        let material = self.engine.handshake_material(state)?;
        Envelope::new(EnvelopeKind::KeyExchange, material).write_to(output)?;
        Ok(())
    }

    /// Remove a session whose on-disk copy can no longer be trusted.
    ///
    /// Returns whether the removal succeeded.
    fn discard(&self, peer: &PeerId) -> bool {
        match self.sessions.remove(peer) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(%peer, error = %e, "failed to remove ambiguous session");
                false
            },
        }
    }

    fn clear_marker(&self, peer: &PeerId) {
        if let Err(e) = self.sessions.markers().clear_new(peer) {
            // Advisory only: a stale marker causes one redundant announcement.
            tracing::warn!(%peer, error = %e, "failed to clear bootstrap marker");
        }
    }
}

/// Failure while producing a handshake envelope.
#[derive(Debug)]
enum EmitError {
    Engine(EngineError),
    Encode(EncodeError),
}

impl From<EngineError> for EmitError {
    fn from(e: EngineError) -> Self {
        Self::Engine(e)
    }
}

impl From<EncodeError> for EmitError {
    fn from(e: EncodeError) -> Self {
        Self::Encode(e)
    }
}

impl From<EmitError> for SendError {
    fn from(e: EmitError) -> Self {
        match e {
            EmitError::Engine(e) => Self::Engine(e),
            EmitError::Encode(e) => Self::Transport(e),
        }
    }
}

impl From<EmitError> for ReceiveError {
    fn from(e: EmitError) -> Self {
        match e {
            EmitError::Engine(e) => Self::Engine(e),
            EmitError::Encode(e) => Self::Transport(e),
        }
    }
}
