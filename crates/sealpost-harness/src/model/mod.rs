//! Reference model for model-based testing.
//!
//! Two parties, each with at most one session with the other, exchange
//! envelopes through in-memory inboxes. The model tracks only what the
//! orchestrator promises observably: session presence, the bootstrap
//! marker, chain counters and which envelopes reach the peer.
//!
//! # Design Principles
//!
//! - Simplicity: The model should be obviously correct
//! - Contract not implementation: Captures WHAT, not HOW
//! - Deterministic: Same inputs produce same outputs

pub mod operation;
mod world;

pub use operation::{Operation, OperationResult, PartyId, SmallMessage};
pub use world::{ModelEnvelope, ModelParty, ModelSession, ModelWorld};
