//! Deterministic test harness for sealpost.
//!
//! - [`SimEnv`]: seeded randomness so failures reproduce exactly
//! - [`FakeEngine`]: a transparent engine whose one-time keys and call
//!   counts are observable
//! - [`model`]: a two-party reference model for model-based testing
//! - [`RealWorld`]: the same two parties driven through the real
//!   orchestrator
//!
//! # Model-Based Testing
//!
//! Operations are applied to both the model and the real orchestrator
//! (backed by [`FakeEngine`] and fault-injecting storage), and their results
//! and observable storage are compared after every step.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod fake_engine;
pub mod model;
pub mod real;
pub mod sim_env;

pub use fake_engine::{EngineCalls, FakeCiphertext, FakeEngine, FakeState};
pub use model::{
    ModelEnvelope, ModelParty, ModelSession, ModelWorld, Operation, OperationResult, PartyId,
    SmallMessage,
};
pub use real::RealWorld;
pub use sim_env::SimEnv;
