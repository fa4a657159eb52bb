//! Fuzz target for the session lifecycle
//!
//! Drives two parties through arbitrary sends, deliveries, forgets and
//! storage failures, against both the real orchestrator and the reference
//! model.
//!
//! # Invariants
//!
//! - Every operation returns the same result in both worlds
//! - Stored sessions and bootstrap markers match the model after every step
//! - No one-time key is ever used for two emitted messages

#![no_main]

use libfuzzer_sys::fuzz_target;
use sealpost_harness::{ModelWorld, Operation, RealWorld};

fuzz_target!(|input: (u64, Vec<Operation>)| {
    let (seed, ops) = input;
    let mut model = ModelWorld::new();
    let mut real = RealWorld::new(seed);

    for (i, op) in ops.iter().enumerate() {
        let expected = model.apply(op);
        let actual = real.apply(op);
        assert_eq!(expected, actual, "divergence at operation {i}: {op:?}");

        if let Err(divergence) = real.check(&model) {
            panic!("state divergence at operation {i} ({op:?}): {divergence}");
        }
    }

    assert_eq!(real.reused_keys(), 0);
});
