//! Fuzz target for the envelope decoder
//!
//! Envelopes arrive from peers over an untrusted transport, so the decoder
//! sees arbitrary text.
//!
//! # Strategy
//!
//! - Raw input: arbitrary UTF-8 fed straight to the decoder
//! - Structured input: well-formed armor around an arbitrary body, with
//!   optional line-level damage
//!
//! # Invariants
//!
//! - NEVER panic on any input
//! - Anything that decodes re-encodes to text that decodes to the same
//!   envelopes
//! - Armor label and body kind always agree on a decoded envelope

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use sealpost_proto::{Envelope, EnvelopeKind};

#[derive(Debug, Arbitrary)]
enum FuzzInput {
    Raw(String),
    Armored {
        kind: u8,
        payload: Vec<u8>,
        damage: Option<Damage>,
    },
}

#[derive(Debug, Arbitrary)]
enum Damage {
    DropLine(u8),
    ReplaceLine(u8, String),
    SwapLabel(u8),
    Truncate(u16),
}

fn apply(text: String, damage: Damage) -> String {
    let mut lines: Vec<String> = text.lines().map(str::to_owned).collect();
    match damage {
        Damage::DropLine(i) if !lines.is_empty() => {
            lines.remove(usize::from(i) % lines.len());
        },
        Damage::ReplaceLine(i, line) if !lines.is_empty() => {
            let i = usize::from(i) % lines.len();
            lines[i] = line;
        },
        Damage::SwapLabel(kind) => {
            if let Some(label) = EnvelopeKind::from_u8(kind).map(EnvelopeKind::label) {
                if let Some(first) = lines.first_mut() {
                    *first = format!("-----BEGIN SEALPOST {label}-----");
                }
            }
        },
        Damage::Truncate(n) => {
            let mut joined = lines.join("\n");
            let mut at = usize::from(n).min(joined.len());
            while !joined.is_char_boundary(at) {
                at -= 1;
            }
            joined.truncate(at);
            return joined;
        },
        _ => {},
    }
    lines.join("\n")
}

fuzz_target!(|input: FuzzInput| {
    let text = match input {
        FuzzInput::Raw(text) => text,
        FuzzInput::Armored { kind, payload, damage } => {
            let Some(kind) = EnvelopeKind::from_u8(kind) else {
                return;
            };
            let Ok(text) = Envelope::new(kind, payload).encode() else {
                return;
            };
            match damage {
                Some(damage) => apply(text, damage),
                None => text,
            }
        },
    };

    let Ok(envelopes) = Envelope::decode_all(&text) else {
        return;
    };

    let mut reencoded = String::new();
    for envelope in &envelopes {
        let block = envelope.encode().expect("decoded envelope must re-encode");
        let label = format!("-----BEGIN SEALPOST {}-----", envelope.kind.label());
        assert!(block.starts_with(&label), "label mismatch for {:?}", envelope.kind);
        reencoded.push_str(&block);
    }

    let again = Envelope::decode_all(&reencoded).expect("re-encoded text must decode");
    assert_eq!(again, envelopes);
});
