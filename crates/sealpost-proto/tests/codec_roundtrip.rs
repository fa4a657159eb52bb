//! Envelope codec properties.
//!
//! - Round-trip: `decode(encode(kind, payload)) == (kind, payload)` for every
//!   payload, including empty payloads and bytes that are not text-safe
//! - Armor-only output: encoded text is printable ASCII
//! - Decoding never panics on arbitrary input

use proptest::prelude::*;
use sealpost_proto::{Envelope, EnvelopeKind};

fn kind_strategy() -> impl Strategy<Value = EnvelopeKind> {
    prop::sample::select(EnvelopeKind::ALL.to_vec())
}

proptest! {
    #[test]
    fn prop_roundtrip(kind in kind_strategy(), payload in prop::collection::vec(any::<u8>(), 0..2048)) {
        let envelope = Envelope::new(kind, payload.clone());
        let text = envelope.encode().map_err(|e| TestCaseError::fail(e.to_string()))?;

        let decoded = Envelope::decode(&text).map_err(|e| TestCaseError::fail(e.to_string()))?;
        prop_assert_eq!(decoded.kind, kind);
        prop_assert_eq!(decoded.payload, payload);
    }

    #[test]
    fn prop_encoded_text_is_printable_ascii(kind in kind_strategy(), payload in prop::collection::vec(any::<u8>(), 0..512)) {
        let text = Envelope::new(kind, payload).encode().map_err(|e| TestCaseError::fail(e.to_string()))?;
        prop_assert!(text.bytes().all(|b| b == b'\n' || (0x20..0x7f).contains(&b)));
    }

    #[test]
    fn prop_concatenated_envelopes_decode_in_order(
        first in prop::collection::vec(any::<u8>(), 0..256),
        second in prop::collection::vec(any::<u8>(), 0..256),
    ) {
        let a = Envelope::new(EnvelopeKind::KeyExchange, first);
        let b = Envelope::new(EnvelopeKind::EncryptedMessage, second);
        let text = format!(
            "{}{}",
            a.encode().map_err(|e| TestCaseError::fail(e.to_string()))?,
            b.encode().map_err(|e| TestCaseError::fail(e.to_string()))?,
        );

        let all = Envelope::decode_all(&text).map_err(|e| TestCaseError::fail(e.to_string()))?;
        prop_assert_eq!(all, vec![a, b]);
    }

    #[test]
    fn prop_decode_arbitrary_text_does_not_panic(text in ".{0,512}") {
        let _ = Envelope::decode_all(&text);
    }

    #[test]
    fn prop_decode_mangled_body_does_not_panic(
        payload in prop::collection::vec(any::<u8>(), 0..256),
        cut in 0usize..400,
    ) {
        let text = Envelope::new(EnvelopeKind::Ratchet, payload)
            .encode()
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
        let cut = cut.min(text.len());
        let _ = Envelope::decode(&text[..cut]);
    }
}
