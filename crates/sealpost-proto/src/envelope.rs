//! Armored envelope encoding and decoding.

use std::io::Write;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};

use crate::{DecodeError, EncodeError, EnvelopeKind};

/// Product prefix placed before every armor label.
pub const ARMOR_PREFIX: &str = "SEALPOST ";

/// Body format version written by this crate.
pub const FORMAT_VERSION: u8 = 1;

/// Column at which the base64 body is wrapped.
pub const LINE_WIDTH: usize = 64;

const DASHES: &str = "-----";
const BEGIN: &str = "-----BEGIN ";
const END: &str = "-----END ";

/// CBOR body carried inside the armor.
#[derive(Serialize, Deserialize)]
struct Body {
    version: u8,
    kind: u8,
    #[serde(with = "serde_bytes")]
    payload: Vec<u8>,
}

/// A tagged, text-safe container for one binary payload.
#[derive(Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Content kind, repeated in the armor header and the body.
    pub kind: EnvelopeKind,
    /// Opaque payload bytes.
    pub payload: Vec<u8>,
}

impl std::fmt::Debug for Envelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Payloads may be ratchet state or identity secrets.
        f.debug_struct("Envelope")
            .field("kind", &self.kind)
            .field("payload", &format!("<{} bytes>", self.payload.len()))
            .finish()
    }
}

impl Envelope {
    /// Create an envelope.
    pub fn new(kind: EnvelopeKind, payload: impl Into<Vec<u8>>) -> Self {
        Self { kind, payload: payload.into() }
    }

    /// Encode to an armored text block, terminated by a newline.
    pub fn encode(&self) -> Result<String, EncodeError> {
        let body = Body {
            version: FORMAT_VERSION,
            kind: self.kind.to_u8(),
            payload: self.payload.clone(),
        };

        let mut cbor = Vec::new();
        ciborium::ser::into_writer(&body, &mut cbor)
            .map_err(|e| EncodeError::Body { reason: e.to_string() })?;

        let encoded = STANDARD.encode(&cbor);
        let label = self.kind.label();

        let mut out = String::with_capacity(encoded.len() + encoded.len() / LINE_WIDTH + 96);
        out.push_str(&format!("{BEGIN}{ARMOR_PREFIX}{label}{DASHES}\n"));
        // base64 output is ASCII, so byte chunks are valid char boundaries
        let mut rest = encoded.as_str();
        while !rest.is_empty() {
            let (line, tail) = rest.split_at(rest.len().min(LINE_WIDTH));
            out.push_str(line);
            out.push('\n');
            rest = tail;
        }
        out.push_str(&format!("{END}{ARMOR_PREFIX}{label}{DASHES}\n"));

        Ok(out)
    }

    /// Encode and write to `writer`.
    ///
    /// The writer is not flushed; callers decide when output is committed.
    pub fn write_to<W: Write + ?Sized>(&self, writer: &mut W) -> Result<(), EncodeError> {
        let text = self.encode()?;
        writer.write_all(text.as_bytes())?;
        Ok(())
    }

    /// Decode the first envelope found in `text`.
    ///
    /// Text before the BEGIN line is ignored, as is anything after the
    /// matching END line.
    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        let mut blocks = Blocks::new(text);
        blocks.next().unwrap_or(Err(DecodeError::MissingBegin))
    }

    /// Decode the first envelope in `text` and require it to be `expected`.
    pub fn decode_kind(text: &str, expected: EnvelopeKind) -> Result<Self, DecodeError> {
        let envelope = Self::decode(text)?;
        if envelope.kind != expected {
            return Err(DecodeError::UnexpectedKind { expected, actual: envelope.kind });
        }
        Ok(envelope)
    }

    /// Decode every envelope in `text`, in order of appearance.
    ///
    /// Returns an empty vector when no BEGIN line is present. Any malformed
    /// block fails the whole call.
    pub fn decode_all(text: &str) -> Result<Vec<Self>, DecodeError> {
        Blocks::new(text).collect()
    }
}

/// Iterator over armored blocks in a text stream.
struct Blocks<'a> {
    lines: std::str::Lines<'a>,
}

impl<'a> Blocks<'a> {
    fn new(text: &'a str) -> Self {
        Self { lines: text.lines() }
    }

    fn read_block(&mut self, begin_label: &str) -> Result<Envelope, DecodeError> {
        let mut body = String::new();

        for line in self.lines.by_ref() {
            let line = line.trim();
            if let Some(end_label) = armor_label(line, END) {
                if end_label != begin_label {
                    return Err(DecodeError::LabelMismatch {
                        begin: begin_label.to_string(),
                        end: end_label.to_string(),
                    });
                }
                return decode_body(begin_label, &body);
            }
            body.push_str(line);
        }

        Err(DecodeError::MissingEnd { label: begin_label.to_string() })
    }
}

impl Iterator for Blocks<'_> {
    type Item = Result<Envelope, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = self.lines.next()?.trim();
            if let Some(label) = armor_label(line, BEGIN) {
                return Some(self.read_block(label));
            }
        }
    }
}

/// Extract the label from a `-----BEGIN X-----` / `-----END X-----` line.
fn armor_label<'l>(line: &'l str, marker: &str) -> Option<&'l str> {
    line.strip_prefix(marker)?.strip_suffix(DASHES)
}

fn decode_body(label: &str, body: &str) -> Result<Envelope, DecodeError> {
    let header = label
        .strip_prefix(ARMOR_PREFIX)
        .and_then(EnvelopeKind::from_label)
        .ok_or_else(|| DecodeError::UnknownLabel { label: label.to_string() })?;

    let cbor = STANDARD.decode(body)?;
    let body: Body = ciborium::de::from_reader(&cbor[..])
        .map_err(|e| DecodeError::Body { reason: e.to_string() })?;

    if body.version != FORMAT_VERSION {
        return Err(DecodeError::UnsupportedVersion { version: body.version });
    }

    let kind =
        EnvelopeKind::from_u8(body.kind).ok_or(DecodeError::UnknownKind { value: body.kind })?;
    if kind != header {
        return Err(DecodeError::KindMismatch { header, body: kind });
    }

    Ok(Envelope { kind, payload: body.payload })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn armor(label: &str, body: &Body) -> String {
        let mut cbor = Vec::new();
        ciborium::ser::into_writer(body, &mut cbor).unwrap();
        format!("{BEGIN}{label}{DASHES}\n{}\n{END}{label}{DASHES}\n", STANDARD.encode(&cbor))
    }

    #[test]
    fn encode_has_labelled_markers() {
        let text = Envelope::new(EnvelopeKind::KeyExchange, b"material".to_vec()).encode().unwrap();

        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.first(), Some(&"-----BEGIN SEALPOST KEY EXCHANGE-----"));
        assert_eq!(lines.last(), Some(&"-----END SEALPOST KEY EXCHANGE-----"));
        assert!(text.ends_with('\n'));
    }

    #[test]
    fn body_lines_are_wrapped() {
        let text = Envelope::new(EnvelopeKind::EncryptedMessage, vec![0xAB; 1000]).encode().unwrap();

        let lines: Vec<_> = text.lines().collect();
        for line in &lines[1..lines.len() - 1] {
            assert!(line.len() <= LINE_WIDTH, "line too long: {}", line.len());
        }
        assert!(lines.len() > 3);
    }

    #[test]
    fn empty_payload_roundtrips() {
        let envelope = Envelope::new(EnvelopeKind::EncryptedMessage, Vec::new());
        let decoded = Envelope::decode(&envelope.encode().unwrap()).unwrap();
        assert_eq!(decoded, envelope);
    }

    #[test]
    fn tolerates_surrounding_text_and_crlf() {
        let text = Envelope::new(EnvelopeKind::KeyExchange, b"kx".to_vec()).encode().unwrap();
        let noisy = format!("hello there\r\n\r\n{}\r\ntrailing words", text.replace('\n', "\r\n"));

        let decoded = Envelope::decode(&noisy).unwrap();
        assert_eq!(decoded.kind, EnvelopeKind::KeyExchange);
        assert_eq!(decoded.payload, b"kx");
    }

    #[test]
    fn decode_all_preserves_order() {
        let kx = Envelope::new(EnvelopeKind::KeyExchange, b"first".to_vec());
        let msg = Envelope::new(EnvelopeKind::EncryptedMessage, b"second".to_vec());
        let text = format!("{}\n{}", kx.encode().unwrap(), msg.encode().unwrap());

        let all = Envelope::decode_all(&text).unwrap();
        assert_eq!(all, vec![kx, msg]);
    }

    #[test]
    fn decode_all_of_plain_text_is_empty() {
        assert!(Envelope::decode_all("nothing armored here").unwrap().is_empty());
        assert!(matches!(Envelope::decode("nothing"), Err(DecodeError::MissingBegin)));
    }

    #[test]
    fn missing_end_is_rejected() {
        let text = Envelope::new(EnvelopeKind::Ratchet, b"state".to_vec()).encode().unwrap();
        let truncated: String = text.lines().take(2).collect::<Vec<_>>().join("\n");

        assert!(matches!(Envelope::decode(&truncated), Err(DecodeError::MissingEnd { .. })));
    }

    #[test]
    fn mismatched_end_label_is_rejected() {
        let text = Envelope::new(EnvelopeKind::Ratchet, b"state".to_vec()).encode().unwrap();
        let swapped = text.replace("-----END SEALPOST RATCHET-----", "-----END SEALPOST KEY EXCHANGE-----");

        assert!(matches!(Envelope::decode(&swapped), Err(DecodeError::LabelMismatch { .. })));
    }

    #[test]
    fn foreign_label_is_rejected() {
        let text = "-----BEGIN PGP MESSAGE-----\nAAAA\n-----END PGP MESSAGE-----\n";
        assert!(matches!(Envelope::decode(text), Err(DecodeError::UnknownLabel { .. })));
    }

    #[test]
    fn corrupted_base64_is_rejected() {
        let text = Envelope::new(EnvelopeKind::Ratchet, b"state".to_vec()).encode().unwrap();
        let mangled = text.replacen('\n', "\n!!", 1);

        assert!(matches!(Envelope::decode(&mangled), Err(DecodeError::Base64(_))));
    }

    #[test]
    fn non_cbor_body_is_rejected() {
        let text = format!(
            "{BEGIN}SEALPOST RATCHET{DASHES}\n{}\n{END}SEALPOST RATCHET{DASHES}\n",
            STANDARD.encode(b"\xff\xff\xff")
        );
        assert!(matches!(Envelope::decode(&text), Err(DecodeError::Body { .. })));
    }

    #[test]
    fn header_body_kind_mismatch_is_rejected() {
        let body = Body { version: FORMAT_VERSION, kind: 3, payload: vec![1, 2, 3] };
        let text = armor("SEALPOST KEY EXCHANGE", &body);

        match Envelope::decode(&text) {
            Err(DecodeError::KindMismatch { header, body }) => {
                assert_eq!(header, EnvelopeKind::KeyExchange);
                assert_eq!(body, EnvelopeKind::EncryptedMessage);
            },
            other => panic!("expected KindMismatch, got {other:?}"),
        }
    }

    #[test]
    fn future_version_is_rejected() {
        let body = Body { version: 9, kind: 1, payload: vec![] };
        let text = armor("SEALPOST RATCHET", &body);

        assert!(matches!(
            Envelope::decode(&text),
            Err(DecodeError::UnsupportedVersion { version: 9 })
        ));
    }

    #[test]
    fn unknown_body_kind_is_rejected() {
        let body = Body { version: FORMAT_VERSION, kind: 77, payload: vec![] };
        let text = armor("SEALPOST RATCHET", &body);

        assert!(matches!(Envelope::decode(&text), Err(DecodeError::UnknownKind { value: 77 })));
    }

    #[test]
    fn decode_kind_enforces_expected_kind() {
        let text = Envelope::new(EnvelopeKind::KeyExchange, b"kx".to_vec()).encode().unwrap();

        assert!(Envelope::decode_kind(&text, EnvelopeKind::KeyExchange).is_ok());
        assert!(matches!(
            Envelope::decode_kind(&text, EnvelopeKind::Ratchet),
            Err(DecodeError::UnexpectedKind {
                expected: EnvelopeKind::Ratchet,
                actual: EnvelopeKind::KeyExchange
            })
        ));
    }

    #[test]
    fn debug_redacts_payload() {
        let envelope = Envelope::new(EnvelopeKind::IdentityKey, vec![0x42; 32]);
        let debug = format!("{envelope:?}");

        assert!(debug.contains("<32 bytes>"));
        assert!(!debug.contains("66"));
    }
}
