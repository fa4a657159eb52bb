//! Sealpost wire and storage envelopes.
//!
//! Every blob sealpost writes, whether to a session file or to standard
//! output, is wrapped in a text-armored [`Envelope`]. The armor header names
//! the content kind so that a stored ratchet state can never be mistaken for
//! a transport message, even when the text is inspected out of context.
//!
//! ```text
//! -----BEGIN SEALPOST KEY EXCHANGE-----
//! oWd2ZXJzaW9uAWRraW5kAmdwYXlsb2FkQ...
//! -----END SEALPOST KEY EXCHANGE-----
//! ```
//!
//! The body is base64 over a CBOR map carrying a format version, the content
//! kind (again, checked against the header) and the payload bytes.
//!
//! This crate is purely structural. It attaches no cryptographic meaning to
//! payloads.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod envelope;
mod error;
mod kind;

pub use envelope::{ARMOR_PREFIX, Envelope, FORMAT_VERSION, LINE_WIDTH};
pub use error::{DecodeError, EncodeError};
pub use kind::EnvelopeKind;
