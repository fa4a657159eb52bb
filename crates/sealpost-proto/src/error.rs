//! Codec error types.

use thiserror::Error;

use crate::EnvelopeKind;

/// Errors produced while decoding an armored envelope.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// No `-----BEGIN SEALPOST ...-----` line was found.
    #[error("no envelope found")]
    MissingBegin,

    /// A block was opened but never closed.
    #[error("envelope {label:?} is not terminated")]
    MissingEnd {
        /// Label of the unterminated block.
        label: String,
    },

    /// Armor label is not one sealpost produces.
    #[error("unknown envelope label {label:?}")]
    UnknownLabel {
        /// Offending label.
        label: String,
    },

    /// BEGIN and END lines disagree.
    #[error("envelope opened as {begin:?} but closed as {end:?}")]
    LabelMismatch {
        /// Label on the BEGIN line.
        begin: String,
        /// Label on the END line.
        end: String,
    },

    /// Body is not valid base64.
    #[error("invalid armor body: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Decoded body is not the expected CBOR structure.
    #[error("invalid envelope body: {reason}")]
    Body {
        /// Description of the CBOR failure.
        reason: String,
    },

    /// Body was written by an incompatible format version.
    #[error("unsupported envelope version {version}")]
    UnsupportedVersion {
        /// Version found in the body.
        version: u8,
    },

    /// Body kind byte is not a known kind.
    #[error("unknown envelope kind {value}")]
    UnknownKind {
        /// Raw discriminant.
        value: u8,
    },

    /// Header label and body kind disagree.
    #[error("envelope labelled {header} carries a {body} body")]
    KindMismatch {
        /// Kind named by the armor header.
        header: EnvelopeKind,
        /// Kind recorded inside the body.
        body: EnvelopeKind,
    },

    /// Envelope decoded but is not the kind the caller required.
    #[error("expected {expected} envelope, found {actual}")]
    UnexpectedKind {
        /// Kind the caller asked for.
        expected: EnvelopeKind,
        /// Kind that was present.
        actual: EnvelopeKind,
    },
}

/// Errors produced while encoding or writing an envelope.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// CBOR serialization of the body failed.
    #[error("failed to serialize envelope body: {reason}")]
    Body {
        /// Description of the serializer failure.
        reason: String,
    },

    /// Writing the armored text failed.
    #[error("failed to write envelope: {0}")]
    Io(#[from] std::io::Error),
}
