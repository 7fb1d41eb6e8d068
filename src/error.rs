//! Pipeline and runtime error types.

use std::io;

use thiserror::Error;

use crate::encoding::WireType;

/// An error raised while compiling a schema.
///
/// Every pipeline stage surfaces its failure upward unchanged; the only
/// recovery point is feature negotiation, which demotes typed declarations
/// on a cyclic schema instead of failing.
#[derive(Debug, Error)]
pub enum Error {
    /// An imported file could not be located on the search path.
    #[error("import not found: {name}")]
    ImportNotFound { name: String },

    /// The scanner rejected a file before the grammar was consulted.
    #[error("scan error in {file}: {detail}")]
    Scan { file: String, detail: String },

    /// The grammar rejected a file.
    #[error("parse error in {file} at line {line}: {detail}")]
    Parse {
        file: String,
        line: usize,
        detail: String,
    },

    /// The normalized schema violates one or more invariants.
    #[error("invalid schema: {}", format_defs_errors(.0))]
    InvalidSchema(Vec<DefsError>),

    #[error(transparent)]
    Io(#[from] io::Error),

    /// A generation-stage invariant broke. This indicates a bug: the
    /// schema was validated before synthesis started.
    #[error("internal error in {stage}: {detail}")]
    Internal { stage: &'static str, detail: String },
}

fn format_defs_errors(errors: &[DefsError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// A single schema-invariant violation found by the normalizer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DefsError {
    #[error("duplicate definition of {name}")]
    DuplicateDef { name: String },

    #[error("{msg}.{field}: reference to undefined type {name}")]
    UnresolvedRef {
        msg: String,
        field: String,
        name: String,
    },

    #[error("extend target {name} is not a defined message")]
    BadExtendTarget { name: String },

    #[error("{msg}: duplicate field number {fnum}")]
    DuplicateFnum { msg: String, fnum: u32 },

    #[error("{msg}: duplicate field name {field}")]
    DuplicateFieldName { msg: String, field: String },

    #[error("{msg}.{field}: invalid field number {fnum}")]
    BadFnum { msg: String, field: String, fnum: u32 },

    #[error("{msg}.{field}: packed is only admissible on repeated scalar fields")]
    BadPacked { msg: String, field: String },

    #[error("{msg}.{field}: default value {literal} is not valid for {ty}")]
    BadDefault {
        msg: String,
        field: String,
        literal: String,
        ty: String,
    },

    #[error("enum {name} has no values")]
    EmptyEnum { name: String },

    #[error("enum {name}: duplicate symbol {symbol}")]
    DuplicateEnumSymbol { name: String, symbol: String },
}

/// A wire-format decoding error.
///
/// Indicates that the input buffer does not hold a valid encoding of the
/// requested message type. Details are best effort; it is not always
/// possible to pinpoint why data is malformed.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("failed to decode message: {kind}")]
pub struct DecodeError {
    kind: DecodeErrorKind,
}

impl DecodeError {
    pub fn kind(&self) -> &DecodeErrorKind {
        &self.kind
    }

    pub(crate) fn truncated() -> DecodeError {
        DecodeErrorKind::Truncated.into()
    }

    pub(crate) fn malformed_wire_type(value: u64) -> DecodeError {
        DecodeErrorKind::MalformedWireType(value).into()
    }

    pub(crate) fn invalid_varint() -> DecodeError {
        DecodeErrorKind::InvalidVarint.into()
    }

    pub(crate) fn invalid_key(key: u64) -> DecodeError {
        DecodeErrorKind::InvalidKey(key).into()
    }

    pub(crate) fn invalid_tag() -> DecodeError {
        DecodeErrorKind::InvalidTag.into()
    }

    pub(crate) fn invalid_utf8() -> DecodeError {
        DecodeErrorKind::InvalidUtf8.into()
    }

    pub(crate) fn unexpected_wire_type(expected: WireType, actual: WireType) -> DecodeError {
        DecodeErrorKind::UnexpectedWireType { expected, actual }.into()
    }

    pub(crate) fn recursion_limit() -> DecodeError {
        DecodeErrorKind::RecursionLimitReached.into()
    }

    pub(crate) fn unknown_message(name: &str) -> DecodeError {
        DecodeErrorKind::UnknownMessage(name.to_string()).into()
    }
}

impl From<DecodeErrorKind> for DecodeError {
    fn from(kind: DecodeErrorKind) -> DecodeError {
        DecodeError { kind }
    }
}

impl From<DecodeError> for io::Error {
    fn from(error: DecodeError) -> io::Error {
        io::Error::new(io::ErrorKind::InvalidData, error)
    }
}

/// The root cause of a [`DecodeError`].
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum DecodeErrorKind {
    #[error("truncated input")]
    Truncated,

    #[error("malformed wire type value: {0}")]
    MalformedWireType(u64),

    #[error("invalid varint")]
    InvalidVarint,

    #[error("invalid key value: {0}")]
    InvalidKey(u64),

    #[error("invalid tag value: 0")]
    InvalidTag,

    #[error("invalid string value: data is not UTF-8 encoded")]
    InvalidUtf8,

    #[error("invalid wire type: {actual:?} (expected {expected:?})")]
    UnexpectedWireType {
        expected: WireType,
        actual: WireType,
    },

    #[error("recursion limit reached")]
    RecursionLimitReached,

    #[error("unknown message type {0}")]
    UnknownMessage(String),
}

/// A message encoding error.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum EncodeError {
    #[error("unknown message type {0}")]
    UnknownMessage(String),

    /// The value's field slots do not line up with the message definition.
    #[error("value does not match the shape of message {msg}")]
    Shape { msg: String },

    #[error("{msg}.{field}: required field is absent")]
    MissingRequired { msg: String, field: String },

    #[error("{msg}.{field}: value {value} cannot be encoded as {ty}")]
    Type {
        msg: String,
        field: String,
        value: String,
        ty: &'static str,
    },

    /// Verify-first encoding found an invalid value.
    #[error(transparent)]
    Verify(#[from] VerifyError),
}

/// A verification failure, pinpointed by the dotted field path from the
/// root of the verified value.
#[derive(Clone, Debug, PartialEq, Error)]
#[error("{reason} at {path} (value: {value})")]
pub struct VerifyError {
    pub reason: VerifyReason,
    /// Debug rendering of the offending value.
    pub value: String,
    /// Dotted field chain from the root, with `[index]` segments for
    /// repeated elements; `<root>` when the top-level value is at fault.
    pub path: String,
}

#[derive(Clone, Debug, PartialEq, Error)]
#[non_exhaustive]
pub enum VerifyReason {
    #[error("value has the wrong type, expected {expected}")]
    WrongType { expected: &'static str },

    #[error("integer out of range for {ty}")]
    OutOfRange { ty: &'static str },

    #[error("undefined enum symbol")]
    BadEnumSymbol,

    #[error("required field is absent")]
    MissingRequired,

    #[error("message value does not match its definition")]
    BadShape,
}
