//! Error types for the RPC client runtime.

use crate::protocol::handshake::HandshakeState;
use serde_json::error::Category;
use thiserror::Error;

/// Result type alias for RPC operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for RPC operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Connection-related errors.
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// Protocol-level errors.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Codec errors during serialization/deserialization.
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// Stream handshake failed.
    #[error(transparent)]
    Handshake(#[from] HandshakeError),

    /// The call completed unsuccessfully.
    ///
    /// Carries the same description the completion callback receives.
    #[error("Call failed: {0}")]
    CallFailed(String),

    /// Channel closed unexpectedly.
    #[error("Channel closed")]
    ChannelClosed,
}

/// Connection-specific errors.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// A call with this transaction id is still outstanding.
    #[error("Transaction id {0} is already in flight")]
    DuplicateTransaction(u32),
}

/// Protocol-level errors.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Invalid frame received.
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// Frame too large.
    #[error("Frame size {size} exceeds maximum {max}")]
    FrameTooLarge {
        /// Size of the frame.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// A required envelope field is absent.
    #[error("Missing field: {0}")]
    MissingField(&'static str),

    /// An envelope field has the wrong type or range.
    #[error("Invalid field {field}: {reason}")]
    InvalidField {
        /// Dotted path of the field.
        field: &'static str,
        /// What was wrong with it.
        reason: String,
    },

    /// `header.msgType` is not a known message type.
    #[error("Unknown message type: {0}")]
    UnknownMessageType(i64),

    /// A call was rejected before it was sent.
    #[error("Invalid call: {0}")]
    InvalidCall(String),
}

/// Codec-related errors.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Serialization failed.
    #[error("Failed to serialize: {0}")]
    SerializationFailed(String),

    /// Deserialization failed.
    #[error("Failed to deserialize: {0}")]
    DeserializationFailed(String),

    /// Unsupported codec type.
    #[error("Unsupported codec: {0}")]
    UnsupportedCodec(u8),

    /// Wire text was malformed.
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Malformed wire text.
///
/// Displays as the parser's own message, which names the position.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct DecodeError {
    /// What went wrong.
    pub kind: DecodeErrorKind,
    /// One-based line of the offending input.
    pub line: usize,
    /// One-based column of the offending input.
    pub column: usize,
    message: String,
}

impl DecodeError {
    /// Parser message, including the position.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<serde_json::Error> for DecodeError {
    fn from(err: serde_json::Error) -> Self {
        let kind = match err.classify() {
            Category::Eof => DecodeErrorKind::UnexpectedEnd,
            Category::Syntax => DecodeErrorKind::Syntax,
            Category::Data | Category::Io => DecodeErrorKind::Data,
        };
        Self {
            kind,
            line: err.line(),
            column: err.column(),
            message: err.to_string(),
        }
    }
}

/// Reason a decode failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeErrorKind {
    /// Input ended in the middle of a value.
    UnexpectedEnd,
    /// Text that is not JSON, including bad escapes, invalid UTF-8,
    /// trailing characters and nesting past the recursion limit.
    Syntax,
    /// Well-formed text holding a value that cannot be represented.
    Data,
}

/// Stream handshake failures.
///
/// The display text is what pending calls receive when a handshake fails.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandshakeError {
    /// Server hello does not start with our magic tag.
    #[error("handshake failed: bad magic, server has {actual:?}, we have {expected:?}")]
    BadMagic {
        /// Our magic.
        expected: [u8; 3],
        /// What the server sent.
        actual: [u8; 3],
    },

    /// Protocol version mismatch.
    #[error(
        "handshake failed: bad version, server is: {server_major}.{server_minor} , we are: {client_major}.{client_minor}"
    )]
    BadVersion {
        /// Server major version.
        server_major: u8,
        /// Server minor version.
        server_minor: u8,
        /// Client major version.
        client_major: u8,
        /// Client minor version.
        client_minor: u8,
    },

    /// Codec mismatch.
    #[error("handshake failed: bad codec, server has: {server} , we have: {client}")]
    BadCodec {
        /// Server codec id.
        server: u8,
        /// Client codec id.
        client: u8,
    },

    /// The server did not echo our nonce.
    #[error("handshake failed: bad client hand")]
    BadClientNonce,

    /// An operation was attempted in the wrong state.
    #[error("handshake failed: bad handshake state: {0:?}")]
    InvalidState(HandshakeState),
}

impl From<DecodeError> for Error {
    fn from(err: DecodeError) -> Self {
        Self::Codec(CodecError::Decode(err))
    }
}
