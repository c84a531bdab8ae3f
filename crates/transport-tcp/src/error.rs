//! Errors that tear a stream connection down.
//!
//! The display text of each variant is the description every pending call
//! receives when the connection fails.

use callwire_rpc::HandshakeError;
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Connection-fatal stream failure.
#[derive(Debug, Error)]
pub enum StreamError {
    /// Could not reach the server.
    #[error("connection error: failed to connect to {addr}: {source}")]
    Connect {
        /// The address we tried to connect to.
        addr: String,
        /// The underlying error.
        #[source]
        source: io::Error,
    },

    /// Connecting took longer than the configured timeout.
    #[error("connection error: connecting to {addr} timed out after {timeout:?}")]
    ConnectTimeout {
        /// The address we tried to connect to.
        addr: String,
        /// Configured connect timeout.
        timeout: Duration,
    },

    /// Read or write failed.
    #[error("connection error: {0}")]
    Io(#[from] io::Error),

    /// The server hello was rejected.
    #[error(transparent)]
    Handshake(#[from] HandshakeError),

    /// Received bytes do not form a message.
    #[error("framing error: {0}")]
    Framing(io::Error),

    /// A framed message could not be decoded.
    #[error("failed to decode message: {0}")]
    Decode(#[source] callwire_rpc::Error),

    /// The server closed the stream.
    #[error("connection closed by server")]
    RemoteClosed,
}

impl StreamError {
    /// Classify an error surfaced by the framed reader.
    pub(crate) fn from_read(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::InvalidData {
            Self::Framing(err)
        } else {
            Self::Io(err)
        }
    }
}
