//! Errors of a single HTTP exchange.
//!
//! The display text is the description the affected call receives.

use thiserror::Error;

/// Failure of one request/response exchange.
#[derive(Debug, Error)]
pub enum HttpError {
    /// The request could not be sent or the body not read.
    #[error("http failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The server answered with a non-200 status.
    #[error("http failed, status={0}")]
    Status(u16),

    /// The response body is not a message.
    #[error("failed to decode reply: {0}")]
    Decode(#[source] callwire_rpc::Error),

    /// The reply carries another call's transaction id.
    #[error("reply transaction id mismatch: expected {expected}, got {actual}")]
    XidMismatch {
        /// Transaction id of the request.
        expected: u32,
        /// Transaction id in the reply.
        actual: u32,
    },
}
