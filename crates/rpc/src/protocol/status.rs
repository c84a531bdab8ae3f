//! Reply status codes.

use std::fmt;

/// Outcome reported in a reply body, plus client-only codes synthesized
/// locally when a call fails without a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReplyStatus {
    /// The call executed successfully.
    Success,
    /// No such service.
    ServiceUnavailable,
    /// No such method in the given service.
    MethodUnavailable,
    /// Wrong number or type of params.
    InvalidArguments,
    /// Unexpected failure inside the server.
    ServerInternalError,
    /// Too many calls in execution on the server.
    ServerBusy,
    /// The caller is not allowed to perform the call.
    Unauthorized,
    /// Client only: no reply within the call deadline.
    QueryTimeout,
    /// Client only: the transport closed while waiting for the reply.
    ConnectionClosed,
    /// Client only: the transport could not send the call.
    ConnectionError,
    /// A code this client does not know.
    Unknown(i64),
}

impl ReplyStatus {
    /// Numeric wire code.
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::Success => 0,
            Self::ServiceUnavailable => 1,
            Self::MethodUnavailable => 2,
            Self::InvalidArguments => 3,
            Self::ServerInternalError => 4,
            Self::ServerBusy => 5,
            Self::Unauthorized => 6,
            Self::QueryTimeout => 101,
            Self::ConnectionClosed => 103,
            Self::ConnectionError => 104,
            Self::Unknown(code) => code,
        }
    }

    /// Map a wire code back to a status. Never fails; unrecognised codes
    /// become [`ReplyStatus::Unknown`].
    #[must_use]
    pub const fn from_code(code: i64) -> Self {
        match code {
            0 => Self::Success,
            1 => Self::ServiceUnavailable,
            2 => Self::MethodUnavailable,
            3 => Self::InvalidArguments,
            4 => Self::ServerInternalError,
            5 => Self::ServerBusy,
            6 => Self::Unauthorized,
            101 => Self::QueryTimeout,
            103 => Self::ConnectionClosed,
            104 => Self::ConnectionError,
            other => Self::Unknown(other),
        }
    }

    /// Whether the status reports success.
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }

    /// Client-only codes never appear in a reply sent by a server.
    #[must_use]
    pub const fn is_client_only(self) -> bool {
        matches!(
            self,
            Self::QueryTimeout | Self::ConnectionClosed | Self::ConnectionError
        )
    }
}

impl fmt::Display for ReplyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => f.write_str("success"),
            Self::ServiceUnavailable => f.write_str("no such service"),
            Self::MethodUnavailable => f.write_str("no such method"),
            Self::InvalidArguments => f.write_str("garbage arguments"),
            Self::ServerInternalError => f.write_str("server internal error"),
            Self::ServerBusy => f.write_str("server busy"),
            Self::Unauthorized => f.write_str("unauthorized"),
            Self::QueryTimeout => f.write_str("query timeout"),
            Self::ConnectionClosed => f.write_str("connection closed"),
            Self::ConnectionError => f.write_str("connection error"),
            Self::Unknown(code) => write!(f, "unknown replyStatus: {code}"),
        }
    }
}
