//! Persistent-stream transport for callwire.
//!
//! A [`StreamConnection`] runs the client handshake over any byte stream a
//! [`Connector`] produces, then exchanges framed JSON messages on it. The
//! stock connector is [`TcpConnector`].

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod config;
mod connection;
mod connector;
mod error;

pub use config::StreamConfig;
pub use connection::{Phase, StreamConnection};
pub use connector::{Connector, TcpConnector};
pub use error::StreamError;

/// Stream connection over TCP.
pub type TcpConnection = StreamConnection<TcpConnector>;

/// Create an idle TCP connection to `addr` (`host:port`).
#[must_use]
pub fn tcp(addr: impl Into<String>, config: StreamConfig) -> TcpConnection {
    StreamConnection::new(TcpConnector::new(addr), config)
}
