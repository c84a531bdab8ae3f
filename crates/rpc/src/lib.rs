//! Transport-agnostic core of the callwire RPC client.
//!
//! A caller invokes a named method on a named remote service and gets back
//! a correlated result. This crate holds everything that does not depend on
//! how bytes travel:
//!
//! - **Codec**: JSON text encoding of [`Value`] trees
//! - **Messages**: call/reply envelopes and reply status codes
//! - **Framing**: recovering message boundaries from a byte stream
//! - **Handshake**: version/codec agreement for persistent streams
//! - **Dispatch**: the pending-call table correlating replies by transaction id
//!
//! Transports live in their own crates and implement
//! [`TransportConnection`].
//!
//! # Example
//!
//! ```no_run
//! use callwire_rpc::{TransportConnection, Value};
//!
//! async fn mirror(conn: &dyn TransportConnection) -> callwire_rpc::Result<()> {
//!     let result = conn
//!         .call("Calculator", "MirrorInt", Value::from(vec![7]))
//!         .await?;
//!     assert_eq!(result.as_i64(), Some(7));
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod codec;
pub mod dispatch;
pub mod error;
pub mod protocol;
pub mod transport;

// Re-export commonly used types
pub use codec::{
    CodecId, Map, ToWire, Value, decode, decode_slice, encode, from_value, to_value,
};
pub use dispatch::{CallDispatcher, CallStatus, CompletionCallback};
pub use error::{
    CodecError, ConnectionError, DecodeError, DecodeErrorKind, Error, HandshakeError,
    ProtocolError, Result,
};
pub use protocol::{
    HandshakeConfig, HandshakeState, JsonFrameCodec, Message, MessageBody, ReplyStatus,
};
pub use transport::{ConnectionHandle, ConnectionManager, TransportConnection};

// Re-export dependencies that are part of our public API
pub use bytes::Bytes;
