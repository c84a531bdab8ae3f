//! Request/response transport for callwire.
//!
//! Every call becomes one HTTP POST carrying the encoded call message; the
//! response body is the reply. No handshake and no framing are involved.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod config;
mod connection;
mod error;

pub use config::HttpConfig;
pub use connection::{CODEC_HEADER, HttpConnection};
pub use error::HttpError;
