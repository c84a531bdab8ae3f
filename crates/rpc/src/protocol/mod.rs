//! Protocol layer for the RPC client.
//!
//! This module contains the core protocol definitions including:
//! - Call and reply envelopes
//! - Reply status codes
//! - Stream framing and the stream handshake

pub mod framing;
pub mod handshake;
pub mod message;
pub mod status;

pub use framing::{JsonFrameCodec, MAX_FRAME_SIZE, ScanResult, scan};
pub use handshake::{ClientHandshake, HandshakeConfig, HandshakeProgress, HandshakeState};
pub use message::{
    CallBody, Message, MessageBody, ReplyBody, decode_message, encode_message, message_from_value,
};
pub use status::ReplyStatus;
