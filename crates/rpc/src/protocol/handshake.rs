//! Client side of the stream handshake.
//!
//! ```text
//! client hello : magic(3) major(1) minor(1) codec(1) client_nonce(32)                    = 38
//! server hello : magic(3) major(1) minor(1) codec(1) server_nonce(32) client_nonce(32)   = 70
//! client ack   : magic(3) major(1) minor(1) codec(1) server_nonce(32)                    = 38
//! ```
//!
//! Framing starts on the first byte after the server hello.

use crate::codec::CodecId;
use crate::error::HandshakeError;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use rand::RngCore;

/// Length of a nonce.
pub const NONCE_LEN: usize = 32;

/// Length of the fixed preamble (magic, version, codec).
pub const PREAMBLE_LEN: usize = 6;

/// Length of the client hello and of the client ack.
pub const CLIENT_HELLO_LEN: usize = PREAMBLE_LEN + NONCE_LEN;

/// Length of the server hello.
pub const SERVER_HELLO_LEN: usize = PREAMBLE_LEN + 2 * NONCE_LEN;

/// Handshake progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// Nothing sent yet.
    NotStarted,
    /// Client hello written, waiting for the server hello.
    ClientHelloSent,
    /// Server hello accepted. Terminal.
    Completed,
    /// Server hello rejected. Terminal.
    Failed,
}

/// Parameters both sides must agree on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeConfig {
    /// Three byte protocol tag.
    pub magic: [u8; 3],
    /// Protocol major version.
    pub version_major: u8,
    /// Protocol minor version.
    pub version_minor: u8,
    /// Codec used for messages after the handshake.
    pub codec: CodecId,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            magic: *b"rpc",
            version_major: 1,
            version_minor: 0,
            codec: CodecId::Json,
        }
    }
}

impl HandshakeConfig {
    /// Set the protocol tag.
    #[must_use]
    pub const fn magic(mut self, magic: [u8; 3]) -> Self {
        self.magic = magic;
        self
    }

    /// Set the protocol version.
    #[must_use]
    pub const fn version(mut self, major: u8, minor: u8) -> Self {
        self.version_major = major;
        self.version_minor = minor;
        self
    }

    fn put_preamble(&self, buf: &mut BytesMut) {
        buf.put_slice(&self.magic);
        buf.put_u8(self.version_major);
        buf.put_u8(self.version_minor);
        buf.put_u8(self.codec.as_byte());
    }
}

/// Outcome of feeding bytes to the handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeProgress {
    /// The server hello has not fully arrived.
    Pending,
    /// The server hello was accepted. `ack` must be written before any
    /// queued message.
    Completed {
        /// Client ack to send.
        ack: Bytes,
    },
}

/// Client handshake state machine.
#[derive(Debug)]
pub struct ClientHandshake {
    config: HandshakeConfig,
    nonce: [u8; NONCE_LEN],
    state: HandshakeState,
}

impl ClientHandshake {
    /// Create a handshake with a fresh random nonce.
    #[must_use]
    pub fn new(config: HandshakeConfig) -> Self {
        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);
        Self::with_nonce(config, nonce)
    }

    /// Create a handshake with a fixed nonce.
    #[must_use]
    pub const fn with_nonce(config: HandshakeConfig, nonce: [u8; NONCE_LEN]) -> Self {
        Self {
            config,
            nonce,
            state: HandshakeState::NotStarted,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> HandshakeState {
        self.state
    }

    /// Our nonce.
    #[must_use]
    pub const fn nonce(&self) -> &[u8; NONCE_LEN] {
        &self.nonce
    }

    /// Handshake parameters.
    #[must_use]
    pub const fn config(&self) -> &HandshakeConfig {
        &self.config
    }

    /// Produce the client hello.
    ///
    /// # Errors
    ///
    /// Returns an error unless the handshake has not started yet.
    pub fn start(&mut self) -> Result<Bytes, HandshakeError> {
        if self.state != HandshakeState::NotStarted {
            return Err(HandshakeError::InvalidState(self.state));
        }
        let mut buf = BytesMut::with_capacity(CLIENT_HELLO_LEN);
        self.config.put_preamble(&mut buf);
        buf.put_slice(&self.nonce);
        self.state = HandshakeState::ClientHelloSent;
        Ok(buf.freeze())
    }

    /// Feed received bytes.
    ///
    /// On completion exactly the server hello is consumed from `buf`;
    /// whatever follows is message data. While pending nothing is consumed.
    ///
    /// # Errors
    ///
    /// Returns the first mismatch found, checked in the order magic,
    /// version, codec, echoed nonce. The handshake is then failed.
    pub fn on_data(&mut self, buf: &mut BytesMut) -> Result<HandshakeProgress, HandshakeError> {
        if self.state != HandshakeState::ClientHelloSent {
            return Err(HandshakeError::InvalidState(self.state));
        }
        if buf.len() < SERVER_HELLO_LEN {
            return Ok(HandshakeProgress::Pending);
        }

        let hello = buf.split_to(SERVER_HELLO_LEN);
        match self.verify(&hello) {
            Ok(ack) => {
                self.state = HandshakeState::Completed;
                Ok(HandshakeProgress::Completed { ack })
            }
            Err(err) => {
                self.state = HandshakeState::Failed;
                Err(err)
            }
        }
    }

    fn verify(&self, hello: &[u8]) -> Result<Bytes, HandshakeError> {
        let mut hello = hello;

        let mut magic = [0u8; 3];
        hello.copy_to_slice(&mut magic);
        if magic != self.config.magic {
            return Err(HandshakeError::BadMagic {
                expected: self.config.magic,
                actual: magic,
            });
        }

        let major = hello.get_u8();
        let minor = hello.get_u8();
        if major != self.config.version_major || minor != self.config.version_minor {
            return Err(HandshakeError::BadVersion {
                server_major: major,
                server_minor: minor,
                client_major: self.config.version_major,
                client_minor: self.config.version_minor,
            });
        }

        let codec = hello.get_u8();
        if codec != self.config.codec.as_byte() {
            return Err(HandshakeError::BadCodec {
                server: codec,
                client: self.config.codec.as_byte(),
            });
        }

        let (server_nonce, echoed) = hello.split_at(NONCE_LEN);
        if echoed != self.nonce {
            return Err(HandshakeError::BadClientNonce);
        }

        let mut ack = BytesMut::with_capacity(CLIENT_HELLO_LEN);
        self.config.put_preamble(&mut ack);
        ack.put_slice(server_nonce);
        Ok(ack.freeze())
    }
}
