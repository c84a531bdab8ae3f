//! Stream connection configuration.

use callwire_rpc::HandshakeConfig;
use callwire_rpc::protocol::MAX_FRAME_SIZE;
use std::time::Duration;

/// Configuration for a [`StreamConnection`](crate::StreamConnection).
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Handshake parameters.
    pub handshake: HandshakeConfig,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Largest message accepted from the server.
    pub max_frame_size: usize,
    /// Deadline applied to calls made without an explicit one.
    pub default_deadline: Option<Duration>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            handshake: HandshakeConfig::default(),
            connect_timeout: Duration::from_secs(5),
            max_frame_size: MAX_FRAME_SIZE,
            default_deadline: None,
        }
    }
}

impl StreamConfig {
    /// Set the handshake parameters.
    #[must_use]
    pub fn handshake(mut self, handshake: HandshakeConfig) -> Self {
        self.handshake = handshake;
        self
    }

    /// Set the connection timeout.
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the maximum frame size.
    #[must_use]
    pub const fn max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }

    /// Set the default call deadline.
    #[must_use]
    pub const fn default_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.default_deadline = deadline;
        self
    }
}
