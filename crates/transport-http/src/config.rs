//! HTTP connection configuration.

use std::time::Duration;

/// Configuration for an [`HttpConnection`](crate::HttpConnection).
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Endpoint every call is POSTed to.
    pub url: String,
    /// Timeout of one HTTP exchange.
    pub request_timeout: Duration,
    /// Deadline applied to calls made without an explicit one.
    pub default_deadline: Option<Duration>,
}

impl HttpConfig {
    /// Configuration for `url` with default timeouts.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            request_timeout: Duration::from_secs(30),
            default_deadline: None,
        }
    }

    /// Set the request timeout.
    #[must_use]
    pub const fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the default call deadline.
    #[must_use]
    pub const fn default_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.default_deadline = deadline;
        self
    }
}
