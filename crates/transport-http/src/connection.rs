//! Request/response connection: one HTTP POST per call.

use crate::config::HttpConfig;
use crate::error::HttpError;
use async_trait::async_trait;
use callwire_rpc::dispatch::CallDispatcher;
use callwire_rpc::protocol::{Message, decode_message};
use callwire_rpc::{CodecId, ReplyStatus, TransportConnection};
use parking_lot::Mutex;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, instrument, warn};

/// Header announcing the codec of the request body.
pub const CODEC_HEADER: &str = "Rpc_Codec_Id";

struct Inner {
    client: Client,
    config: HttpConfig,
    dispatcher: CallDispatcher,
}

/// RPC connection over HTTP POST.
///
/// Each call is an independent exchange, so there is nothing to open and
/// a failed request only fails its own call.
pub struct HttpConnection {
    inner: Arc<Inner>,
    requests: Mutex<JoinSet<()>>,
}

impl HttpConnection {
    /// Create a connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: HttpConfig) -> Result<Self, HttpError> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self {
            inner: Arc::new(Inner {
                client,
                config,
                dispatcher: CallDispatcher::new(),
            }),
            requests: Mutex::new(JoinSet::new()),
        })
    }

    /// Endpoint URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.inner.config.url
    }

    /// Configuration in use.
    #[must_use]
    pub fn config(&self) -> &HttpConfig {
        &self.inner.config
    }
}

impl fmt::Debug for HttpConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpConnection")
            .field("url", &self.inner.config.url)
            .field("pending", &self.inner.dispatcher.pending_count())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl TransportConnection for HttpConnection {
    fn dispatcher(&self) -> &CallDispatcher {
        &self.inner.dispatcher
    }

    fn submit(&self, xid: u32, text: String) {
        let inner = Arc::clone(&self.inner);
        let mut requests = self.requests.lock();
        // Reap finished exchanges so the set does not grow.
        while requests.try_join_next().is_some() {}
        requests.spawn(async move {
            match inner.exchange(xid, text).await {
                Ok(msg) => inner.dispatcher.handle_message(msg),
                Err(err) => {
                    warn!(xid, url = %inner.config.url, error = %err, "http call failed");
                    inner.dispatcher.handle_error(&err.to_string(), Some(xid));
                }
            }
        });
    }

    #[instrument(skip(self), fields(url = %self.inner.config.url))]
    async fn close(&self) {
        let mut requests = std::mem::take(&mut *self.requests.lock());
        requests.abort_all();
        while requests.join_next().await.is_some() {}

        self.inner
            .dispatcher
            .handle_error(&ReplyStatus::ConnectionClosed.to_string(), None);
        debug!("connection closed");
    }

    fn is_open(&self) -> bool {
        true
    }

    fn default_deadline(&self) -> Option<Duration> {
        self.inner.config.default_deadline
    }
}

impl Drop for HttpConnection {
    fn drop(&mut self) {
        // Dropping the set aborts the exchanges still running.
        self.inner
            .dispatcher
            .handle_error(&ReplyStatus::ConnectionClosed.to_string(), None);
    }
}

impl Inner {
    async fn exchange(&self, xid: u32, text: String) -> Result<Message, HttpError> {
        debug!(xid, url = %self.config.url, "posting call");
        let response = self
            .client
            .post(&self.config.url)
            .header(CODEC_HEADER, CodecId::Json.as_byte().to_string())
            .header(CONTENT_TYPE, "application/json")
            .body(text)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(HttpError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        let msg = decode_message(&body).map_err(HttpError::Decode)?;
        if msg.xid != xid {
            return Err(HttpError::XidMismatch {
                expected: xid,
                actual: msg.xid,
            });
        }
        Ok(msg)
    }
}
