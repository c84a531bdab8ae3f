//! Transport layer for the RPC client.
//!
//! Every transport implements [`TransportConnection`] on top of a shared
//! [`CallDispatcher`]; the call surfaces are provided methods, so a
//! transport only has to move encoded calls out and feed decoded replies
//! back in.

pub mod manager;

pub use manager::{ConnectionHandle, ConnectionManager};

use crate::codec::Value;
use crate::dispatch::{CallDispatcher, CompletionCallback, channel_callback, wait_for_outcome};
use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

/// A connection to one RPC server.
#[async_trait]
pub trait TransportConnection: Send + Sync {
    /// The pending-call table owned by this connection.
    fn dispatcher(&self) -> &CallDispatcher;

    /// Hand an encoded call to the transport.
    ///
    /// Never blocks on the network. Calls submitted before the transport is
    /// ready are queued and sent in order once it is. Transport failures are
    /// reported through [`CallDispatcher::handle_error`].
    ///
    /// # Panics
    ///
    /// Implementations spawn tasks and may panic outside a tokio runtime.
    fn submit(&self, xid: u32, text: String);

    /// Tear the connection down, failing every pending call with
    /// `connection closed`.
    async fn close(&self);

    /// Whether the transport can currently carry calls without queueing.
    fn is_open(&self) -> bool;

    /// Deadline applied to calls made without an explicit one.
    fn default_deadline(&self) -> Option<Duration> {
        None
    }

    /// Issue a call and return immediately, using the default deadline.
    ///
    /// `on_complete` runs exactly once: on the reply, on a transport
    /// failure, on teardown or with `query timeout` when the deadline
    /// expires first.
    ///
    /// # Errors
    ///
    /// Returns an error if the call is rejected before being registered.
    /// `on_complete` is not run in that case.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    fn call_with_callback(
        &self,
        service: &str,
        method: &str,
        params: Value,
        on_complete: CompletionCallback,
    ) -> Result<u32> {
        self.call_with_callback_deadline(
            service,
            method,
            params,
            on_complete,
            self.default_deadline(),
        )
    }

    /// Issue a call with an explicit deadline and return immediately.
    ///
    /// # Errors
    ///
    /// See [`TransportConnection::call_with_callback`].
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    fn call_with_callback_deadline(
        &self,
        service: &str,
        method: &str,
        params: Value,
        on_complete: CompletionCallback,
        deadline: Option<Duration>,
    ) -> Result<u32> {
        let (xid, text) = self
            .dispatcher()
            .prepare_call(service, method, params, on_complete)?;
        if let Some(deadline) = deadline {
            self.dispatcher().expire_after(xid, deadline);
        }
        self.submit(xid, text);
        Ok(xid)
    }

    /// Issue a call and wait for its result, using the default deadline.
    ///
    /// # Errors
    ///
    /// Returns an error if the call is rejected or does not succeed.
    async fn call(&self, service: &str, method: &str, params: Value) -> Result<Value> {
        self.call_with_deadline(service, method, params, self.default_deadline())
            .await
    }

    /// Issue a call and wait for its result.
    ///
    /// # Errors
    ///
    /// Returns an error if the call is rejected, does not succeed, or the
    /// deadline expires first (`query timeout`).
    async fn call_with_deadline(
        &self,
        service: &str,
        method: &str,
        params: Value,
        deadline: Option<Duration>,
    ) -> Result<Value> {
        let (on_complete, rx) = channel_callback();
        let xid =
            self.call_with_callback_deadline(service, method, params, on_complete, None)?;
        wait_for_outcome(self.dispatcher(), xid, rx, deadline).await
    }
}
