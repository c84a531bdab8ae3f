//! Pending-call table.
//!
//! A [`CallDispatcher`] allocates transaction ids, remembers the completion
//! callback of every call in flight and routes each reply, or each
//! transport failure, to the right callback exactly once.

use crate::codec::Value;
use crate::error::{ConnectionError, Error, ProtocolError, Result};
use crate::protocol::message::{Message, MessageBody, encode_message};
use crate::protocol::status::ReplyStatus;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Description given to calls answered with something other than a reply.
pub const ILLEGAL_MESSAGE: &str = "illegal message from server";

/// Success flag and failure description handed to a completion callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallStatus {
    /// Whether the call succeeded.
    pub success: bool,
    /// Failure description. `None` on success.
    pub error: Option<String>,
}

impl CallStatus {
    /// Successful completion.
    #[must_use]
    pub const fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    /// Failed completion.
    #[must_use]
    pub fn failed(description: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(description.into()),
        }
    }
}

/// Callback run once when a call completes. Per-call context travels in
/// the closure's captures.
pub type CompletionCallback = Box<dyn FnOnce(CallStatus, Value) + Send + 'static>;

struct PendingCall {
    /// Registration number, distinguishing reuses of one xid.
    seq: u64,
    on_complete: CompletionCallback,
}

impl fmt::Debug for PendingCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingCall").finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
struct Table {
    next_xid: u32,
    next_seq: u64,
    pending: HashMap<u32, PendingCall>,
}

impl Table {
    fn insert(&mut self, xid: u32, on_complete: CompletionCallback) {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        self.pending.insert(xid, PendingCall { seq, on_complete });
    }
}

/// Correlates outgoing calls with incoming replies.
#[derive(Debug, Default)]
pub struct CallDispatcher {
    table: Arc<Mutex<Table>>,
}

impl CallDispatcher {
    /// Create an empty dispatcher. Transaction ids start at 0.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate, register and encode a call.
    ///
    /// Returns the assigned transaction id and the wire text to transmit.
    /// The callback is registered before this returns, so a reply can
    /// never arrive ahead of its entry.
    ///
    /// # Errors
    ///
    /// Returns an error if `service` or `method` is empty (no id is
    /// consumed) or if the next id is still in flight.
    pub fn prepare_call(
        &self,
        service: &str,
        method: &str,
        params: Value,
        on_complete: CompletionCallback,
    ) -> Result<(u32, String)> {
        if service.is_empty() {
            return Err(ProtocolError::InvalidCall("empty service name".to_string()).into());
        }
        if method.is_empty() {
            return Err(ProtocolError::InvalidCall("empty method name".to_string()).into());
        }

        let xid = {
            let mut table = self.table.lock();
            let xid = table.next_xid;
            table.next_xid = table.next_xid.wrapping_add(1);
            if table.pending.contains_key(&xid) {
                return Err(ConnectionError::DuplicateTransaction(xid).into());
            }
            table.insert(xid, on_complete);
            xid
        };

        let text = encode_message(&Message::call(xid, service, method, params));
        debug!(xid, service, method, "registered call");
        Ok((xid, text))
    }

    /// Register a callback under an explicit transaction id.
    ///
    /// # Errors
    ///
    /// Returns an error if `xid` is already in flight; the existing entry
    /// is left untouched.
    pub fn register(&self, xid: u32, on_complete: CompletionCallback) -> Result<()> {
        let mut table = self.table.lock();
        if table.pending.contains_key(&xid) {
            return Err(ConnectionError::DuplicateTransaction(xid).into());
        }
        table.insert(xid, on_complete);
        Ok(())
    }

    /// Route an incoming message to its pending call.
    ///
    /// Messages for unknown transaction ids are logged and dropped.
    pub fn handle_message(&self, msg: Message) {
        let Some(call) = self.table.lock().pending.remove(&msg.xid) else {
            warn!(xid = msg.xid, "discarding message for unknown transaction");
            return;
        };

        match msg.body {
            MessageBody::Reply(reply) if reply.status == ReplyStatus::Success => {
                debug!(xid = msg.xid, "call succeeded");
                (call.on_complete)(CallStatus::ok(), reply.result);
            }
            MessageBody::Reply(reply) => {
                debug!(xid = msg.xid, status = %reply.status, "call failed");
                (call.on_complete)(
                    CallStatus::failed(format!("server error: {}", reply.status)),
                    reply.result,
                );
            }
            MessageBody::Call(_) => {
                warn!(xid = msg.xid, "server sent a call instead of a reply");
                (call.on_complete)(CallStatus::failed(ILLEGAL_MESSAGE), Value::Null);
            }
        }
    }

    /// Fail one call, or every call when `xid` is `None`.
    ///
    /// An unknown `xid` is a no-op. Failing every call empties the table.
    pub fn handle_error(&self, description: &str, xid: Option<u32>) {
        let failed: Vec<PendingCall> = {
            let mut table = self.table.lock();
            match xid {
                Some(xid) => table.pending.remove(&xid).into_iter().collect(),
                None => table.pending.drain().map(|(_, call)| call).collect(),
            }
        };

        if !failed.is_empty() {
            debug!(count = failed.len(), description, "failing pending calls");
        }
        for call in failed {
            (call.on_complete)(CallStatus::failed(description), Value::Null);
        }
    }

    /// Fail call `xid` with `query timeout` once `deadline` elapses.
    ///
    /// The timer does nothing if the call completes first, if a later call
    /// has reused the id, or if the dispatcher is gone by then.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn expire_after(&self, xid: u32, deadline: Duration) {
        let Some(seq) = self.table.lock().pending.get(&xid).map(|call| call.seq) else {
            return;
        };
        let table = Arc::downgrade(&self.table);
        tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            let Some(table) = table.upgrade() else {
                return;
            };
            let expired = {
                let mut table = table.lock();
                match table.pending.get(&xid) {
                    Some(call) if call.seq == seq => table.pending.remove(&xid),
                    _ => None,
                }
            };
            if let Some(call) = expired {
                debug!(xid, ?deadline, "call deadline expired");
                (call.on_complete)(
                    CallStatus::failed(ReplyStatus::QueryTimeout.to_string()),
                    Value::Null,
                );
            }
        });
    }

    /// Whether `xid` is in flight.
    #[must_use]
    pub fn is_pending(&self, xid: u32) -> bool {
        self.table.lock().pending.contains_key(&xid)
    }

    /// Number of calls in flight.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.table.lock().pending.len()
    }

    /// Transaction id the next call will get.
    #[must_use]
    pub fn next_xid(&self) -> u32 {
        self.table.lock().next_xid
    }

    /// Set the transaction id the next call will get.
    pub fn set_next_xid(&self, xid: u32) {
        self.table.lock().next_xid = xid;
    }
}

/// Outcome delivered to an async caller.
pub type CallOutcome = (CallStatus, Value);

/// Completion callback that forwards the outcome into a oneshot channel.
#[must_use]
pub fn channel_callback() -> (CompletionCallback, oneshot::Receiver<CallOutcome>) {
    let (tx, rx) = oneshot::channel();
    let callback: CompletionCallback = Box::new(move |status, result| {
        // The caller may have stopped waiting.
        let _ = tx.send((status, result));
    });
    (callback, rx)
}

/// Wait for the outcome of call `xid`.
///
/// When `deadline` elapses first the call is failed locally with
/// `query timeout`; a reply arriving later is discarded as unknown.
///
/// # Errors
///
/// Returns [`Error::CallFailed`] with the failure description, or
/// [`Error::ChannelClosed`] if the callback was dropped uninvoked.
pub async fn wait_for_outcome(
    dispatcher: &CallDispatcher,
    xid: u32,
    mut rx: oneshot::Receiver<CallOutcome>,
    deadline: Option<Duration>,
) -> Result<Value> {
    let outcome = match deadline {
        Some(deadline) => match tokio::time::timeout(deadline, &mut rx).await {
            Ok(outcome) => outcome,
            Err(_) => {
                debug!(xid, ?deadline, "call deadline expired");
                dispatcher.handle_error(&ReplyStatus::QueryTimeout.to_string(), Some(xid));
                rx.await
            }
        },
        None => rx.await,
    };

    let (status, result) = outcome.map_err(|_| Error::ChannelClosed)?;
    if status.success {
        Ok(result)
    } else {
        Err(Error::CallFailed(status.error.unwrap_or_default()))
    }
}
