//! Persistent stream connection.
//!
//! The connection opens lazily on the first call. Calls made while the
//! stream is connecting or handshaking are queued and written in order
//! right after the handshake ack. Any stream failure fails every pending
//! call and returns the connection to idle; the next call reconnects.

use crate::config::StreamConfig;
use crate::connector::Connector;
use crate::error::StreamError;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use callwire_rpc::dispatch::{CallDispatcher, ILLEGAL_MESSAGE};
use callwire_rpc::protocol::handshake::{ClientHandshake, HandshakeProgress, NONCE_LEN};
use callwire_rpc::protocol::{JsonFrameCodec, message_from_value};
use callwire_rpc::{HandshakeState, ReplyStatus, TransportConnection, Value};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::codec::{Framed, FramedParts};
use tracing::{debug, info, instrument, warn};

/// Lifecycle of the underlying stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No stream.
    Idle,
    /// Waiting for the connector.
    Connecting,
    /// Stream open, handshake in progress.
    Handshaking,
    /// Handshake done, calls are written directly.
    Open,
}

struct State {
    phase: Phase,
    handshake: HandshakeState,
    /// Bumped on every start and teardown so a stale task cannot touch a
    /// newer stream.
    generation: u64,
    outbuf: VecDeque<Bytes>,
    writer: Option<mpsc::UnboundedSender<Bytes>>,
    /// Set while `close` is tearing down; calls submitted meanwhile fail.
    closing: bool,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl State {
    fn reset(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        self.phase = Phase::Idle;
        self.outbuf.clear();
        self.writer = None;
    }
}

struct Inner<C> {
    connector: C,
    config: StreamConfig,
    nonce: Option<[u8; NONCE_LEN]>,
    dispatcher: CallDispatcher,
    state: Mutex<State>,
}

/// RPC connection over a persistent byte stream.
pub struct StreamConnection<C: Connector> {
    inner: Arc<Inner<C>>,
}

impl<C: Connector> StreamConnection<C> {
    /// Create an idle connection.
    #[must_use]
    pub fn new(connector: C, config: StreamConfig) -> Self {
        Self::build(connector, config, None)
    }

    /// Create an idle connection that always uses `nonce` in its handshake.
    #[must_use]
    pub fn with_nonce(connector: C, config: StreamConfig, nonce: [u8; NONCE_LEN]) -> Self {
        Self::build(connector, config, Some(nonce))
    }

    fn build(connector: C, config: StreamConfig, nonce: Option<[u8; NONCE_LEN]>) -> Self {
        Self {
            inner: Arc::new(Inner {
                connector,
                config,
                nonce,
                dispatcher: CallDispatcher::new(),
                state: Mutex::new(State {
                    phase: Phase::Idle,
                    handshake: HandshakeState::NotStarted,
                    generation: 0,
                    outbuf: VecDeque::new(),
                    writer: None,
                    closing: false,
                    shutdown: None,
                    task: None,
                }),
            }),
        }
    }

    /// Start connecting if idle. Must be called within a tokio runtime.
    pub fn open(&self) {
        let mut state = self.inner.state.lock();
        if state.phase == Phase::Idle {
            Inner::start(&self.inner, &mut state);
        }
    }

    /// Current stream phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.inner.state.lock().phase
    }

    /// Handshake state of the current, or last, stream.
    #[must_use]
    pub fn handshake_state(&self) -> HandshakeState {
        self.inner.state.lock().handshake
    }

    /// Number of calls waiting for the handshake.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.inner.state.lock().outbuf.len()
    }

    /// Configuration in use.
    #[must_use]
    pub fn config(&self) -> &StreamConfig {
        &self.inner.config
    }
}

impl<C: Connector> fmt::Debug for StreamConnection<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamConnection")
            .field("peer", &self.inner.connector.peer())
            .field("phase", &self.phase())
            .field("pending", &self.inner.dispatcher.pending_count())
            .finish()
    }
}

#[async_trait]
impl<C: Connector> TransportConnection for StreamConnection<C> {
    fn dispatcher(&self) -> &CallDispatcher {
        &self.inner.dispatcher
    }

    fn submit(&self, xid: u32, text: String) {
        let mut state = self.inner.state.lock();
        if state.closing {
            drop(state);
            debug!(xid, "connection closing, failing call");
            self.inner
                .dispatcher
                .handle_error(&ReplyStatus::ConnectionClosed.to_string(), Some(xid));
            return;
        }

        let msg = Bytes::from(text);

        if state.phase == Phase::Open {
            if let Some(writer) = &state.writer {
                if writer.send(msg).is_err() {
                    // The stream task is exiting and will fail this call.
                    debug!(xid, "stream writer gone");
                }
                return;
            }
        }

        debug!(xid, phase = ?state.phase, "queueing call until handshake completes");
        state.outbuf.push_back(msg);
        if state.phase == Phase::Idle {
            Inner::start(&self.inner, &mut state);
        }
    }

    #[instrument(skip(self), fields(peer = %self.inner.connector.peer()))]
    async fn close(&self) {
        let (shutdown, task) = {
            let mut state = self.inner.state.lock();
            state.reset();
            state.closing = true;
            (state.shutdown.take(), state.task.take())
        };

        if let Some(shutdown) = shutdown {
            let _ = shutdown.send(());
        }
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!("stream task ended abnormally: {}", e);
            }
        }

        self.inner
            .dispatcher
            .handle_error(&ReplyStatus::ConnectionClosed.to_string(), None);
        self.inner.state.lock().closing = false;
        debug!("connection closed");
    }

    fn is_open(&self) -> bool {
        self.phase() == Phase::Open
    }

    fn default_deadline(&self) -> Option<Duration> {
        self.inner.config.default_deadline
    }
}

impl<C: Connector> Drop for StreamConnection<C> {
    fn drop(&mut self) {
        let shutdown = {
            let mut state = self.inner.state.lock();
            state.reset();
            state.task = None;
            state.shutdown.take()
        };
        if let Some(shutdown) = shutdown {
            let _ = shutdown.send(());
        }
        self.inner
            .dispatcher
            .handle_error(&ReplyStatus::ConnectionClosed.to_string(), None);
    }
}

impl<C: Connector> Inner<C> {
    fn start(this: &Arc<Self>, state: &mut State) {
        state.generation = state.generation.wrapping_add(1);
        state.phase = Phase::Connecting;
        state.handshake = HandshakeState::NotStarted;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        state.shutdown = Some(shutdown_tx);
        state.task = Some(tokio::spawn(run(
            Arc::clone(this),
            state.generation,
            shutdown_rx,
        )));
        debug!(peer = %this.connector.peer(), generation = state.generation, "connecting");
    }

    /// Record progress of stream `generation`. Returns `false` if it is stale.
    fn advance(&self, generation: u64, phase: Phase, handshake: HandshakeState) -> bool {
        let mut state = self.state.lock();
        if state.generation != generation {
            return false;
        }
        state.phase = phase;
        state.handshake = handshake;
        true
    }

    /// Switch to direct writes, moving queued calls into the writer first.
    fn mark_open(&self, generation: u64) -> Option<mpsc::UnboundedReceiver<Bytes>> {
        let mut state = self.state.lock();
        if state.generation != generation {
            return None;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        for msg in state.outbuf.drain(..) {
            let _ = tx.send(msg);
        }
        state.writer = Some(tx);
        state.phase = Phase::Open;
        state.handshake = HandshakeState::Completed;
        Some(rx)
    }

    /// Tear stream `generation` down and fail every pending call.
    fn fail(&self, generation: u64, err: &StreamError) {
        {
            let mut state = self.state.lock();
            if state.generation != generation {
                return;
            }
            state.reset();
            state.shutdown = None;
            state.task = None;
        }

        warn!(peer = %self.connector.peer(), error = %err, "stream connection failed");
        self.dispatcher.handle_error(&err.to_string(), None);
    }

    fn handle_frame(&self, frame: &[u8]) -> Result<(), StreamError> {
        let value =
            callwire_rpc::decode_slice(frame).map_err(|e| StreamError::Decode(e.into()))?;
        let xid = value
            .get("header")
            .and_then(|header| header.get("xid"))
            .and_then(Value::as_u32);

        match message_from_value(value) {
            Ok(msg) => self.dispatcher.handle_message(msg),
            Err(e) => match xid {
                Some(xid) => {
                    warn!(xid, error = %e, "malformed message from server");
                    self.dispatcher.handle_error(ILLEGAL_MESSAGE, Some(xid));
                }
                None => return Err(StreamError::Decode(e)),
            },
        }
        Ok(())
    }
}

async fn run<C: Connector>(
    inner: Arc<Inner<C>>,
    generation: u64,
    mut shutdown: oneshot::Receiver<()>,
) {
    let result = tokio::select! {
        result = drive(&inner, generation) => result,
        _ = &mut shutdown => {
            debug!(generation, "stream task shut down");
            return;
        }
    };

    if let Err(err) = result {
        inner.fail(generation, &err);
    }
}

async fn drive<C: Connector>(inner: &Inner<C>, generation: u64) -> Result<(), StreamError> {
    let addr = inner.connector.peer();
    let timeout = inner.config.connect_timeout;
    let mut io = tokio::time::timeout(timeout, inner.connector.connect())
        .await
        .map_err(|_| StreamError::ConnectTimeout {
            addr: addr.clone(),
            timeout,
        })?
        .map_err(|source| StreamError::Connect {
            addr: addr.clone(),
            source,
        })?;

    let mut handshake = match inner.nonce {
        Some(nonce) => ClientHandshake::with_nonce(inner.config.handshake.clone(), nonce),
        None => ClientHandshake::new(inner.config.handshake.clone()),
    };
    let hello = handshake.start()?;
    if !inner.advance(generation, Phase::Handshaking, handshake.state()) {
        return Ok(());
    }
    debug!(%addr, "connected, sending client hello");
    io.write_all(&hello).await?;

    let mut inbuf = BytesMut::with_capacity(4096);
    let ack = loop {
        match handshake.on_data(&mut inbuf) {
            Ok(HandshakeProgress::Completed { ack }) => break ack,
            Ok(HandshakeProgress::Pending) => {}
            Err(e) => {
                inner.advance(generation, Phase::Handshaking, handshake.state());
                return Err(e.into());
            }
        }
        if io.read_buf(&mut inbuf).await? == 0 {
            return Err(StreamError::RemoteClosed);
        }
    };
    io.write_all(&ack).await?;

    let Some(mut outgoing) = inner.mark_open(generation) else {
        return Ok(());
    };
    info!(%addr, "handshake completed");

    // Bytes that followed the server hello are the start of the first reply.
    let codec = JsonFrameCodec::new().with_max_frame_size(inner.config.max_frame_size);
    let mut parts = FramedParts::new::<Bytes>(io, codec);
    parts.read_buf = inbuf;
    let (mut sink, mut frames) = Framed::from_parts(parts).split();

    loop {
        tokio::select! {
            msg = outgoing.recv() => {
                let Some(msg) = msg else {
                    return Ok(());
                };
                sink.send(msg).await?;
            }
            frame = frames.next() => match frame {
                Some(Ok(frame)) => inner.handle_frame(&frame)?,
                Some(Err(e)) => return Err(StreamError::from_read(e)),
                None => return Err(StreamError::RemoteClosed),
            },
        }
    }
}
