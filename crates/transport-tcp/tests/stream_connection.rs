//! End-to-end tests for the stream connection against a scripted server.

use async_trait::async_trait;
use bytes::BytesMut;
use callwire_rpc::protocol::{
    Message, MessageBody, ReplyStatus, ScanResult, decode_message, encode_message, scan,
};
use callwire_rpc::{CallStatus, Error, HandshakeState, TransportConnection, Value};
use callwire_transport_tcp::{Connector, Phase, StreamConfig, StreamConnection};
use pretty_assertions::assert_eq;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

const CLIENT_NONCE: [u8; 32] = [3; 32];
const SERVER_NONCE: [u8; 32] = [4; 32];
const PREAMBLE: &[u8; 6] = b"rpc\x01\x00\x02";

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Hands the server half of a fresh duplex pipe to the test on every connect.
struct DuplexConnector {
    servers: mpsc::UnboundedSender<DuplexStream>,
}

#[async_trait]
impl Connector for DuplexConnector {
    type Stream = DuplexStream;

    async fn connect(&self) -> io::Result<DuplexStream> {
        let (client, server) = tokio::io::duplex(64 * 1024);
        self.servers
            .send(server)
            .map_err(|_| io::Error::new(io::ErrorKind::ConnectionRefused, "no server"))?;
        Ok(client)
    }

    fn peer(&self) -> String {
        "duplex".to_string()
    }
}

type Conn = Arc<StreamConnection<DuplexConnector>>;

fn connection() -> (Conn, mpsc::UnboundedReceiver<DuplexStream>) {
    connection_with(StreamConfig::default())
}

fn connection_with(config: StreamConfig) -> (Conn, mpsc::UnboundedReceiver<DuplexStream>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let conn = StreamConnection::with_nonce(DuplexConnector { servers: tx }, config, CLIENT_NONCE);
    (Arc::new(conn), rx)
}

type Outcomes = mpsc::UnboundedReceiver<(usize, CallStatus, Value)>;

fn call_tagged(
    conn: &Conn,
    tx: &mpsc::UnboundedSender<(usize, CallStatus, Value)>,
    tag: usize,
    method: &str,
) -> u32 {
    let tx = tx.clone();
    conn.call_with_callback(
        "Calculator",
        method,
        Value::from(vec![tag as i64]),
        Box::new(move |status, result| {
            let _ = tx.send((tag, status, result));
        }),
    )
    .unwrap()
}

fn server_hello(echo: &[u8]) -> Vec<u8> {
    let mut hello = PREAMBLE.to_vec();
    hello.extend_from_slice(&SERVER_NONCE);
    hello.extend_from_slice(echo);
    hello
}

struct Server<S> {
    io: S,
    buf: BytesMut,
}

impl<S: AsyncRead + AsyncWrite + Unpin> Server<S> {
    fn new(io: S) -> Self {
        Self {
            io,
            buf: BytesMut::new(),
        }
    }

    async fn read_client_hello(&mut self) -> [u8; 38] {
        let mut hello = [0u8; 38];
        self.io.read_exact(&mut hello).await.unwrap();
        assert_eq!(&hello[..6], PREAMBLE);
        hello
    }

    async fn read_ack(&mut self) {
        let mut ack = [0u8; 38];
        self.io.read_exact(&mut ack).await.unwrap();
        assert_eq!(&ack[..6], PREAMBLE);
        assert_eq!(&ack[6..], &SERVER_NONCE);
    }

    async fn accept(&mut self) {
        let hello = self.read_client_hello().await;
        self.io.write_all(&server_hello(&hello[6..])).await.unwrap();
        self.read_ack().await;
    }

    async fn read_message(&mut self) -> Message {
        loop {
            if let ScanResult::Complete(len) = scan(&self.buf) {
                let frame = self.buf.split_to(len);
                return decode_message(std::str::from_utf8(&frame).unwrap()).unwrap();
            }
            let n = self.io.read_buf(&mut self.buf).await.unwrap();
            assert!(n > 0, "client closed the stream");
        }
    }

    async fn reply(&mut self, xid: u32, status: ReplyStatus, result: Value) {
        let text = encode_message(&Message::reply(xid, status, result));
        self.io.write_all(text.as_bytes()).await.unwrap();
    }

    /// Answer one call with its first parameter.
    async fn mirror(&mut self) -> Message {
        let msg = self.read_message().await;
        let MessageBody::Call(call) = &msg.body else {
            panic!("expected a call, got {msg:?}");
        };
        let result = call.params.as_array().unwrap()[0].clone();
        self.reply(msg.xid, ReplyStatus::Success, result).await;
        msg
    }
}

#[tokio::test]
async fn test_call_after_handshake() {
    init_tracing();
    let (conn, mut servers) = connection();

    let caller = {
        let conn = Arc::clone(&conn);
        tokio::spawn(async move {
            conn.call("Calculator", "MirrorInt", Value::from(vec![7]))
                .await
        })
    };

    let mut server = Server::new(servers.recv().await.unwrap());
    server.accept().await;
    let msg = server.mirror().await;

    let MessageBody::Call(call) = msg.body else {
        panic!("expected a call");
    };
    assert_eq!(call.service, "Calculator");
    assert_eq!(call.method, "MirrorInt");
    assert_eq!(caller.await.unwrap().unwrap(), Value::Int(7));
    assert!(conn.is_open());
    assert_eq!(conn.handshake_state(), HandshakeState::Completed);
}

#[tokio::test]
async fn test_calls_queued_during_handshake_flush_in_order() {
    init_tracing();
    let (conn, mut servers) = connection();
    let (tx, mut outcomes): (_, Outcomes) = mpsc::unbounded_channel();

    for tag in 0..3 {
        call_tagged(&conn, &tx, tag, &format!("m{tag}"));
    }
    assert_eq!(conn.queued(), 3);
    assert!(!conn.is_open());

    let mut server = Server::new(servers.recv().await.unwrap());
    server.accept().await;

    let mut received = Vec::new();
    for _ in 0..3 {
        received.push(server.read_message().await);
    }
    for (expected, msg) in received.iter().enumerate() {
        assert_eq!(msg.xid as usize, expected);
        let MessageBody::Call(call) = &msg.body else {
            panic!("expected a call");
        };
        assert_eq!(call.method, format!("m{expected}"));
    }

    // Replies may come back in any order.
    for msg in received.iter().rev() {
        server
            .reply(msg.xid, ReplyStatus::Success, Value::from(i64::from(msg.xid) * 10))
            .await;
    }

    let mut results = Vec::new();
    for _ in 0..3 {
        let (tag, status, result) = outcomes.recv().await.unwrap();
        assert_eq!(status, CallStatus::ok());
        results.push((tag, result));
    }
    results.sort_by_key(|(tag, _)| *tag);
    assert_eq!(
        results,
        vec![
            (0, Value::Int(0)),
            (1, Value::Int(10)),
            (2, Value::Int(20))
        ]
    );
    assert_eq!(conn.queued(), 0);
}

#[tokio::test]
async fn test_reply_arriving_with_server_hello() {
    init_tracing();
    let (conn, mut servers) = connection();

    let caller = {
        let conn = Arc::clone(&conn);
        tokio::spawn(async move { conn.call("s", "m", Value::Null).await })
    };

    let mut server = Server::new(servers.recv().await.unwrap());
    let hello = server.read_client_hello().await;
    let mut segment = server_hello(&hello[6..]);
    segment.extend_from_slice(
        encode_message(&Message::reply(0, ReplyStatus::Success, Value::from("early"))).as_bytes(),
    );
    server.io.write_all(&segment).await.unwrap();
    server.read_ack().await;

    assert_eq!(caller.await.unwrap().unwrap(), Value::from("early"));
}

#[tokio::test]
async fn test_bad_client_hand_fails_pending_calls() {
    init_tracing();
    let (conn, mut servers) = connection();
    let (tx, mut outcomes): (_, Outcomes) = mpsc::unbounded_channel();
    call_tagged(&conn, &tx, 0, "m");
    call_tagged(&conn, &tx, 1, "m");

    let mut server = Server::new(servers.recv().await.unwrap());
    server.read_client_hello().await;
    server.io.write_all(&server_hello(&[0; 32])).await.unwrap();

    for _ in 0..2 {
        let (_, status, result) = outcomes.recv().await.unwrap();
        assert_eq!(status, CallStatus::failed("handshake failed: bad client hand"));
        assert_eq!(result, Value::Null);
    }
    assert_eq!(conn.handshake_state(), HandshakeState::Failed);
    assert_eq!(conn.phase(), Phase::Idle);
    assert_eq!(conn.dispatcher().pending_count(), 0);
}

#[tokio::test]
async fn test_bad_version_names_both_versions() {
    init_tracing();
    let (conn, mut servers) = connection();
    let (tx, mut outcomes): (_, Outcomes) = mpsc::unbounded_channel();
    call_tagged(&conn, &tx, 0, "m");

    let mut server = Server::new(servers.recv().await.unwrap());
    let hello = server.read_client_hello().await;
    let mut reply = server_hello(&hello[6..]);
    reply[3] = 2;
    server.io.write_all(&reply).await.unwrap();

    let (_, status, _) = outcomes.recv().await.unwrap();
    assert_eq!(
        status.error.as_deref(),
        Some("handshake failed: bad version, server is: 2.0 , we are: 1.0")
    );
}

#[tokio::test]
async fn test_framing_error_fans_out() {
    init_tracing();
    let (conn, mut servers) = connection();
    let (tx, mut outcomes): (_, Outcomes) = mpsc::unbounded_channel();
    call_tagged(&conn, &tx, 0, "m");
    call_tagged(&conn, &tx, 1, "m");

    let mut server = Server::new(servers.recv().await.unwrap());
    server.accept().await;
    server.read_message().await;
    server.read_message().await;
    server.io.write_all(b"garbage").await.unwrap();

    for _ in 0..2 {
        let (_, status, _) = outcomes.recv().await.unwrap();
        assert!(!status.success);
        assert!(
            status.error.as_deref().unwrap().starts_with("framing error"),
            "{status:?}"
        );
    }
    assert_eq!(conn.phase(), Phase::Idle);
}

#[tokio::test]
async fn test_malformed_reply_fails_only_its_call() {
    init_tracing();
    let (conn, mut servers) = connection();
    let (tx, mut outcomes): (_, Outcomes) = mpsc::unbounded_channel();
    call_tagged(&conn, &tx, 0, "m");
    call_tagged(&conn, &tx, 1, "m");

    let mut server = Server::new(servers.recv().await.unwrap());
    server.accept().await;
    server.read_message().await;
    server.read_message().await;
    server
        .io
        .write_all(br#"{"header" : {"xid" : 0, "msgType" : 1}}"#)
        .await
        .unwrap();

    let (tag, status, _) = outcomes.recv().await.unwrap();
    assert_eq!(tag, 0);
    assert_eq!(status, CallStatus::failed("illegal message from server"));

    server.reply(1, ReplyStatus::Success, Value::Int(1)).await;
    let (tag, status, result) = outcomes.recv().await.unwrap();
    assert_eq!((tag, status, result), (1, CallStatus::ok(), Value::Int(1)));
    assert!(conn.is_open());
}

#[tokio::test]
async fn test_server_error_status() {
    init_tracing();
    let (conn, mut servers) = connection();

    let caller = {
        let conn = Arc::clone(&conn);
        tokio::spawn(async move { conn.call("Nope", "m", Value::Null).await })
    };

    let mut server = Server::new(servers.recv().await.unwrap());
    server.accept().await;
    let msg = server.read_message().await;
    server
        .reply(msg.xid, ReplyStatus::ServiceUnavailable, Value::Null)
        .await;

    match caller.await.unwrap() {
        Err(Error::CallFailed(desc)) => assert_eq!(desc, "server error: no such service"),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn test_remote_close_fans_out() {
    init_tracing();
    let (conn, mut servers) = connection();
    let (tx, mut outcomes): (_, Outcomes) = mpsc::unbounded_channel();
    call_tagged(&conn, &tx, 0, "m");

    let mut server = Server::new(servers.recv().await.unwrap());
    server.accept().await;
    server.read_message().await;
    drop(server);

    let (_, status, _) = outcomes.recv().await.unwrap();
    assert_eq!(status, CallStatus::failed("connection closed by server"));
}

#[tokio::test]
async fn test_close_then_reconnect() {
    init_tracing();
    let (conn, mut servers) = connection();
    let (tx, mut outcomes): (_, Outcomes) = mpsc::unbounded_channel();
    call_tagged(&conn, &tx, 0, "m");

    let mut first = Server::new(servers.recv().await.unwrap());
    first.accept().await;
    first.read_message().await;

    conn.close().await;
    let (_, status, _) = outcomes.recv().await.unwrap();
    assert_eq!(status, CallStatus::failed("connection closed"));
    assert_eq!(conn.phase(), Phase::Idle);

    // The next call opens a new stream and numbering continues.
    let xid = call_tagged(&conn, &tx, 1, "m");
    assert_eq!(xid, 1);
    let mut second = Server::new(servers.recv().await.unwrap());
    second.accept().await;
    let msg = second.mirror().await;
    assert_eq!(msg.xid, 1);

    let (tag, status, result) = outcomes.recv().await.unwrap();
    assert_eq!((tag, status, result), (1, CallStatus::ok(), Value::Int(1)));
}

#[tokio::test]
async fn test_deadline_fails_one_call() {
    init_tracing();
    let (conn, mut servers) = connection();

    let slow = {
        let conn = Arc::clone(&conn);
        tokio::spawn(async move {
            conn.call_with_deadline("s", "slow", Value::Null, Some(Duration::from_millis(100)))
                .await
        })
    };

    let mut server = Server::new(servers.recv().await.unwrap());
    server.accept().await;
    let slow_msg = server.read_message().await;

    match slow.await.unwrap() {
        Err(Error::CallFailed(desc)) => assert_eq!(desc, "query timeout"),
        other => panic!("unexpected {other:?}"),
    }

    // A late reply is ignored and the connection stays usable.
    server
        .reply(slow_msg.xid, ReplyStatus::Success, Value::Null)
        .await;
    let fast = {
        let conn = Arc::clone(&conn);
        tokio::spawn(async move { conn.call("s", "fast", Value::from(vec![5])).await })
    };
    server.mirror().await;
    assert_eq!(fast.await.unwrap().unwrap(), Value::Int(5));
}

#[tokio::test]
async fn test_default_deadline_applies_to_callback_calls() {
    init_tracing();
    let config = StreamConfig::default().default_deadline(Some(Duration::from_millis(50)));
    let (conn, mut servers) = connection_with(config);
    let (tx, mut outcomes): (_, Outcomes) = mpsc::unbounded_channel();
    call_tagged(&conn, &tx, 0, "slow");

    let mut server = Server::new(servers.recv().await.unwrap());
    server.accept().await;
    server.read_message().await;

    let (tag, status, _) = tokio::time::timeout(Duration::from_secs(5), outcomes.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!((tag, status), (0, CallStatus::failed("query timeout")));
    assert_eq!(conn.dispatcher().pending_count(), 0);
    assert!(conn.is_open());
}

#[tokio::test]
async fn test_calls_issued_while_closing_fail_without_reconnecting() {
    init_tracing();
    let (conn, mut servers) = connection();
    let (tx, mut outcomes): (_, Outcomes) = mpsc::unbounded_channel();

    // The first call's callback issues another call during teardown.
    let retry = {
        let conn = Arc::clone(&conn);
        let tx = tx.clone();
        Box::new(move |status: CallStatus, _: Value| {
            let _ = tx.send((0, status, Value::Null));
            call_tagged(&conn, &tx, 1, "retry");
        })
    };
    conn.call_with_callback("s", "m", Value::Null, retry).unwrap();

    let mut server = Server::new(servers.recv().await.unwrap());
    server.accept().await;
    server.read_message().await;

    conn.close().await;
    let (tag, status, _) = outcomes.recv().await.unwrap();
    assert_eq!((tag, status), (0, CallStatus::failed("connection closed")));
    let (tag, status, _) = outcomes.recv().await.unwrap();
    assert_eq!((tag, status), (1, CallStatus::failed("connection closed")));

    assert_eq!(conn.phase(), Phase::Idle);
    assert!(servers.try_recv().is_err());
    assert_eq!(conn.dispatcher().pending_count(), 0);
}

#[tokio::test]
async fn test_connect_failure_fails_calls() {
    init_tracing();
    let (conn, servers) = connection();
    drop(servers);

    match conn.call("s", "m", Value::Null).await {
        Err(Error::CallFailed(desc)) => {
            assert!(desc.starts_with("connection error: failed to connect to duplex"), "{desc}");
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(conn.phase(), Phase::Idle);
}

#[tokio::test]
async fn test_rejects_empty_method() {
    let (conn, _servers) = connection();
    assert!(conn.call("s", "", Value::Null).await.is_err());
    assert_eq!(conn.phase(), Phase::Idle);
}

#[tokio::test]
async fn test_tcp_end_to_end() {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut server = Server::new(stream);
        server.accept().await;
        server.mirror().await;
        server.mirror().await;
    });

    let conn = callwire_transport_tcp::tcp(addr.to_string(), StreamConfig::default());
    let a = conn.call("Calculator", "MirrorInt", Value::from(vec![1])).await;
    let b = conn.call("Calculator", "MirrorInt", Value::from(vec!["two"])).await;

    assert_eq!(a.unwrap(), Value::Int(1));
    assert_eq!(b.unwrap(), Value::from("two"));
    server.await.unwrap();
}
