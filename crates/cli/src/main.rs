//! CLI binary to issue a single RPC call.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::redundant_pub_crate)]

use std::time::Duration;

use callwire_rpc::{HandshakeConfig, TransportConnection, Value};
use callwire_transport_http::{HttpConfig, HttpConnection};
use callwire_transport_tcp::StreamConfig;
use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use url::Url;

/// CLI-specific error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Params are not valid JSON
    #[error("invalid params: {0}")]
    Params(#[from] callwire_rpc::DecodeError),

    /// Magic is not three bytes
    #[error("invalid magic {0:?}: expected exactly 3 bytes")]
    Magic(String),

    /// Version is not `MAJOR.MINOR`
    #[error("invalid protocol version {0:?}: expected MAJOR.MINOR")]
    Version(String),

    /// URL cannot be used
    #[error("invalid url {url}: {reason}")]
    Url {
        /// The URL given.
        url: Url,
        /// What is wrong with it.
        reason: &'static str,
    },

    /// HTTP transport error
    #[error(transparent)]
    Http(#[from] callwire_transport_http::HttpError),

    /// RPC error, including a failed call
    #[error(transparent)]
    Rpc(#[from] callwire_rpc::Error),
}

#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Debug, Subcommand)]
enum Command {
    /// Call a method and print its result
    Call(CallArgs),
}

#[derive(Clone, Debug, clap::Args)]
struct CallArgs {
    /// Service name
    service: String,

    /// Method name
    method: String,

    /// Call parameters as JSON, sent verbatim
    #[arg(default_value = "[]")]
    params: String,

    /// Server URL: tcp://host:port or http(s)://host[:port]/path
    #[arg(long, env = "CALLWIRE_URL")]
    url: Url,

    /// Call deadline in milliseconds
    #[arg(long, env = "CALLWIRE_DEADLINE_MS")]
    deadline_ms: Option<u64>,

    /// Connect or request timeout in milliseconds
    #[arg(long, default_value_t = 5000, env = "CALLWIRE_TIMEOUT_MS")]
    timeout_ms: u64,

    /// Handshake magic (stream transport only)
    #[arg(long, default_value = "rpc", env = "CALLWIRE_MAGIC")]
    magic: String,

    /// Protocol version as MAJOR.MINOR (stream transport only)
    #[arg(long, default_value = "1.0", env = "CALLWIRE_PROTOCOL_VERSION")]
    protocol_version: String,
}

fn parse_magic(magic: &str) -> Result<[u8; 3], Error> {
    magic
        .as_bytes()
        .try_into()
        .map_err(|_| Error::Magic(magic.to_string()))
}

fn parse_version(version: &str) -> Result<(u8, u8), Error> {
    let invalid = || Error::Version(version.to_string());
    let (major, minor) = version.split_once('.').ok_or_else(invalid)?;
    Ok((
        major.parse().map_err(|_| invalid())?,
        minor.parse().map_err(|_| invalid())?,
    ))
}

fn connect(args: &CallArgs) -> Result<Box<dyn TransportConnection>, Error> {
    let deadline = args.deadline_ms.map(Duration::from_millis);
    let timeout = Duration::from_millis(args.timeout_ms);

    match args.url.scheme() {
        "tcp" => {
            let host = args.url.host_str().ok_or_else(|| Error::Url {
                url: args.url.clone(),
                reason: "missing host",
            })?;
            let port = args.url.port().ok_or_else(|| Error::Url {
                url: args.url.clone(),
                reason: "missing port",
            })?;
            let (major, minor) = parse_version(&args.protocol_version)?;
            let handshake = HandshakeConfig::default()
                .magic(parse_magic(&args.magic)?)
                .version(major, minor);
            let config = StreamConfig::default()
                .handshake(handshake)
                .connect_timeout(timeout)
                .default_deadline(deadline);
            Ok(Box::new(callwire_transport_tcp::tcp(
                format!("{host}:{port}"),
                config,
            )))
        }
        "http" | "https" => {
            let config = HttpConfig::new(args.url.as_str())
                .request_timeout(timeout)
                .default_deadline(deadline);
            Ok(Box::new(HttpConnection::new(config)?))
        }
        _ => Err(Error::Url {
            url: args.url.clone(),
            reason: "scheme must be tcp, http or https",
        }),
    }
}

async fn call(args: CallArgs) -> Result<String, Error> {
    // Validate locally, then send the text as given.
    callwire_rpc::decode(&args.params)?;
    let params = Value::raw(args.params.clone());

    let conn = connect(&args)?;
    info!(url = %args.url, service = %args.service, method = %args.method, "calling");
    let result = conn.call(&args.service, &args.method, params).await;
    conn.close().await;

    let result = result?;
    debug!("call succeeded");
    Ok(callwire_rpc::encode(&result))
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    match args.command {
        Command::Call(call_args) => {
            let output = call(call_args).await?;
            println!("{output}");
        }
    }
    Ok(())
}
