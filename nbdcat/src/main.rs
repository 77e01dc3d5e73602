use std::io::Write;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, UnixStream};

use nbdclient::protocol::consts::NBD_DEFAULT_PORT;
use nbdclient::Session;

/// Read a byte range from an NBD export and write it to stdout.
#[derive(Parser)]
struct Opts {
    /// Server address: a unix socket path, or host[:port]
    addr: String,
    /// Byte offset to start reading at
    #[arg(long, default_value_t = 0)]
    offset: u64,
    /// Bytes to read; defaults to the rest of the device
    #[arg(long)]
    length: Option<u64>,
}

// Bytes per engine call; the engine splits these further on the wire.
const CHUNK: u64 = 1 << 20;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let opts = Opts::parse();

    // Paths are unix sockets, anything else is a TCP endpoint.
    if opts.addr.contains('/') {
        let stream = UnixStream::connect(&opts.addr)
            .await
            .with_context(|| format!("failed to connect to {}", opts.addr))?;
        dump(stream, &opts).await
    } else {
        let addr = if opts.addr.contains(':') {
            opts.addr.clone()
        } else {
            format!("{}:{}", opts.addr, NBD_DEFAULT_PORT)
        };
        let stream = TcpStream::connect(&addr)
            .await
            .with_context(|| format!("failed to connect to {}", addr))?;
        dump(stream, &opts).await
    }
}

async fn dump<IO: AsyncRead + AsyncWrite + Unpin>(stream: IO, opts: &Opts) -> Result<()> {
    let mut session = Session::handshake(stream).await?;
    let length = opts
        .length
        .unwrap_or_else(|| session.size().saturating_sub(opts.offset));

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let mut offset = opts.offset;
    let end = offset.saturating_add(length);
    while offset < end {
        let count = std::cmp::min(end - offset, CHUNK) as usize;
        let buf = session.read_at(count, offset).await?;
        if buf.is_empty() {
            break;
        }
        out.write_all(&buf).context("failed to write to stdout")?;
        offset += buf.len() as u64;
    }
    out.flush()?;
    session.close().await?;
    Ok(())
}
