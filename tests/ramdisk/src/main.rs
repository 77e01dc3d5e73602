//! Oldstyle NBD ramdisk server, the loopback peer for exercising the
//! client engine and nbdcat against a real socket.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use clap::Parser;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, UnixListener};
use tokio::sync::RwLock;

use nbdclient::protocol::consts::*;
use nbdclient::protocol::io;
use nbdclient::ExportFlags;

enum IORequest {
    Write { offset: u64, payload: Vec<u8> },
    Read { offset: u64, length: u32 },
    Flush,
}

enum IOResponse {
    Ok,
    Read { payload: Vec<u8> },
}

#[async_trait]
trait StorageEngine: Send + Sync + 'static {
    async fn call(&self, req: IORequest) -> std::io::Result<IOResponse>;
}

struct Ramdisk {
    buf: RwLock<Vec<u8>>,
}
impl Ramdisk {
    fn new(n: usize) -> Self {
        Self {
            buf: RwLock::new(vec![0; n]),
        }
    }
}
#[async_trait]
impl StorageEngine for Ramdisk {
    async fn call(&self, req: IORequest) -> std::io::Result<IOResponse> {
        match req {
            IORequest::Write { offset, payload } => {
                let mut buf = self.buf.write().await;
                let end = offset as usize + payload.len();
                if end > buf.len() {
                    return Err(std::io::Error::from_raw_os_error(libc::EINVAL));
                }
                buf[offset as usize..end].copy_from_slice(&payload);
                Ok(IOResponse::Ok)
            }
            IORequest::Read { offset, length } => {
                let buf = self.buf.read().await;
                let end = offset as usize + length as usize;
                if end > buf.len() {
                    return Err(std::io::Error::from_raw_os_error(libc::EINVAL));
                }
                Ok(IOResponse::Read {
                    payload: buf[offset as usize..end].to_vec(),
                })
            }
            IORequest::Flush => Ok(IOResponse::Ok),
        }
    }
}

fn strerror<T>(s: &'static str) -> std::io::Result<T> {
    Err(std::io::Error::new(std::io::ErrorKind::InvalidData, s))
}

async fn handshake<IO: AsyncWrite + Unpin>(c: &mut IO, size: u64, flags: u32) -> std::io::Result<()> {
    c.write_all(b"NBDMAGIC").await?;
    io::write_u64(c, NBD_CLISERV_MAGIC).await?;
    io::write_u64(c, size).await?;
    io::write_u32(c, flags).await?;
    c.write_all(&[0; 124]).await?;
    c.flush().await?;
    Ok(())
}

async fn reply<IO: AsyncWrite + Unpin>(c: &mut IO, error: u32, handle: u64) -> std::io::Result<()> {
    io::write_u32(c, NBD_REPLY_MAGIC).await?;
    io::write_u32(c, error).await?;
    io::write_u64(c, handle).await?;
    Ok(())
}

/// One connection, requests served strictly in order.
async fn run_conn<IO, E>(mut c: IO, size: u64, engine: Arc<E>) -> std::io::Result<()>
where
    IO: AsyncRead + AsyncWrite + Unpin,
    E: StorageEngine,
{
    let flags = (ExportFlags::HAS_FLAGS | ExportFlags::SEND_FLUSH).bits();
    handshake(&mut c, size, flags).await?;
    loop {
        let magic = io::read_u32(&mut c).await?;
        if magic != NBD_REQUEST_MAGIC {
            return strerror("Invalid request magic");
        }
        let typ = io::read_u32(&mut c).await?;
        let handle = io::read_u64(&mut c).await?;
        let offset = io::read_u64(&mut c).await?;
        let length = io::read_u32(&mut c).await?;

        let req = match typ {
            NBD_CMD_READ => IORequest::Read { offset, length },
            NBD_CMD_WRITE => {
                let mut payload = vec![0; length as usize];
                c.read_exact(&mut payload).await?;
                IORequest::Write { offset, payload }
            }
            NBD_CMD_FLUSH => IORequest::Flush,
            NBD_CMD_DISC => return Ok(()),
            // TRIM and later commands are not implemented
            _ => {
                reply(&mut c, libc::EOPNOTSUPP as u32, handle).await?;
                c.flush().await?;
                continue;
            }
        };
        match engine.call(req).await {
            Ok(IOResponse::Ok) => reply(&mut c, 0, handle).await?,
            Ok(IOResponse::Read { payload }) => {
                reply(&mut c, 0, handle).await?;
                c.write_all(&payload).await?;
            }
            Err(e) => {
                let e = e.raw_os_error().unwrap_or(5) as u32;
                reply(&mut c, e, handle).await?;
            }
        }
        c.flush().await?;
    }
}

#[derive(Parser)]
struct Opts {
    /// TCP listen address, host:port
    #[arg(long, conflicts_with = "unix")]
    tcp: Option<String>,
    /// Unix socket path to listen on
    #[arg(long)]
    unix: Option<PathBuf>,
    /// Device size in bytes
    #[arg(long, default_value_t = 64 << 20)]
    size: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
    let opts = Opts::parse();
    let engine = Arc::new(Ramdisk::new(opts.size as usize));
    let size = opts.size;

    if let Some(path) = opts.unix {
        let listener = UnixListener::bind(&path)?;
        tracing::info!("serving {} byte ramdisk on {}", size, path.display());
        loop {
            let (stream, _) = listener.accept().await?;
            let engine = Arc::clone(&engine);
            tokio::spawn(async move {
                if let Err(e) = run_conn(stream, size, engine).await {
                    tracing::error!("connection failed: {}", e);
                }
            });
        }
    } else {
        let addr = opts
            .tcp
            .unwrap_or_else(|| format!("127.0.0.1:{}", NBD_DEFAULT_PORT));
        let listener = TcpListener::bind(&addr).await?;
        tracing::info!("serving {} byte ramdisk on {}", size, addr);
        loop {
            let (stream, _) = listener.accept().await?;
            let engine = Arc::clone(&engine);
            tokio::spawn(async move {
                if let Err(e) = run_conn(stream, size, engine).await {
                    tracing::error!("connection failed: {}", e);
                }
            });
        }
    }
}
