use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::consts::*;
use super::io;
use crate::error::{Error, Result};

/// Handle sent with every request. One request is in flight at a time, so
/// a fixed value correlates fine; the reply must echo it.
pub const REQUEST_HANDLE: u64 = 0;

/// Send one request header, 28 bytes on the wire.
pub async fn request<IO: AsyncWrite + Unpin>(
    c: &mut IO,
    cmd: u32,
    offset: u64,
    length: u32,
) -> Result<()> {
    io::write_u32(c, NBD_REQUEST_MAGIC).await?;
    io::write_u32(c, cmd).await?;
    io::write_u64(c, REQUEST_HANDLE).await?;
    io::write_u64(c, offset).await?;
    io::write_u32(c, length).await?;
    c.flush().await?;
    Ok(())
}

/// Receive and validate one reply header. A wrong magic, a non-zero error
/// code or a handle other than the one we sent invalidates the whole
/// reply; there is no partial success.
pub async fn reply<IO: AsyncRead + Unpin>(c: &mut IO) -> Result<()> {
    let magic = io::read_u32(c).await?;
    if magic != NBD_REPLY_MAGIC {
        return Err(Error::Protocol(format!("invalid reply magic 0x{:x}", magic)));
    }
    let errno = io::read_u32(c).await?;
    let handle = io::read_u64(c).await?;
    if errno != 0 {
        return Err(Error::Protocol(format!(
            "server failed the request with errno {}",
            errno
        )));
    }
    if handle != REQUEST_HANDLE {
        return Err(Error::Protocol(format!(
            "reply handle 0x{:x} does not echo 0x{:x}",
            handle, REQUEST_HANDLE
        )));
    }
    Ok(())
}

/// Fill `buf` from the device starting at `offset`, one capped read
/// request per round trip. `offset` and `buf.len()` are sector-aligned
/// except when the window was clamped at the end of the device.
pub async fn read_into<IO>(c: &mut IO, offset: u64, buf: &mut [u8]) -> Result<()>
where
    IO: AsyncRead + AsyncWrite + Unpin,
{
    let mut done = 0;
    while done < buf.len() {
        let count = std::cmp::min(buf.len() - done, MAX_REQUEST_LEN as usize);
        request(c, NBD_CMD_READ, offset + done as u64, count as u32).await?;
        reply(c).await?;
        c.read_exact(&mut buf[done..done + count]).await?;
        done += count;
    }
    Ok(())
}

/// Tell the server we are leaving. No reply is defined for DISC.
pub async fn disconnect<IO: AsyncWrite + Unpin>(c: &mut IO) -> Result<()> {
    request(c, NBD_CMD_DISC, 0, 0).await
}
