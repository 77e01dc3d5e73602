use std::io::SeekFrom;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};
use crate::protocol::consts::*;
use crate::protocol::handshake::{self, Export, ExportFlags};
use crate::protocol::transmission;

/// One validated, open connection to an NBD server.
///
/// Produced only by a successful [`Session::handshake`]. The stream is
/// owned exclusively; [`Session::close`] consumes the session and shuts it
/// down. Reads and seeks take `&mut self`, so there is one logical reader
/// per session at a time. Sessions over distinct streams are independent.
pub struct Session<IO> {
    conn: IO,
    export: Export,
    cursor: u64,
}

impl<IO: AsyncRead + AsyncWrite + Unpin> Session<IO> {
    /// Run the oldstyle negotiation on a freshly connected stream.
    ///
    /// On failure the stream is dropped in an indeterminate protocol state
    /// and must not be reused.
    pub async fn handshake(mut conn: IO) -> Result<Self> {
        let export = handshake::handshake(&mut conn).await?;
        tracing::debug!(
            size = export.size,
            flags = export.flags,
            "negotiated oldstyle session"
        );
        Ok(Self {
            conn,
            export,
            cursor: 0,
        })
    }

    /// Total addressable bytes of the remote device.
    pub fn size(&self) -> u64 {
        self.export.size
    }

    /// Export flags exactly as sent by the server.
    pub fn flags(&self) -> u32 {
        self.export.flags
    }

    /// Decoded view of the known export flag bits.
    pub fn export_flags(&self) -> ExportFlags {
        self.export.export_flags()
    }

    /// Current logical position of sequential reads.
    pub fn position(&self) -> u64 {
        self.cursor
    }

    /// Read `length` bytes at the current position, advancing it by the
    /// number of bytes actually returned.
    pub async fn read(&mut self, length: usize) -> Result<Vec<u8>> {
        let buf = self.read_window(self.cursor, length).await?;
        self.cursor += buf.len() as u64;
        Ok(buf)
    }

    /// Read `length` bytes at an explicit offset. The sequential position
    /// is left untouched.
    pub async fn read_at(&mut self, length: usize, offset: u64) -> Result<Vec<u8>> {
        self.read_window(offset, length).await
    }

    async fn read_window(&mut self, logical: u64, length: usize) -> Result<Vec<u8>> {
        if length == 0 {
            return Ok(Vec::new());
        }
        // Reads running past the end of the device shorten rather than
        // fail, like a read on a raw block device.
        let returned =
            std::cmp::min(length as u64, self.export.size.saturating_sub(logical)) as usize;
        if returned == 0 {
            return Ok(Vec::new());
        }

        let (aligned_offset, aligned_len) = aligned_window(logical, length as u64, self.export.size);
        let head = (logical - aligned_offset) as usize;
        tracing::trace!(logical, length, aligned_offset, aligned_len, "read");

        if head == 0 && aligned_len == returned as u64 {
            // Window matches the request exactly, skip the scratch copy.
            let mut buf = alloc_buf(returned)?;
            transmission::read_into(&mut self.conn, aligned_offset, &mut buf).await?;
            return Ok(buf);
        }

        let mut scratch = alloc_buf(aligned_len as usize)?;
        transmission::read_into(&mut self.conn, aligned_offset, &mut scratch).await?;
        Ok(scratch[head..head + returned].to_vec())
    }

    /// Move the sequential position.
    ///
    /// `SeekFrom::End` is a defined error rather than an offset computed
    /// from the device size: the protocol as used here has no end-relative
    /// positioning.
    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        match pos {
            SeekFrom::Start(offset) => {
                if offset >= self.export.size {
                    return Err(Error::OutOfRange);
                }
                self.cursor = offset;
            }
            SeekFrom::Current(delta) => {
                let target = self
                    .cursor
                    .checked_add_signed(delta)
                    .ok_or(Error::OutOfRange)?;
                if target >= self.export.size {
                    return Err(Error::OutOfRange);
                }
                self.cursor = target;
            }
            SeekFrom::End(_) => return Err(Error::EndRelativeSeek),
        }
        Ok(self.cursor)
    }

    /// Tell the server we are leaving, then shut the stream down.
    pub async fn close(mut self) -> Result<()> {
        transmission::disconnect(&mut self.conn).await?;
        self.conn.shutdown().await?;
        Ok(())
    }
}

/// Smallest sector-granular window covering `length` bytes at `logical`,
/// clamped to the end of the device. The clamped length loses its
/// alignment when the device size itself is not a sector multiple. Callers
/// guarantee `logical < size`.
fn aligned_window(logical: u64, length: u64, size: u64) -> (u64, u64) {
    let offset = logical & !SECTOR_MASK;
    let mut len = (logical - offset).saturating_add(length);
    if len & SECTOR_MASK != 0 {
        len = (len & !SECTOR_MASK).saturating_add(SECTOR_SIZE);
    }
    if offset.saturating_add(len) > size {
        len = size - offset;
    }
    (offset, len)
}

fn alloc_buf(len: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len).map_err(|_| Error::Allocation(len))?;
    buf.resize(len, 0);
    Ok(buf)
}
