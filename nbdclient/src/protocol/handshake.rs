use bitflags::bitflags;
use tokio::io::{AsyncRead, AsyncReadExt};

use super::consts::*;
use super::io;
use crate::error::{Error, Result};

/// What the server reported about its export during negotiation.
#[derive(Debug, Default, Hash, Eq, PartialEq, Ord, PartialOrd, Clone)]
pub struct Export {
    /// Size of the exported device, in bytes
    pub size: u64,
    /// Export flags exactly as sent by the server
    pub flags: u32,
}

impl Export {
    /// Decoded view of the known flag bits. Unknown bits are dropped;
    /// [`Export::flags`] keeps the verbatim word.
    pub fn export_flags(&self) -> ExportFlags {
        ExportFlags::from_bits_truncate(self.flags)
    }
}

bitflags! {
    #[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy)]
    pub struct ExportFlags: u32 {
        const HAS_FLAGS = 1 << 0;
        const READ_ONLY = 1 << 1;
        const SEND_FLUSH = 1 << 2;
        const SEND_FUA = 1 << 3;
        const ROTATIONAL = 1 << 4;
        const SEND_TRIM = 1 << 5;
    }
}

/// Oldstyle negotiation, client side. The server speaks first and the
/// client sends nothing back; every field is a fixed-length receive that
/// must arrive in full.
pub async fn handshake<IO: AsyncRead + Unpin>(c: &mut IO) -> Result<Export> {
    let mut passwd = [0; 8];
    c.read_exact(&mut passwd).await?;
    if &passwd != b"NBDMAGIC" {
        return Err(Error::Handshake(format!(
            "got {:?} instead of NBDMAGIC",
            String::from_utf8_lossy(&passwd)
        )));
    }

    let magic = io::read_u64(c).await?;
    if magic != NBD_CLISERV_MAGIC {
        return Err(Error::Handshake(format!(
            "got magic 0x{:x} instead of 0x{:x}",
            magic, NBD_CLISERV_MAGIC
        )));
    }

    let size = io::read_u64(c).await?;
    let flags = io::read_u32(c).await?;

    // A peer speaking a later protocol revision would put data here.
    let mut reserved = [0; 124];
    c.read_exact(&mut reserved).await?;
    for (i, b) in reserved.iter().enumerate() {
        if *b != 0 {
            return Err(Error::Handshake(format!(
                "reserved byte {} is 0x{:x} instead of zero",
                i, b
            )));
        }
    }

    Ok(Export { size, flags })
}
