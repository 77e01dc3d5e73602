//! Error types for the client engine.

use thiserror::Error;

/// Everything a session operation can fail with.
///
/// Failures are returned to the immediate caller; nothing is retried
/// internally, and the cursor only moves after a fully successful read.
#[derive(Debug, Error)]
pub enum Error {
    /// The underlying stream failed, or delivered fewer bytes than a
    /// protocol field requires (`read_exact` surfaces short receives as
    /// `UnexpectedEof`).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer did not speak the oldstyle negotiation. Fatal for the
    /// connection attempt; no session is produced.
    #[error("handshake mismatch: {0}")]
    Handshake(String),

    /// Reply validation failed mid-session. The session is suspect but
    /// left open; the caller decides whether to keep using it.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Seek target outside the device. Nothing was sent on the wire.
    #[error("seek target out of device range")]
    OutOfRange,

    /// End-relative positioning is not supported by this client.
    #[error("end-relative seek is not supported")]
    EndRelativeSeek,

    /// Scratch buffer for an unaligned read could not be obtained.
    #[error("cannot allocate {0} byte transfer buffer")]
    Allocation(usize),
}

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
