#![deny(unused_must_use)]

//! Client for the Network Block Device oldstyle negotiation.
//!
//! A [`Session`] wraps a connected byte stream, performs the fixed
//! handshake to learn the export's size and flags, and serves arbitrary
//! byte-range reads by translating them into the protocol's sector-granular
//! read requests. One request is in flight at a time; writes, trims and the
//! newstyle option haggling are out of scope.

mod error;
pub mod protocol;
mod session;

pub use error::{Error, Result};
pub use protocol::handshake::{Export, ExportFlags};
pub use session::Session;
