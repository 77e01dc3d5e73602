pub mod handshake;
pub mod io;
pub mod transmission;

// https://github.com/NetworkBlockDevice/nbd/blob/master/doc/proto.md
pub mod consts {
    // Magic values
    /// Follows the literal "NBDMAGIC" in the oldstyle negotiation.
    pub const NBD_CLISERV_MAGIC: u64 = 0x00420281861253;
    pub const NBD_REQUEST_MAGIC: u32 = 0x25609513;
    pub const NBD_REPLY_MAGIC: u32 = 0x67446698;

    // Request Types
    pub const NBD_CMD_READ: u32 = 0;
    pub const NBD_CMD_WRITE: u32 = 1;
    pub const NBD_CMD_DISC: u32 = 2;
    pub const NBD_CMD_FLUSH: u32 = 3;
    pub const NBD_CMD_TRIM: u32 = 4;

    pub const NBD_DEFAULT_PORT: u16 = 10809;

    // Fixed granularity of all device-facing offsets and lengths. Not
    // negotiated.
    pub const SECTOR_SHIFT: u32 = 9;
    pub const SECTOR_SIZE: u64 = 1 << SECTOR_SHIFT;
    pub const SECTOR_MASK: u64 = SECTOR_SIZE - 1;

    /// Cap on the payload of a single read request, bounding one round
    /// trip independently of the device size.
    pub const MAX_REQUEST_LEN: u32 = 1 << 12;
}
