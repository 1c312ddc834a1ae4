//! Feature request flag bits.

use bitflags::bitflags;

bitflags! {
    /// Request direction/targeting flags. The absence of [`Flags::WRITE`]
    /// means a read request; [`Flags::BY_SOCK`] targets a specific socket
    /// rather than the channel as a whole.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Flags: u16 {
        const WRITE = 0x1;
        const BY_SOCK = 0x2;
    }
}

impl Flags {
    /// A plain read request with no targeting bits set.
    pub const READ: Flags = Flags::empty();
}
