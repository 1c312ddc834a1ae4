//! Packet-filter forwarders redirecting one external TCP port to one INS.

pub mod filter;
pub mod forwarder;

pub use filter::{FilterError, PacketFilter, ShellPacketFilter, Table};
pub use forwarder::Forwarder;
