//! The feature-code table: names a channel or socket attribute a
//! [`crate::wire::FeatureRequest`] can read or write.

/// Turn traffic monitoring for the whole channel on.
pub const MT_CHANNEL_TRAFFIC_MONITOR_ON: u16 = 0x0001;
/// Turn traffic monitoring for the whole channel off.
pub const MT_CHANNEL_TRAFFIC_MONITOR_OFF: u16 = 0x0002;

/// Whether a socket is currently open (bool, read or write).
pub const MT_SOCK_ATTRIB_OPEN: u16 = 0x0101;
/// Whether the socket's owning process is still running (bool, read-only).
pub const MT_SOCK_ATTRIB_OWNER_RUNNING: u16 = 0x0102;
/// Send buffer size in bytes (u32).
pub const MT_SOCK_ATTRIB_SND_BUF: u16 = 0x0109;
/// Receive buffer size in bytes (u32).
pub const MT_SOCK_ATTRIB_RCV_BUF: u16 = 0x010a;
/// Send timeout as a (seconds, microseconds) pair.
pub const MT_SOCK_ATTRIB_SND_TIMEO: u16 = 0x010b;
/// Receive timeout as a (seconds, microseconds) pair.
pub const MT_SOCK_ATTRIB_RCV_TIMEO: u16 = 0x010c;
/// Send low-watermark in bytes (u32).
pub const MT_SOCK_ATTRIB_SND_LOWAT: u16 = 0x010d;
/// Receive low-watermark in bytes (u32).
pub const MT_SOCK_ATTRIB_RCV_LOWAT: u16 = 0x010e;

/// The instance-wide congestion control algorithm (see [`CongestionControl`]).
pub const MT_SOCK_ATTRIB_SYSTEM_INS_CONGCTL: u16 = 0x20;
/// The instance-wide delayed-ACK tick count.
pub const MT_SOCK_ATTRIB_SYSTEM_DELACK_TICKS: u16 = 0x21;

/// The congestion-control algorithms an instance can be told to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum CongestionControl {
    Reno = 0,
    NewReno = 1,
    Cubic = 2,
}

impl CongestionControl {
    pub fn from_u32(v: u32) -> Option<Self> {
        Some(match v {
            0 => CongestionControl::Reno,
            1 => CongestionControl::NewReno,
            2 => CongestionControl::Cubic,
            _ => return None,
        })
    }
}
