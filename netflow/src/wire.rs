//! Fixed-width, network-byte-order framing for every netflow message.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use bytes::{Buf, BufMut};

use crate::flags::Flags;
use crate::signature::Signature;

/// Error returned when a buffer does not hold a complete, well-formed frame.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum WireError {
    #[error("need {need} bytes, have {have}")]
    Truncated { need: usize, have: usize },
    #[error("unknown address family {0}")]
    UnknownAddressFamily(u32),
    #[error("unknown signature {0:#06x}")]
    UnknownSignature(u16),
}

/// Every message starts with a signature and a correlation id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Base {
    pub sig: u16,
    pub id: u32,
}

pub const BASE_LEN: usize = 6;

impl Base {
    pub fn decode(buf: &mut impl Buf) -> Result<Self, WireError> {
        require(buf, BASE_LEN)?;
        Ok(Base {
            sig: buf.get_u16(),
            id: buf.get_u32(),
        })
    }

    pub fn encode(&self, buf: &mut impl BufMut) {
        buf.put_u16(self.sig);
        buf.put_u32(self.id);
    }

    pub fn signature(&self) -> Result<Signature, WireError> {
        Signature::try_from(self.sig).map_err(|_| WireError::UnknownSignature(self.sig))
    }
}

/// One local or remote socket address: an address family tag, 16 raw
/// address bytes (v4 addresses occupy the first 4), and a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    pub addr: IpAddr,
    pub port: u16,
}

pub const ENDPOINT_LEN: usize = 22;

impl Endpoint {
    pub fn decode(buf: &mut impl Buf) -> Result<Self, WireError> {
        require(buf, ENDPOINT_LEN)?;
        let af = buf.get_u32();
        let mut raw = [0u8; 16];
        buf.copy_to_slice(&mut raw);
        let port = buf.get_u16();
        let addr = match af {
            4 => IpAddr::V4(Ipv4Addr::new(raw[0], raw[1], raw[2], raw[3])),
            6 => IpAddr::V6(Ipv6Addr::from(raw)),
            other => return Err(WireError::UnknownAddressFamily(other)),
        };
        Ok(Endpoint { addr, port })
    }

    pub fn encode(&self, buf: &mut impl BufMut) {
        let mut raw = [0u8; 16];
        match self.addr {
            IpAddr::V4(v4) => {
                buf.put_u32(4);
                raw[..4].copy_from_slice(&v4.octets());
            }
            IpAddr::V6(v6) => {
                buf.put_u32(6);
                raw = v6.octets();
            }
        }
        buf.put_slice(&raw);
        buf.put_u16(self.port);
    }
}

/// The socket lifecycle events a netflow observation can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ObservationKind {
    None = 0,
    Create = 1,
    Bind = 2,
    Accept = 3,
    Connect = 4,
    Recv = 5,
    Send = 6,
    Close = 7,
}

impl ObservationKind {
    pub fn from_u16(v: u16) -> Option<Self> {
        Some(match v {
            0 => ObservationKind::None,
            1 => ObservationKind::Create,
            2 => ObservationKind::Bind,
            3 => ObservationKind::Accept,
            4 => ObservationKind::Connect,
            5 => ObservationKind::Recv,
            6 => ObservationKind::Send,
            7 => ObservationKind::Close,
            _ => return None,
        })
    }
}

/// A fully decoded traffic observation: base + the 110-byte info payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    pub base: Base,
    pub obs: u16,
    pub t_start_s: u64,
    pub t_start_ns: u64,
    pub t_now_s: u64,
    pub t_now_ns: u64,
    pub sockfd: u64,
    pub pvm: Endpoint,
    pub remote: Endpoint,
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub extra: u64,
}

/// Length of the observation payload that follows [`Base`].
pub const OBSERVATION_PAYLOAD_LEN: usize = 110;

impl Observation {
    pub fn decode(base: Base, buf: &mut impl Buf) -> Result<Self, WireError> {
        require(buf, OBSERVATION_PAYLOAD_LEN)?;
        let obs = buf.get_u16();
        let t_start_s = buf.get_u64();
        let t_start_ns = buf.get_u64();
        let t_now_s = buf.get_u64();
        let t_now_ns = buf.get_u64();
        let sockfd = buf.get_u64();
        let pvm = Endpoint::decode(buf)?;
        let remote = Endpoint::decode(buf)?;
        let bytes_in = buf.get_u64();
        let bytes_out = buf.get_u64();
        let extra = buf.get_u64();
        Ok(Observation {
            base,
            obs,
            t_start_s,
            t_start_ns,
            t_now_s,
            t_now_ns,
            sockfd,
            pvm,
            remote,
            bytes_in,
            bytes_out,
            extra,
        })
    }

    pub fn kind(&self) -> Option<ObservationKind> {
        ObservationKind::from_u16(self.obs)
    }

    /// Seconds elapsed between session start and this observation.
    pub fn age_secs(&self) -> f64 {
        let start = self.t_start_s as f64 + self.t_start_ns as f64 / 1_000_000_000.0;
        let now = self.t_now_s as f64 + self.t_now_ns as f64 / 1_000_000_000.0;
        now - start
    }
}

/// A request to read or write a socket/channel feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureRequest {
    pub base: Base,
    pub flags: Flags,
    pub name: u16,
    pub val0: u64,
    pub val1: u64,
    pub sockfd: u64,
}

pub const FEATURE_REQUEST_PAYLOAD_LEN: usize = 40;

impl FeatureRequest {
    pub fn encode(&self, buf: &mut impl BufMut) {
        self.base.encode(buf);
        buf.put_u16(self.flags.bits());
        buf.put_u16(self.name);
        buf.put_u64(self.val0);
        buf.put_u64(self.val1);
        buf.put_u64(self.sockfd);
        buf.put_slice(&[0u8; 12]);
    }

    pub const ENCODED_LEN: usize = BASE_LEN + FEATURE_REQUEST_PAYLOAD_LEN;
}

/// The response to a [`FeatureRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureResponse {
    pub base: Base,
    pub status: i32,
    pub val: [u8; 16],
}

pub const FEATURE_RESPONSE_PAYLOAD_LEN: usize = 20;

impl FeatureResponse {
    pub fn decode(base: Base, buf: &mut impl Buf) -> Result<Self, WireError> {
        require(buf, FEATURE_RESPONSE_PAYLOAD_LEN)?;
        let status = buf.get_i32();
        let mut val = [0u8; 16];
        buf.copy_to_slice(&mut val);
        Ok(FeatureResponse { base, status, val })
    }

    /// The response value interpreted as two big-endian u64 words, the
    /// layout every feature response in practice uses.
    pub fn as_u64_pair(&self) -> (u64, u64) {
        let mut buf = &self.val[..];
        (buf.get_u64(), buf.get_u64())
    }
}

fn require(buf: &impl Buf, n: usize) -> Result<(), WireError> {
    if buf.remaining() < n {
        Err(WireError::Truncated {
            need: n,
            have: buf.remaining(),
        })
    } else {
        Ok(())
    }
}
