//! Parses the `<ip>:<port>` (or `[<ipv6>]:<port>`) string the netflow
//! server publishes on the bus.

use std::net::{SocketAddr, ToSocketAddrs};

#[derive(Debug, thiserror::Error)]
#[error("{0:?} is not a valid <ip>:<port> netflow server address")]
pub struct ParseNetflowAddrError(String);

pub fn parse_netflow_addr(raw: &str) -> Result<SocketAddr, ParseNetflowAddrError> {
    raw.to_socket_addrs()
        .ok()
        .and_then(|mut addrs| addrs.next())
        .ok_or_else(|| ParseNetflowAddrError(raw.to_string()))
}
