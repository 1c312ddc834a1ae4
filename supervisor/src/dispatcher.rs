//! Turns bus events into updates against the live instance table.
//!
//! Every key lives under `<root>/<domain-id>/<suffix>`. The suffix
//! selects what's being reported; `ins_dom_id` is the only suffix that
//! can arrive before the instance is in the live table, since it is
//! what puts it there.

use std::net::IpAddr;
use std::str::FromStr;
use std::sync::Arc;

use common::{DomainId, Mac};
use forwarder::{FilterError, PacketFilter};
use ins::{Instance, InsMap, Stats};
use kv::Event;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("key {0:?} does not match <root>/<domain-id>/<suffix>")]
    MalformedPath(String),
    #[error("parsing domain id out of {path:?}: {source}")]
    DomainId {
        path: String,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("domain id {0} has no registered instance")]
    UnknownDomainId(DomainId),
    #[error("key {0:?} carried no value")]
    MissingValue(String),
    #[error("ins_dom_id value {value:?} does not match path domain id {domain_id}")]
    DomainIdMismatch { value: String, domain_id: DomainId },
    #[error("{0:?} is not a valid IP address")]
    Address(String),
    #[error("{0:?} is not a valid stats string")]
    Stats(String),
    #[error("{0:?} is not a valid port")]
    Port(String),
    #[error(transparent)]
    Filter(#[from] FilterError),
}

/// Suffixes the supervisor understands on the bus.
mod suffix {
    pub const INS_DOM_ID: &str = "ins_dom_id";
    pub const IP_ADDRS: &str = "ip_addrs";
    pub const NETWORK_STATS: &str = "network_stats";
    pub const HEARTBEAT: &str = "heartbeat";
    pub const LISTENING_PORTS: &str = "listening_ports";
}

/// Routes bus events to the instance table, keyed by the path's
/// embedded domain id.
pub struct Dispatcher {
    root: String,
    map: Arc<InsMap>,
    backend: Arc<dyn PacketFilter>,
}

impl Dispatcher {
    pub fn new(root: impl Into<String>, map: Arc<InsMap>, backend: Arc<dyn PacketFilter>) -> Self {
        Dispatcher { root: root.into(), map, backend }
    }

    pub fn dispatch(&self, event: Event) -> Result<(), DispatchError> {
        let (domain_id_str, suffix) = split_path(&self.root, &event.path)?;
        let domain_id = DomainId::from_str(domain_id_str)
            .map_err(|source| DispatchError::DomainId { path: event.path.clone(), source })?;

        match suffix {
            suffix::INS_DOM_ID => self.handle_ins_dom_id(domain_id, event.value.as_deref()),
            suffix::IP_ADDRS => self.handle_ip_addrs(domain_id, event.value.as_deref()),
            suffix::NETWORK_STATS => self.handle_network_stats(domain_id, event.value.as_deref()),
            suffix::HEARTBEAT => self.handle_heartbeat(domain_id),
            suffix::LISTENING_PORTS => self.handle_listening_ports(domain_id, event.value.as_deref()),
            other => {
                debug!(suffix = other, "ignoring unrecognized bus key");
                Ok(())
            }
        }
    }

    fn require(&self, domain_id: DomainId) -> Result<ins::SharedInstance, DispatchError> {
        self.map.get(domain_id).ok_or(DispatchError::UnknownDomainId(domain_id))
    }

    fn handle_ins_dom_id(&self, domain_id: DomainId, value: Option<&str>) -> Result<(), DispatchError> {
        let raw = value.ok_or_else(|| DispatchError::MissingValue(suffix::INS_DOM_ID.into()))?;
        let reported: u32 = raw
            .parse()
            .ok()
            .filter(|reported| *reported == domain_id.0)
            .ok_or_else(|| DispatchError::DomainIdMismatch { value: raw.to_string(), domain_id })?;
        debug_assert_eq!(reported, domain_id.0);
        // The mainline path always has a pending instance (with its own
        // MAC, allocated by the supervisor at spawn time) queued before
        // this event arrives; the fallback only fires if a domain id is
        // registered with no matching spawn, which has no MAC to recover.
        self.map.bind_domain_id(domain_id, || Instance::new(Mac([0; 6])));
        Ok(())
    }

    fn handle_ip_addrs(&self, domain_id: DomainId, value: Option<&str>) -> Result<(), DispatchError> {
        let instance = self.require(domain_id)?;
        let raw = value.ok_or_else(|| DispatchError::MissingValue(suffix::IP_ADDRS.into()))?;
        let addr = IpAddr::from_str(raw).map_err(|_| DispatchError::Address(raw.to_string()))?;
        instance.lock().set_address(addr);
        Ok(())
    }

    fn handle_network_stats(&self, domain_id: DomainId, value: Option<&str>) -> Result<(), DispatchError> {
        let instance = self.require(domain_id)?;
        let raw = value.ok_or_else(|| DispatchError::MissingValue(suffix::NETWORK_STATS.into()))?;
        let stats = Stats::from_str(raw).map_err(|_| DispatchError::Stats(raw.to_string()))?;
        instance.lock().set_stats(stats);
        Ok(())
    }

    fn handle_heartbeat(&self, domain_id: DomainId) -> Result<(), DispatchError> {
        let instance = self.require(domain_id)?;
        instance.lock().register_heartbeat();
        Ok(())
    }

    fn handle_listening_ports(&self, domain_id: DomainId, value: Option<&str>) -> Result<(), DispatchError> {
        let instance = self.require(domain_id)?;
        let raw = value.unwrap_or("");
        let mut ports = Vec::new();
        for token in raw.split_whitespace() {
            let port = u16::from_str_radix(token, 16).map_err(|_| DispatchError::Port(token.to_string()))?;
            ports.push(port);
        }
        instance.lock().set_listening_ports(ports, &self.backend);
        Ok(())
    }
}

fn split_path<'a>(root: &str, path: &'a str) -> Result<(&'a str, &'a str), DispatchError> {
    let rest = path
        .strip_prefix(root)
        .and_then(|r| r.strip_prefix('/'))
        .ok_or_else(|| DispatchError::MalformedPath(path.to_string()))?;
    let mut parts = rest.splitn(2, '/');
    let domain_id = parts.next().filter(|s| !s.is_empty());
    let key_suffix = parts.next().filter(|s| !s.is_empty());
    match (domain_id, key_suffix) {
        (Some(domain_id), Some(suffix)) => Ok((domain_id, suffix)),
        _ => Err(DispatchError::MalformedPath(path.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forwarder::Table;

    struct NoopFilter;
    impl PacketFilter for NoopFilter {
        fn insert_rule(&self, _table: Table, _chain: &str, _rule: &str) -> Result<(), FilterError> {
            Ok(())
        }
        fn delete_rule(&self, _table: Table, _chain: &str, _rule: &str) -> Result<(), FilterError> {
            Ok(())
        }
    }

    fn dispatcher() -> Dispatcher {
        Dispatcher::new("/mw", Arc::new(InsMap::new()), Arc::new(NoopFilter))
    }

    fn event(path: &str, value: Option<&str>) -> Event {
        Event { path: path.into(), value: value.map(String::from) }
    }

    #[test]
    fn ins_dom_id_binds_a_pending_instance_registered_by_the_supervisor() {
        let d = dispatcher();
        let pending = d.map.push_pending(Instance::new(Mac([0, 0x16, 0x3e, 0x28, 0x2a, 0x50])));
        d.dispatch(event("/mw/7/ins_dom_id", Some("7"))).unwrap();
        let bound = d.map.get(DomainId(7)).unwrap();
        assert!(Arc::ptr_eq(&pending, &bound));
        assert_eq!(bound.lock().mac(), Mac([0, 0x16, 0x3e, 0x28, 0x2a, 0x50]));
    }

    #[test]
    fn ins_dom_id_mismatching_the_path_is_rejected() {
        let d = dispatcher();
        let err = d.dispatch(event("/mw/7/ins_dom_id", Some("8"))).unwrap_err();
        assert!(matches!(err, DispatchError::DomainIdMismatch { .. }));
        assert!(d.map.get(DomainId(7)).is_none());
    }

    #[test]
    fn events_for_unknown_domains_are_rejected() {
        let d = dispatcher();
        let err = d.dispatch(event("/mw/9/heartbeat", None)).unwrap_err();
        assert!(matches!(err, DispatchError::UnknownDomainId(_)));
    }

    #[test]
    fn malformed_paths_are_rejected() {
        let d = dispatcher();
        let err = d.dispatch(event("/other/7/heartbeat", None)).unwrap_err();
        assert!(matches!(err, DispatchError::MalformedPath(_)));
    }

    #[test]
    fn listening_ports_parses_whitespace_separated_hex() {
        let d = dispatcher();
        d.dispatch(event("/mw/7/ins_dom_id", Some("7"))).unwrap();
        d.dispatch(event("/mw/7/ip_addrs", Some("10.0.0.5"))).unwrap();
        d.dispatch(event("/mw/7/listening_ports", Some("50 bb"))).unwrap();
        let instance = d.map.get(DomainId(7)).unwrap();
        assert!(instance.lock().has_forwarders());
    }

    #[test]
    fn heartbeat_updates_an_existing_instance() {
        let d = dispatcher();
        d.dispatch(event("/mw/7/ins_dom_id", Some("7"))).unwrap();
        d.dispatch(event("/mw/7/heartbeat", None)).unwrap();
    }
}
