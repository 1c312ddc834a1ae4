//! A single isolated network stack instance and its lifecycle state.

use std::net::IpAddr;
use std::time::{Duration, Instant};

use common::{DomainId, Mac};
use common::limits::{HEARTBEAT_GRACE_SEC, HEARTBEAT_INTERVAL_SEC, HEARTBEAT_MAX_MISSES};
use forwarder::{FilterError, Forwarder};
use tracing::{debug, info, warn};

use crate::stats::Stats;

/// Sticky overload marker: once set by the external trigger file, an
/// instance stays overloaded until explicitly deactivated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum OverloadState {
    #[default]
    Clear,
    Sticky,
}

/// All mutable state the supervisor tracks for one instance.
pub struct Instance {
    domain_id: Option<DomainId>,
    mac: Mac,
    address: Option<IpAddr>,
    stats: Stats,
    last_contact: Instant,
    missed_heartbeats: u32,
    forwarders: Vec<Forwarder>,
    active: bool,
    overload: OverloadState,
}

impl Instance {
    /// Creates a not-yet-registered instance holding `mac` until the bus
    /// reports the domain id the hypervisor assigned it.
    pub fn new(mac: Mac) -> Self {
        Instance {
            domain_id: None,
            mac,
            address: None,
            stats: Stats::default(),
            last_contact: Instant::now(),
            missed_heartbeats: 0,
            forwarders: Vec::new(),
            active: false,
            overload: OverloadState::Clear,
        }
    }

    pub fn domain_id(&self) -> Option<DomainId> {
        self.domain_id
    }

    pub fn bind_domain_id(&mut self, domain_id: DomainId) {
        self.domain_id = Some(domain_id);
    }

    pub fn mac(&self) -> Mac {
        self.mac
    }

    pub fn address(&self) -> Option<IpAddr> {
        self.address
    }

    pub fn set_address(&mut self, address: IpAddr) {
        self.address = Some(address);
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn stats(&self) -> Stats {
        self.stats
    }

    pub fn set_stats(&mut self, stats: Stats) {
        self.stats = stats;
        debug!(
            max = stats.max_sockets,
            used = stats.used_sockets,
            recv = stats.recv_bytes,
            sent = stats.sent_bytes,
            "stats updated"
        );
    }

    pub fn register_heartbeat(&mut self) {
        self.last_contact = Instant::now();
        self.missed_heartbeats = 0;
    }

    /// Returns `false` once the instance must be treated as dead.
    ///
    /// `now - last_contact <= interval * (missed + 1) + grace`; exceeding
    /// the deadline increments `missed_heartbeats`, and once that counter
    /// reaches the configured ceiling the instance is declared dead.
    pub fn check_heartbeat(&mut self, now: Instant) -> bool {
        let deadline = Duration::from_secs(HEARTBEAT_INTERVAL_SEC * u64::from(self.missed_heartbeats + 1) + HEARTBEAT_GRACE_SEC);
        if now.duration_since(self.last_contact) <= deadline {
            return true;
        }
        self.missed_heartbeats += 1;
        warn!(domain_id = ?self.domain_id, missed = self.missed_heartbeats, "instance missed a heartbeat");
        if self.missed_heartbeats >= HEARTBEAT_MAX_MISSES {
            warn!(domain_id = ?self.domain_id, "instance is now considered dead");
            return false;
        }
        true
    }

    /// Adds a forwarder for every port in `ports` not already forwarded.
    pub fn set_listening_ports(&mut self, ports: impl IntoIterator<Item = u16>, backend: &std::sync::Arc<dyn forwarder::PacketFilter>) {
        let Some(address) = self.address else {
            warn!("cannot add forwarders before an address is known");
            return;
        };
        for port in ports {
            if self.forwarders.iter().any(|f| f.external_port() == port) {
                continue;
            }
            self.forwarders.push(Forwarder::new(backend.clone(), port, address));
        }
    }

    /// Toggles every forwarder this instance owns. Refuses to activate an
    /// instance with no forwarders, matching the upstream guard against
    /// activating a listener-less instance.
    pub fn set_active(&mut self, activate: bool) -> Result<(), FilterError> {
        if activate && self.forwarders.is_empty() {
            return Ok(());
        }
        for forwarder in &mut self.forwarders {
            if activate {
                forwarder.activate()?;
            } else {
                forwarder.deactivate()?;
            }
        }
        self.active = activate;
        if !activate {
            self.overload = OverloadState::Clear;
        }
        info!(domain_id = ?self.domain_id, activate, "toggled instance activation");
        Ok(())
    }

    pub fn has_forwarders(&self) -> bool {
        !self.forwarders.is_empty()
    }

    /// Fraction of capacity in use, `0.0` if capacity has not been
    /// reported yet.
    pub fn load(&self) -> f64 {
        self.stats.load()
    }

    /// Marks this instance sticky-overloaded until it is next deactivated.
    /// Used by the trigger-file check in the balancer.
    pub fn mark_overloaded_sticky(&mut self) {
        self.overload = OverloadState::Sticky;
    }

    /// True if sticky-overloaded or if load has crossed `max_load`.
    pub fn overloaded(&self, max_load: f64) -> bool {
        self.overload == OverloadState::Sticky || self.load() >= max_load
    }
}
