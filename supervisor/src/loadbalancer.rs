//! Shifts load between instances, and tells the caller when none can
//! absorb any more.

use ins::InsMap;
use tracing::{debug, info, warn};

/// What the caller should do after a balancing pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceOutcome {
    /// Nothing further is needed this tick.
    Settled,
    /// Every instance is overloaded; the caller should spawn another.
    SpawnNew,
}

/// Routes load to the least busy instance when the current active one
/// is overloaded. Bootstraps by activating an arbitrary instance with
/// forwarders if none is active yet. Returns [`BalanceOutcome::SpawnNew`]
/// only when every live instance is overloaded.
pub fn balance_load(map: &InsMap, max_load: f64) -> BalanceOutcome {
    let entries = map.entries();
    if entries.is_empty() {
        return BalanceOutcome::Settled;
    }

    let active: Vec<_> = entries
        .iter()
        .filter(|(_, instance)| instance.lock().is_active())
        .collect();

    let current = match active.first() {
        Some((_, instance)) => instance.clone(),
        None => {
            let (domain_id, instance) = &entries[0];
            if let Err(err) = instance.lock().set_active(true) {
                warn!(%domain_id, %err, "failed to bootstrap the first active instance");
            }
            instance.clone()
        }
    };

    if !current.lock().overloaded(max_load) {
        return BalanceOutcome::Settled;
    }

    debug!(load = current.lock().load(), "active instance is overloaded, looking for another");

    let non_overloaded: Vec<_> = entries
        .iter()
        .filter(|(_, instance)| !instance.lock().overloaded(max_load))
        .collect();

    if non_overloaded.is_empty() {
        info!("every instance is overloaded");
        return BalanceOutcome::SpawnNew;
    }

    let candidates: Vec<_> = non_overloaded
        .into_iter()
        .filter(|(_, instance)| instance.lock().has_forwarders())
        .collect();

    let Some((domain_id, winner)) = candidates
        .into_iter()
        .min_by(|a, b| a.1.lock().load().partial_cmp(&b.1.lock().load()).unwrap())
    else {
        // Every non-overloaded instance is still waiting on its first
        // listen event; nothing to shift to yet.
        return BalanceOutcome::Settled;
    };

    info!(%domain_id, "directing traffic to the least loaded instance");
    if let Err(err) = winner.lock().set_active(true) {
        warn!(%domain_id, %err, "failed to activate replacement instance");
        return BalanceOutcome::Settled;
    }
    if let Err(err) = current.lock().set_active(false) {
        warn!(%err, "failed to deactivate the previously active instance");
    }

    BalanceOutcome::Settled
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{DomainId, Mac};
    use forwarder::{Forwarder, PacketFilter, Table};
    use ins::{Instance, Stats};
    use std::net::IpAddr;
    use std::sync::Arc;

    struct NoopFilter;
    impl PacketFilter for NoopFilter {
        fn insert_rule(&self, _table: Table, _chain: &str, _rule: &str) -> Result<(), forwarder::FilterError> {
            Ok(())
        }
        fn delete_rule(&self, _table: Table, _chain: &str, _rule: &str) -> Result<(), forwarder::FilterError> {
            Ok(())
        }
    }

    fn instance_with_load(id: u32, used: u64, max: u64) -> (DomainId, Instance) {
        let mut instance = Instance::new(Mac([0, 0, 0, 0, 0, id as u8]));
        let backend: Arc<dyn PacketFilter> = Arc::new(NoopFilter);
        instance.set_address("10.0.0.1".parse::<IpAddr>().unwrap());
        instance.set_listening_ports([80], &backend);
        instance.set_stats(Stats { max_sockets: max, used_sockets: used, recv_bytes: 0, sent_bytes: 0 });
        (DomainId(id), instance)
    }

    #[test]
    fn bootstraps_by_activating_the_only_instance() {
        let map = InsMap::new();
        let (id, instance) = instance_with_load(1, 0, 100);
        map.bind_domain_id(id, || instance);

        let outcome = balance_load(&map, 0.8);
        assert_eq!(outcome, BalanceOutcome::Settled);
        assert!(map.get(id).unwrap().lock().is_active());
    }

    #[test]
    fn no_op_when_active_instance_is_not_overloaded() {
        let map = InsMap::new();
        let (id, instance) = instance_with_load(1, 10, 100);
        map.bind_domain_id(id, || instance);
        balance_load(&map, 0.8);

        let outcome = balance_load(&map, 0.8);
        assert_eq!(outcome, BalanceOutcome::Settled);
    }

    #[test]
    fn shifts_to_the_least_loaded_candidate_when_overloaded() {
        let map = InsMap::new();
        let (busy_id, busy) = instance_with_load(1, 95, 100);
        let (idle_id, idle) = instance_with_load(2, 5, 100);
        map.bind_domain_id(busy_id, || busy);
        map.bind_domain_id(idle_id, || idle);

        map.get(busy_id).unwrap().lock().set_active(true).unwrap();
        let outcome = balance_load(&map, 0.8);

        assert_eq!(outcome, BalanceOutcome::Settled);
        assert!(map.get(idle_id).unwrap().lock().is_active());
        assert!(!map.get(busy_id).unwrap().lock().is_active());
    }

    #[test]
    fn signals_spawn_new_when_everything_is_overloaded() {
        let map = InsMap::new();
        let (id, instance) = instance_with_load(1, 99, 100);
        map.bind_domain_id(id, || instance);
        map.get(id).unwrap().lock().set_active(true).unwrap();

        let outcome = balance_load(&map, 0.8);
        assert_eq!(outcome, BalanceOutcome::SpawnNew);
    }
}
