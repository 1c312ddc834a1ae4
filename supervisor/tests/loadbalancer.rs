//! End-to-end scenario tests wiring the dispatcher, the instance table,
//! and the load balancer together the way `distro`'s main loop does.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use common::{DomainId, Mac, MacPool, ShutdownFlag};
use forwarder::{FilterError, PacketFilter, Table};
use ins::{Instance, InsMap};
use kv::Event;
use mw_supervisor as supervisor;
use supervisor::{balance_load, BalanceOutcome, Dispatcher, Hypervisor, HypervisorError, Runner, RunnerConfig};

struct NoopFilter;
impl PacketFilter for NoopFilter {
    fn insert_rule(&self, _table: Table, _chain: &str, _rule: &str) -> Result<(), FilterError> {
        Ok(())
    }
    fn delete_rule(&self, _table: Table, _chain: &str, _rule: &str) -> Result<(), FilterError> {
        Ok(())
    }
}

fn event(path: &str, value: &str) -> Event {
    Event { path: path.into(), value: Some(value.into()) }
}

/// S1 — first INS becomes active: the dispatcher learns a pending
/// instance's domain id, address and listening ports off the bus, and
/// the balancer's bootstrap case activates it on the next pass.
#[test]
fn s1_first_instance_becomes_active_after_bootstrap_sequence() {
    let map = Arc::new(InsMap::new());
    let backend: Arc<dyn PacketFilter> = Arc::new(NoopFilter);
    let dispatcher = Dispatcher::new("/mw", map.clone(), backend);

    map.push_pending(Instance::new(Mac([0, 0x16, 0x3e, 0x28, 0x2a, 0x50])));

    dispatcher.dispatch(event("/mw/7/ins_dom_id", "7")).unwrap();
    dispatcher.dispatch(event("/mw/7/ip_addrs", "10.0.0.5")).unwrap();
    dispatcher.dispatch(event("/mw/7/listening_ports", "50 bb")).unwrap();

    let instance = map.get(DomainId(7)).unwrap();
    assert!(instance.lock().has_forwarders());
    assert!(!instance.lock().is_active());

    let outcome = balance_load(&map, 0.8);
    assert_eq!(outcome, BalanceOutcome::Settled);
    assert!(map.get(DomainId(7)).unwrap().lock().is_active());
}

/// S2 — overload handoff: once the active instance crosses the load
/// threshold, the balancer activates the other forwarder-bearing
/// instance and deactivates the overloaded one.
#[test]
fn s2_overloaded_active_instance_hands_off_to_the_idle_one() {
    let map = Arc::new(InsMap::new());
    let backend: Arc<dyn PacketFilter> = Arc::new(NoopFilter);
    let dispatcher = Dispatcher::new("/mw", map.clone(), backend);

    for (domain_id, mac_low) in [(1u32, 0x50u8), (2u32, 0x51u8)] {
        map.push_pending(Instance::new(Mac([0, 0x16, 0x3e, 0x28, 0x2a, mac_low])));
        let path = format!("/mw/{domain_id}");
        dispatcher.dispatch(event(&format!("{path}/ins_dom_id"), &domain_id.to_string())).unwrap();
        dispatcher.dispatch(event(&format!("{path}/ip_addrs"), "10.0.0.5")).unwrap();
        dispatcher.dispatch(event(&format!("{path}/listening_ports"), "50")).unwrap();
    }

    // Bootstrap: the balancer activates whichever instance comes first.
    assert_eq!(balance_load(&map, 0.5), BalanceOutcome::Settled);
    let active_id = map
        .entries()
        .into_iter()
        .find(|(_, instance)| instance.lock().is_active())
        .map(|(id, _)| id)
        .expect("bootstrap should activate one instance");
    let idle_id = DomainId(if active_id == DomainId(1) { 2 } else { 1 });

    let path = format!("/mw/{}", active_id.0);
    dispatcher.dispatch(event(&format!("{path}/network_stats"), "100:90:0:0")).unwrap();

    let outcome = balance_load(&map, 0.5);
    assert_eq!(outcome, BalanceOutcome::Settled);
    assert!(map.get(idle_id).unwrap().lock().is_active());
    assert!(!map.get(active_id).unwrap().lock().is_active());
}

/// S3 — heartbeat death: an instance with no heartbeat past its
/// deadline is reaped by the running supervisor loop, its hypervisor
/// domain destroyed, and its MAC returned to the pool.
#[test]
fn s3_missed_heartbeats_reap_the_instance() {
    struct CountingHypervisor {
        destroys: AtomicUsize,
    }
    impl Hypervisor for CountingHypervisor {
        fn spawn(&self, _mac: &Mac, _name: &str) -> Result<(), HypervisorError> {
            Ok(())
        }
        fn destroy(&self, _domain_id: u32) -> Result<(), HypervisorError> {
            self.destroys.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    let map = Arc::new(InsMap::new());
    let macs = Arc::new(Mutex::new(MacPool::default_pool()));
    let mac = macs.lock().alloc().unwrap();
    // No heartbeat is ever registered for this instance; the runner's own
    // reaper drives `missed_heartbeats` up from real elapsed time alone.
    map.bind_domain_id(DomainId(1), || Instance::new(mac));

    let hv = Arc::new(CountingHypervisor { destroys: AtomicUsize::new(0) });
    // max_ins_count matches the single instance already registered above,
    // so the loop's own spawn path never fires and only the reaper acts.
    let config = RunnerConfig {
        max_ins_load: 0.8,
        max_ins_count: 1,
        start_all_ins_instances: false,
        monitor_interval: None,
    };
    let runner = Runner::new(config, map.clone(), macs.clone(), hv.clone());
    let shutdown = ShutdownFlag::new();
    let loop_shutdown = shutdown.clone();
    let handle = std::thread::spawn(move || runner.run(&loop_shutdown));

    // With the default heartbeat constants (5s interval, 3 misses, 1s
    // grace) the deadline crosses the third miss just past 16s of real
    // silence; give it margin for scheduling jitter.
    std::thread::sleep(Duration::from_secs(18));
    shutdown.trigger();
    handle.join().expect("supervisor loop should exit cleanly");

    assert_eq!(hv.destroys.load(Ordering::SeqCst), 1);
    assert!(map.is_empty());
    assert_eq!(macs.lock().in_use_count(), 0);
}

/// S6 — pre-registration race: the dispatcher must bind an `ins_dom_id`
/// event to the oldest pre-registered pending instance, not a fresh
/// one, and must keep that instance's originally allocated MAC.
#[test]
fn s6_ins_dom_id_binds_the_queued_pre_registration_not_a_fresh_record() {
    let map = Arc::new(InsMap::new());
    let backend: Arc<dyn PacketFilter> = Arc::new(NoopFilter);
    let dispatcher = Dispatcher::new("/mw", map.clone(), backend);

    let claimed_mac = Mac([0, 0x16, 0x3e, 0x28, 0x2a, 0x51]);
    let pending = map.push_pending(Instance::new(claimed_mac));

    dispatcher.dispatch(event("/mw/9/ins_dom_id", "9")).unwrap();

    let bound = map.get(DomainId(9)).unwrap();
    assert!(Arc::ptr_eq(&pending, &bound));
    assert_eq!(bound.lock().mac(), claimed_mac);
    assert_eq!(map.pending_count(), 0);
}
