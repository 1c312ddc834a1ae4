//! The main supervisor loop: spawns instances as needed, reaps dead
//! ones, and hands load balancing off to [`crate::loadbalancer`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use common::limits::SUPERVISOR_POLL_MS;
use common::{Mac, MacPool, ShutdownFlag};
use ins::{Instance, InsMap};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::hypervisor::Hypervisor;
use crate::loadbalancer::{balance_load, BalanceOutcome};

/// Runtime knobs the caller derives from validated configuration.
pub struct RunnerConfig {
    pub max_ins_load: f64,
    pub max_ins_count: usize,
    pub start_all_ins_instances: bool,
    pub monitor_interval: Option<Duration>,
}

/// Drives instance lifecycle: spawning, heartbeat reaping, and load
/// balancing, until `shutdown` is set.
pub struct Runner {
    config: RunnerConfig,
    map: Arc<InsMap>,
    macs: Arc<Mutex<MacPool>>,
    hypervisor: Arc<dyn Hypervisor>,
}

impl Runner {
    pub fn new(
        config: RunnerConfig,
        map: Arc<InsMap>,
        macs: Arc<Mutex<MacPool>>,
        hypervisor: Arc<dyn Hypervisor>,
    ) -> Self {
        Runner { config, map, macs, hypervisor }
    }

    /// Allocate a MAC, queue a pending instance for it, and ask the
    /// hypervisor to spawn it. On hypervisor failure the MAC is
    /// released and no pending entry is left behind.
    fn spawn_one(&self, ordinal: usize) {
        let mac = match self.macs.lock().alloc() {
            Ok(mac) => mac,
            Err(err) => {
                warn!(%err, "cannot spawn another instance, MAC pool exhausted");
                return;
            }
        };
        let name = format!("mw-ins-{ordinal:04x}");
        if let Err(err) = self.hypervisor.spawn(&mac, &name) {
            warn!(%err, %mac, "hypervisor failed to spawn instance");
            self.macs.lock().release(mac);
            return;
        }
        self.map.push_pending(Instance::new(mac));
        debug!(%mac, name, "spawned new instance ({} of {})", self.map.pending_count() + self.map.len(), self.config.max_ins_count);
    }

    fn reap_dead_instances(&self) {
        let now = Instant::now();
        for (domain_id, instance) in self.map.entries() {
            let alive = instance.lock().check_heartbeat(now);
            if alive {
                continue;
            }
            let mac = instance.lock().mac();
            self.map.remove(domain_id);
            if let Err(err) = self.hypervisor.destroy(domain_id.0) {
                warn!(%domain_id, %err, "hypervisor failed to destroy a dead instance");
            }
            self.macs.lock().release(mac);
            info!(%domain_id, "reaped a dead instance");
        }
    }

    fn total_instance_count(&self) -> usize {
        self.map.len() + self.map.pending_count()
    }

    /// Runs the supervisor loop until shutdown is requested.
    pub fn run(&self, shutdown: &ShutdownFlag) {
        if self.config.start_all_ins_instances {
            while self.total_instance_count() < self.config.max_ins_count && !shutdown.is_set() {
                self.spawn_one(self.total_instance_count());
            }
        }

        let mut spawn_new = !self.config.start_all_ins_instances;
        let mut monitor_elapsed = Duration::ZERO;
        let poll_interval = Duration::from_millis(SUPERVISOR_POLL_MS);

        while !shutdown.is_set() {
            if spawn_new && self.total_instance_count() < self.config.max_ins_count {
                spawn_new = false;
                self.spawn_one(self.total_instance_count());
            }

            self.reap_dead_instances();

            spawn_new = matches!(
                balance_load(&self.map, self.config.max_ins_load),
                BalanceOutcome::SpawnNew
            );

            std::thread::sleep(poll_interval);

            if let Some(interval) = self.config.monitor_interval {
                monitor_elapsed += poll_interval;
                if monitor_elapsed >= interval {
                    monitor_elapsed = Duration::ZERO;
                    for (domain_id, instance) in self.map.entries() {
                        info!(%domain_id, load = instance.lock().load(), "periodic load report");
                    }
                }
            }
        }
    }
}

/// Spawns the supervisor loop on a dedicated OS thread.
pub fn spawn_runner(
    config: RunnerConfig,
    map: Arc<InsMap>,
    macs: Arc<Mutex<MacPool>>,
    hypervisor: Arc<dyn Hypervisor>,
    shutdown: ShutdownFlag,
) -> std::thread::JoinHandle<()> {
    std::thread::Builder::new()
        .name("mw-supervisor".into())
        .spawn(move || {
            let runner = Runner::new(config, map, macs, hypervisor);
            runner.run(&shutdown);
        })
        .expect("spawning supervisor thread")
}
