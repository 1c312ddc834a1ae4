//! Process-wide instance table and the pre-registration queue feeding it.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use common::DomainId;
use parking_lot::{Mutex, RwLock};

use crate::instance::Instance;

pub type SharedInstance = Arc<Mutex<Instance>>;

/// Holds every instance the supervisor knows about, keyed by domain id,
/// plus the FIFO of instances spawned but not yet assigned one.
///
/// An instance may be registered from either side: the supervisor queues
/// it here the moment it spawns one (before a domain id exists), or the
/// bus watcher sees an `ins_dom_id` event with no matching queue entry and
/// registers it directly. [`InsMap::bind_domain_id`] unifies both paths.
#[derive(Default)]
pub struct InsMap {
    live: RwLock<HashMap<DomainId, SharedInstance>>,
    pending: Mutex<VecDeque<SharedInstance>>,
}

impl InsMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a freshly spawned, not-yet-registered instance.
    pub fn push_pending(&self, instance: Instance) -> SharedInstance {
        let shared = Arc::new(Mutex::new(instance));
        self.pending.lock().push_back(shared.clone());
        shared
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Binds `domain_id` to the oldest pending instance, or to
    /// `fallback` if the queue is empty, then inserts it into the live
    /// table.
    pub fn bind_domain_id(&self, domain_id: DomainId, fallback: impl FnOnce() -> Instance) -> SharedInstance {
        let popped = self.pending.lock().pop_front();
        let shared = popped.unwrap_or_else(|| Arc::new(Mutex::new(fallback())));
        shared.lock().bind_domain_id(domain_id);
        self.live.write().insert(domain_id, shared.clone());
        shared
    }

    pub fn get(&self, domain_id: DomainId) -> Option<SharedInstance> {
        self.live.read().get(&domain_id).cloned()
    }

    pub fn remove(&self, domain_id: DomainId) -> Option<SharedInstance> {
        self.live.write().remove(&domain_id)
    }

    pub fn domain_ids(&self) -> Vec<DomainId> {
        self.live.read().keys().copied().collect()
    }

    pub fn entries(&self) -> Vec<(DomainId, SharedInstance)> {
        self.live.read().iter().map(|(id, inst)| (*id, inst.clone())).collect()
    }

    pub fn len(&self) -> usize {
        self.live.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.read().is_empty()
    }
}
