//! Tracks feature requests awaiting a response.
//!
//! The sending side inserts under a freshly allocated id; the response
//! reader removes by id once the matching [`crate::wire::FeatureResponse`]
//! arrives. Ids wrap at 2^32 and skip any value still outstanding.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::feature::{self};
use crate::wire::FeatureResponse;

/// A feature request waiting on its response, plus what we sent so the
/// caller can interpret the reply.
#[derive(Debug, Clone)]
pub struct PendingRequest {
    pub name: u16,
    pub sockfd: u64,
}

#[derive(Default)]
struct Inner {
    next_id: u32,
    pending: HashMap<u32, PendingRequest>,
}

/// Thread-safe table of in-flight feature requests, shared between the
/// thread that sends requests and the thread that reads responses.
pub struct OutstandingRequestTable {
    inner: Mutex<Inner>,
}

impl Default for OutstandingRequestTable {
    fn default() -> Self {
        Self::new()
    }
}

impl OutstandingRequestTable {
    pub fn new() -> Self {
        OutstandingRequestTable {
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Allocate a fresh id and record the request pending under it.
    pub fn insert(&self, name: u16, sockfd: u64) -> u32 {
        let mut inner = self.inner.lock();
        let id = loop {
            let candidate = inner.next_id;
            inner.next_id = inner.next_id.wrapping_add(1);
            if !inner.pending.contains_key(&candidate) {
                break candidate;
            }
        };
        inner.pending.insert(id, PendingRequest { name, sockfd });
        id
    }

    /// Remove and return the pending request matching a response's id, if
    /// we are the one who sent it. Returns `None` for an id we never
    /// issued or already completed; callers should log and drop these.
    pub fn take(&self, id: u32) -> Option<PendingRequest> {
        self.inner.lock().pending.remove(&id)
    }

    /// Remove and return the request matching a decoded response.
    pub fn take_for_response(&self, response: &FeatureResponse) -> Option<PendingRequest> {
        self.take(response.base.id)
    }

    pub fn outstanding_count(&self) -> usize {
        self.inner.lock().pending.len()
    }
}

/// Human-readable name for a feature code, used in log lines.
pub fn feature_name(code: u16) -> &'static str {
    match code {
        feature::MT_CHANNEL_TRAFFIC_MONITOR_ON => "channel-traffic-monitor-on",
        feature::MT_CHANNEL_TRAFFIC_MONITOR_OFF => "channel-traffic-monitor-off",
        feature::MT_SOCK_ATTRIB_OPEN => "sock-open",
        feature::MT_SOCK_ATTRIB_OWNER_RUNNING => "sock-owner-running",
        feature::MT_SOCK_ATTRIB_SND_BUF => "sock-snd-buf",
        feature::MT_SOCK_ATTRIB_RCV_BUF => "sock-rcv-buf",
        feature::MT_SOCK_ATTRIB_SND_TIMEO => "sock-snd-timeo",
        feature::MT_SOCK_ATTRIB_RCV_TIMEO => "sock-rcv-timeo",
        feature::MT_SOCK_ATTRIB_SND_LOWAT => "sock-snd-lowat",
        feature::MT_SOCK_ATTRIB_RCV_LOWAT => "sock-rcv-lowat",
        feature::MT_SOCK_ATTRIB_SYSTEM_INS_CONGCTL => "system-congctl",
        feature::MT_SOCK_ATTRIB_SYSTEM_DELACK_TICKS => "system-delack-ticks",
        _ => "unknown",
    }
}
