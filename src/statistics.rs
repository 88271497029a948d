//! Operational counters. No Prometheus exporter: nothing here is reachable
//! over an HTTP surface, since this engine doesn't define one — these are
//! plain `AtomicU64`s an embedder can read back for its own logging or
//! health endpoint.

use std::sync::atomic::{AtomicU64, Ordering};

use ahash::HashMap;
use parking_lot::Mutex;
use service::handler::RequestKind;

#[derive(Default)]
pub struct Statistics {
    sessions_accepted: AtomicU64,
    protocol_violations: AtomicU64,
    checked_in_displacements: AtomicU64,
    dispatched: Mutex<HashMap<RequestKind, u64>>,
}

impl Statistics {
    pub fn record_session_accepted(&self) {
        self.sessions_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_protocol_violation(&self) {
        self.protocol_violations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_checked_in_displacement(&self) {
        self.checked_in_displacements.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dispatch(&self, kind: RequestKind) {
        *self.dispatched.lock().entry(kind).or_insert(0) += 1;
    }

    pub fn sessions_accepted(&self) -> u64 {
        self.sessions_accepted.load(Ordering::Relaxed)
    }

    pub fn protocol_violations(&self) -> u64 {
        self.protocol_violations.load(Ordering::Relaxed)
    }

    pub fn checked_in_displacements(&self) -> u64 {
        self.checked_in_displacements.load(Ordering::Relaxed)
    }

    pub fn dispatched_count(&self, kind: RequestKind) -> u64 {
        self.dispatched.lock().get(&kind).copied().unwrap_or(0)
    }
}
