//! Process-wide counters for the bridge.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Monotonic counters updated from every task. All loads and stores are
/// `Relaxed`; the values are for reporting only.
#[derive(Debug, Default)]
pub struct BridgeStats {
    opened: AtomicU64,
    closed: AtomicU64,
    rejected: AtomicU64,
    bytes_relayed: AtomicU64,
    payloads_dropped: AtomicU64,
    pings_sent: AtomicU64,
    evictions: AtomicU64,
}

/// Point-in-time copy of [`BridgeStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub opened: u64,
    pub closed: u64,
    pub rejected: u64,
    pub bytes_relayed: u64,
    pub payloads_dropped: u64,
    pub pings_sent: u64,
    pub evictions: u64,
}

impl BridgeStats {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.opened.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.closed.fetch_add(1, Ordering::Relaxed);
    }

    /// An upgrade was refused, e.g. because the registry was full.
    pub fn connection_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_relayed(&self, n: usize) {
        self.bytes_relayed.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn payload_dropped(&self) {
        self.payloads_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn ping_sent(&self) {
        self.pings_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// A connection was removed for being unresponsive.
    pub fn evicted(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            opened: self.opened.load(Ordering::Relaxed),
            closed: self.closed.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            bytes_relayed: self.bytes_relayed.load(Ordering::Relaxed),
            payloads_dropped: self.payloads_dropped.load(Ordering::Relaxed),
            pings_sent: self.pings_sent.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}
