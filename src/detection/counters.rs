//! Traffic Counters
//! ================
//! Two-level packet counters for the current analysis window plus the
//! snapshots of the previous window the analyses compare against.
//!
//! Copyright © 2025 Stephen Bilodeau. All rights reserved.

use std::collections::{BTreeMap, HashMap};

use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::debug;

/// Owned snapshot of a two-level counter: outer key → inner key → packets.
///
/// Ordered maps keep a victim's candidate list stable, which fixes the
/// chunk sequence observed on the bus within a tick.
pub type CounterView = BTreeMap<String, BTreeMap<String, u64>>;

/// Shared traffic accounting for one node.
///
/// The destination perspective counts packets toward each destination per
/// source; the source perspective counts packets from each *managed* source
/// per destination. Both cover the current window only. Analyses never read
/// the live maps: they take an owned view and iterate outside the locks.
pub struct TrafficCounters {
    dst: DashMap<String, BTreeMap<String, u64>>,
    src: DashMap<String, BTreeMap<String, u64>>,
    src_prev: RwLock<CounterView>,
    dst_aggregate_prev: RwLock<HashMap<String, u64>>,
}

impl TrafficCounters {
    pub fn new() -> Self {
        TrafficCounters {
            dst: DashMap::new(),
            src: DashMap::new(),
            src_prev: RwLock::new(CounterView::new()),
            dst_aggregate_prev: RwLock::new(HashMap::new()),
        }
    }

    /// Count one packet toward `dst` from `src`.
    pub fn record_dst(&self, dst: &str, src: &str) {
        let mut sources = self.dst.entry(dst.to_string()).or_default();
        *sources.entry(src.to_string()).or_insert(0) += 1;
    }

    /// Count one packet from managed source `src` toward `dst`.
    pub fn record_src(&self, src: &str, dst: &str) {
        let mut destinations = self.src.entry(src.to_string()).or_default();
        *destinations.entry(dst.to_string()).or_insert(0) += 1;
    }

    /// Owned copy of the destination perspective.
    pub fn dst_view(&self) -> CounterView {
        self.dst
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Owned copy of the source perspective.
    pub fn src_view(&self) -> CounterView {
        self.src
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Owned copy of the source perspective of the previous window.
    pub fn src_prev_view(&self) -> CounterView {
        self.src_prev.read().clone()
    }

    /// Per-destination packet totals of the previous window.
    pub fn aggregate_prev(&self) -> HashMap<String, u64> {
        self.dst_aggregate_prev.read().clone()
    }

    /// Close the current window: capture the per-destination totals, keep a
    /// deep copy of the source perspective, and clear both live maps.
    ///
    /// Called exactly once per analysis tick, after all publications for
    /// that tick have gone out.
    pub fn rotate_window(&self) {
        let aggregate: HashMap<String, u64> = self
            .dst
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().values().sum()))
            .collect();
        *self.dst_aggregate_prev.write() = aggregate;

        let prev: CounterView = self
            .src
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        *self.src_prev.write() = prev;

        self.dst.clear();
        self.src.clear();
        debug!("analysis window rotated");
    }

    /// Number of destinations seen in the current window.
    pub fn dst_len(&self) -> usize {
        self.dst.len()
    }

    /// Number of managed sources seen in the current window.
    pub fn src_len(&self) -> usize {
        self.src.len()
    }
}

impl Default for TrafficCounters {
    fn default() -> Self {
        Self::new()
    }
}
