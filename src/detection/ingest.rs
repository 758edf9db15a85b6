//! Packet Ingestion
//! ================
//! Drains the packet queue into the traffic counters under the sampling
//! policy and the managed-IP filter.
//!
//! Copyright © 2025 Stephen Bilodeau. All rights reserved.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::info;

use crate::config::NodeConfig;
use crate::detection::counters::TrafficCounters;
use crate::detection::membership::ManagedIps;
use crate::detection::PacketRecord;
use crate::metrics::{PACKETS_INGESTED_TOTAL, PACKETS_SAMPLED_OUT_TOTAL};

/// Whether a packet should be dropped for `draw` in `[0, 1)`.
///
/// Rate 1.0 keeps everything; rate 0.0 keeps only a draw of exactly zero.
pub fn is_sampling_skip(sampling_rate: f64, draw: f64) -> bool {
    draw > sampling_rate
}

/// Consumes packet records and updates the shared counters.
///
/// Never blocks on analysis; the queue is unbounded and the sampling rate
/// is the only shedding mechanism.
pub struct Ingestor {
    counters: Arc<TrafficCounters>,
    managed: Arc<ManagedIps>,
    sampling_rate: f64,
}

impl Ingestor {
    pub fn new(counters: Arc<TrafficCounters>, managed: Arc<ManagedIps>, config: &NodeConfig) -> Self {
        Ingestor {
            counters,
            managed,
            sampling_rate: config.sampling_rate,
        }
    }

    /// Run until the traffic source closes the queue.
    pub async fn run(&self, mut queue: mpsc::UnboundedReceiver<PacketRecord>) {
        info!("packet ingestion loop started");
        while let Some(packet) = queue.recv().await {
            self.observe(&packet);
        }
        info!("packet queue closed, ingestion loop exiting");
    }

    /// Account one packet with a fresh sampling draw.
    pub fn observe(&self, packet: &PacketRecord) {
        self.observe_sampled(packet, rand::random::<f64>());
    }

    fn observe_sampled(&self, packet: &PacketRecord, draw: f64) {
        if is_sampling_skip(self.sampling_rate, draw) {
            PACKETS_SAMPLED_OUT_TOTAL.inc();
            return;
        }
        PACKETS_INGESTED_TOTAL.inc();

        self.counters.record_dst(&packet.dst, &packet.src);
        if !self.managed.contains(&packet.src) {
            return;
        }
        self.counters.record_src(&packet.src, &packet.dst);
    }
}
