//! SentinelMesh Defense Node
//! =========================
//! The periodic victim-centric analysis loop and the housekeeping reaper.
//! Wires the counters, the shallow analysis, and the collaboration client
//! into one per-AS node.
//!
//! Copyright © 2025 Stephen Bilodeau. All rights reserved.

use std::sync::Arc;

use tracing::{debug, info};

use crate::collab::client::{CollabClient, RequestOrigin};
use crate::collab::message::{chunk_candidates, CollabRequest};
use crate::config::NodeConfig;
use crate::detection::analysis::{Analysis, AnalysisInput};
use crate::detection::counters::TrafficCounters;
use crate::metrics::{ANALYSIS_DURATION_SECONDS, ATTACKS_DETECTED_TOTAL, CORRELATION_REAPED_TOTAL};
use crate::mitigation::Mitigation;

/// One autonomous system's collaborative defense node.
pub struct SentinelNode {
    config: Arc<NodeConfig>,
    counters: Arc<TrafficCounters>,
    client: Arc<CollabClient>,
    attack_analysis: Arc<dyn Analysis>,
    mitigation: Arc<dyn Mitigation>,
}

impl SentinelNode {
    pub fn new(
        config: Arc<NodeConfig>,
        counters: Arc<TrafficCounters>,
        client: Arc<CollabClient>,
        attack_analysis: Arc<dyn Analysis>,
        mitigation: Arc<dyn Mitigation>,
    ) -> Self {
        SentinelNode {
            config,
            counters,
            client,
            attack_analysis,
            mitigation,
        }
    }

    pub fn client(&self) -> &Arc<CollabClient> {
        &self.client
    }

    /// Run the shallow analysis every `ANALYSIS_PERIOD` seconds, forever.
    pub async fn run_analysis(&self) {
        let mut tick: u64 = 0;
        loop {
            tick += 1;
            info!(tick, "running shallow analysis");
            self.analyze_window().await;
            tokio::time::sleep(self.config.analysis_interval()).await;
            debug!(tick, "analysis tick done");
        }
    }

    /// One shallow analysis tick over the current window.
    ///
    /// Scans every destination, publishes chunked collaboration requests
    /// for each detected victim (invoking the deep handler directly for
    /// this node's own requests), hands the suspected sources to the
    /// mitigation sink, then rotates the window.
    pub async fn analyze_window(&self) {
        let timer = ANALYSIS_DURATION_SECONDS.start_timer();

        // analysis runs over copies; ingestion keeps filling the live maps
        let dst_view = self.counters.dst_view();
        let src_view = self.counters.src_view();
        let aggregate_prev = self.counters.aggregate_prev();

        for (victim, sources) in &dst_view {
            let input = AnalysisInput {
                attacker_ip: "",
                victim_ip: victim,
                src_view: &src_view,
                dst_view: &dst_view,
                src_prev: None,
                dst_aggregate_prev: Some(&aggregate_prev),
            };
            let (detected, case, strength) = self.attack_analysis.run(&input).into_attack();
            if !detected {
                continue;
            }
            ATTACKS_DETECTED_TOTAL.with_label_values(&[case.as_str()]).inc();

            // probable vs highly certain attack; the check stays cheap
            let packets_to_victim: u64 = sources.values().sum();
            let bases = if self.config.topics_use_additional {
                self.config.as_topics.clone()
            } else if packets_to_victim > self.config.threshold_victim_hi {
                vec![self.config.topic_high.clone()]
            } else {
                vec![self.config.topic_low.clone()]
            };

            let candidates: Vec<String> = sources.keys().cloned().collect();
            info!(
                victim = %victim,
                case = %case.as_str(),
                strength,
                candidates = candidates.len(),
                "victim under attack"
            );

            for chunk in chunk_candidates(&candidates, self.config.msg_length) {
                let request = CollabRequest::new(
                    &self.config.as_name,
                    victim,
                    chunk,
                    case,
                    strength / self.config.as_size as f64,
                );
                self.client.publish_request(&request, &bases).await;
                // straight to the deep analysis, no bus roundtrip for our
                // own requests
                self.client
                    .handle_request(request, RequestOrigin::Local { topics: bases.clone() })
                    .await;
            }

            // light mitigation: everything that touched the victim
            self.mitigation.filter(&candidates);
        }

        self.counters.rotate_window();
        timer.observe_duration();
    }

    /// Periodically drop expired request/response correlation state.
    pub async fn run_reaper(&self) {
        let interval = self.config.reap_interval();
        let ttl = self.config.request_ttl();
        loop {
            tokio::time::sleep(interval).await;
            let (pending, ledger) = self.client.reap_correlation_state(ttl);
            if pending + ledger > 0 {
                CORRELATION_REAPED_TOTAL.inc_by((pending + ledger) as u64);
                info!(pending, ledger, "reaped expired correlation state");
            }
        }
    }
}
