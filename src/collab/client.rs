//! Collaboration Client
//! ====================
//! The REQ/RES protocol engine: consumes peer traffic from the bus,
//! confirms heavy hitters among locally managed candidates, publishes
//! responses, and tallies peer responses into reputation and the
//! heavy-hitter table.
//!
//! Copyright © 2025 Stephen Bilodeau. All rights reserved.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::collab::bus::{BusConsumer, BusProducer, BusRecord};
use crate::collab::message::{
    base_topic, request_topic, response_topic, CollabRequest, CollabResponse, Decision, Detection,
    REQ_SUFFIX, RES_SUFFIX,
};
use crate::collab::reputation::{
    PendingRequests, ReputationBook, ResponseLedger, PREMITIGATION_TRUST_FLOOR,
};
use crate::config::NodeConfig;
use crate::detection::analysis::{Analysis, AnalysisInput};
use crate::detection::counters::{CounterView, TrafficCounters};
use crate::detection::membership::{HeavyHitterTable, ManagedIps};
use crate::metrics::{COLLAB_REQUESTS_TOTAL, COLLAB_RESPONSES_TOTAL};
use crate::mitigation::Mitigation;

/// Where a collaboration request entered this node.
///
/// Local requests come straight from the shallow analyzer, skipping the
/// bus roundtrip; bus requests arrived on one suffixed topic and answer
/// back on that topic's base.
pub enum RequestOrigin {
    Local { topics: Vec<String> },
    Bus { topic: String, high_priority: bool },
}

/// Protocol state machine shared by the analysis loop and the consumer loop.
pub struct CollabClient {
    config: Arc<NodeConfig>,
    counters: Arc<TrafficCounters>,
    managed: Arc<ManagedIps>,
    attacker_analysis: Arc<dyn Analysis>,
    mitigation: Arc<dyn Mitigation>,
    producer: Arc<dyn BusProducer>,
    pending: PendingRequests,
    ledger: ResponseLedger,
    reputation: ReputationBook,
    heavy_hitters: HeavyHitterTable,
}

impl CollabClient {
    pub fn new(
        config: Arc<NodeConfig>,
        counters: Arc<TrafficCounters>,
        managed: Arc<ManagedIps>,
        attacker_analysis: Arc<dyn Analysis>,
        mitigation: Arc<dyn Mitigation>,
        producer: Arc<dyn BusProducer>,
    ) -> Self {
        CollabClient {
            config,
            counters,
            managed,
            attacker_analysis,
            mitigation,
            producer,
            pending: PendingRequests::new(),
            ledger: ResponseLedger::new(),
            reputation: ReputationBook::new(),
            heavy_hitters: HeavyHitterTable::new(),
        }
    }

    pub fn pending(&self) -> &PendingRequests {
        &self.pending
    }

    pub fn ledger(&self) -> &ResponseLedger {
        &self.ledger
    }

    pub fn reputation(&self) -> &ReputationBook {
        &self.reputation
    }

    pub fn heavy_hitters(&self) -> &HeavyHitterTable {
        &self.heavy_hitters
    }

    /// Consume bus records until the subscription closes.
    pub async fn listen(&self, mut consumer: Box<dyn BusConsumer>) {
        info!("collaboration consumer loop started");
        while let Some(record) = consumer.poll().await {
            self.dispatch(record).await;
        }
        info!("bus subscription closed, consumer loop exiting");
    }

    /// Route one bus record by its topic suffix. Malformed payloads are
    /// dropped with a warning and update no state.
    pub async fn dispatch(&self, record: BusRecord) {
        let topic = record.topic;
        if topic.ends_with(REQ_SUFFIX) {
            match serde_json::from_slice::<CollabRequest>(&record.payload) {
                Ok(request) => {
                    let high_priority = base_topic(&topic) == self.config.topic_high;
                    self.handle_request(request, RequestOrigin::Bus { topic, high_priority })
                        .await;
                }
                Err(error) => warn!(%topic, %error, "dropping malformed collaboration request"),
            }
        } else if topic.ends_with(RES_SUFFIX) {
            match serde_json::from_slice::<CollabResponse>(&record.payload) {
                Ok(response) => self.handle_response(response),
                Err(error) => warn!(%topic, %error, "dropping malformed collaboration response"),
            }
        } else {
            warn!(%topic, "record on unexpected topic, ignoring");
        }
    }

    /// Publish a request on every base topic (in order) and remember it
    /// for response correlation.
    pub async fn publish_request(&self, request: &CollabRequest, bases: &[String]) {
        for base in bases {
            let topic = request_topic(base);
            info!(
                as_name = %self.config.as_name,
                %topic,
                request_id = %request.request_id,
                victim = %request.potential_victim,
                "sending collaboration request"
            );
            self.publish_json(&topic, request.request_id.as_bytes(), request).await;
        }
        self.pending.insert(request);
    }

    /// Answer a collaboration request.
    ///
    /// Verifies for each candidate this AS manages whether it is a heavy
    /// hitter against the named victim, then publishes the verdict on the
    /// reply topics and hands confirmed attackers to the mitigation sink.
    pub async fn handle_request(&self, request: CollabRequest, origin: RequestOrigin) {
        let (reply_topics, via_bus, high_priority) = match origin {
            RequestOrigin::Local { topics } => (topics, false, false),
            RequestOrigin::Bus { topic, high_priority } => {
                (vec![base_topic(&topic)], true, high_priority)
            }
        };

        // own request echoed back by the broker
        if via_bus && request.request_originator == self.config.as_name {
            return;
        }

        // handler-entry snapshots; ingestion keeps running underneath
        let dst_view = self.counters.dst_view();
        let src_view = self.counters.src_view();
        let src_prev = self.counters.src_prev_view();

        info!(
            as_name = %self.config.as_name,
            originator = %request.request_originator,
            request_id = %request.request_id,
            victim = %request.potential_victim,
            topics = ?reply_topics,
            "handling collaboration request"
        );
        self.pending.insert(&request);
        COLLAB_REQUESTS_TOTAL
            .with_label_values(&[if via_bus { "bus" } else { "local" }])
            .inc();

        // trusted high-priority originators get mitigation before analysis
        if high_priority && self.reputation.score(&request.request_originator) > PREMITIGATION_TRUST_FLOOR
        {
            self.mitigation.filter(&request.potential_attacker_ips);
        }

        let mut ack_attacker: Vec<String> = Vec::new();
        let mut not_attacker: Vec<String> = Vec::new();
        let mut not_managed: Vec<String> = Vec::new();

        let decision = if !self.exceeds_local_threshold(&request) {
            Decision::NotAck
        } else {
            let victim = request.potential_victim.as_str();
            let mut peak_flow_to_victim: u64 = 0;
            for candidate in &request.potential_attacker_ips {
                if !self.managed.contains(candidate) {
                    not_managed.push(candidate.clone());
                    continue;
                }
                peak_flow_to_victim = peak_flow_to_victim
                    .max(flow(&src_view, candidate, victim))
                    .max(flow(&src_prev, candidate, victim));

                let input = AnalysisInput {
                    attacker_ip: candidate,
                    victim_ip: victim,
                    src_view: &src_view,
                    dst_view: &dst_view,
                    src_prev: Some(&src_prev),
                    dst_aggregate_prev: None,
                };
                if self.attacker_analysis.run(&input).is_detected() {
                    ack_attacker.push(candidate.clone());
                } else {
                    not_attacker.push(candidate.clone());
                }
            }
            debug!(peak_flow_to_victim, "largest per-source flow toward this victim");

            if not_managed.len() == request.potential_attacker_ips.len() {
                Decision::NotManaged
            } else if ack_attacker.is_empty() {
                Decision::UnderThrs
            } else {
                Decision::Found
            }
        };

        let response = CollabResponse {
            ack_potential_attacker_ips: ack_attacker,
            decision,
            as_name: self.config.as_name.clone(),
            request_id: request.request_id.clone(),
            request_originator: request.request_originator.clone(),
        };

        info!(
            request_id = %response.request_id,
            decision = %decision.as_str(),
            not_managed = not_managed.len(),
            not_attacker = not_attacker.len(),
            acknowledged = response.ack_potential_attacker_ips.len(),
            "collaboration verdict"
        );

        for base in &reply_topics {
            let topic = response_topic(base);
            info!(
                as_name = %self.config.as_name,
                %topic,
                request_id = %response.request_id,
                "sending collaboration response"
            );
            self.publish_json(&topic, response.request_id.as_bytes(), &response).await;
        }
        self.mitigation.filter(&response.ack_potential_attacker_ips);
    }

    /// Tally a peer's response.
    pub fn handle_response(&self, response: CollabResponse) {
        self.ledger.record(&response);
        COLLAB_RESPONSES_TOTAL
            .with_label_values(&[response.decision.as_str()])
            .inc();

        info!(
            request_id = %response.request_id,
            responder = %response.as_name,
            decision = %response.decision.as_str(),
            "handling collaboration response"
        );

        match response.decision {
            Decision::Found => {
                self.mitigation.filter(&response.ack_potential_attacker_ips);
                if response.request_originator == self.config.as_name {
                    self.reputation.credit(&response.as_name);
                }
                self.heavy_hitters.record(&response.ack_potential_attacker_ips);
            }
            Decision::NotAck => {
                // a peer rejected a detection; only our own detections
                // should cost them trust
                if response.request_originator == self.config.as_name {
                    self.reputation.penalize(&response.as_name);
                }
            }
            Decision::UnderThrs | Decision::NotManaged | Decision::Unknown => {}
        }
    }

    /// Would the flows behind this request also trigger this AS's own
    /// threshold for the declared detection case, once rescaled to local
    /// AS size?
    fn exceeds_local_threshold(&self, request: &CollabRequest) -> bool {
        let scaled = self.config.as_size as f64 * request.requests_relative_to_size;
        match request.request_detection {
            Detection::Threshold => scaled > self.config.threshold_victim_lo as f64,
            Detection::TrafficIncrease => scaled > self.config.threshold_victim_time_percentage,
            Detection::None => false,
        }
    }

    /// Drop expired correlation state; returns (pending, ledger) removals.
    pub fn reap_correlation_state(&self, ttl: Duration) -> (usize, usize) {
        (self.pending.reap(ttl), self.ledger.reap(ttl))
    }

    async fn publish_json<T: Serialize>(&self, topic: &str, key: &[u8], value: &T) {
        let payload = match serde_json::to_vec(value) {
            Ok(payload) => payload,
            Err(error) => {
                warn!(%topic, %error, "failed to encode bus payload");
                return;
            }
        };
        // fire and forget: the bus client owns retries
        if let Err(error) = self.producer.publish(topic, key, &payload).await {
            warn!(%topic, %error, "bus publish failed");
        }
    }
}

fn flow(view: &CounterView, from: &str, to: &str) -> u64 {
    view.get(from).and_then(|inner| inner.get(to)).copied().unwrap_or(0)
}
