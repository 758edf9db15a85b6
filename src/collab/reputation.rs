//! Reputation & Correlation State
//! ==============================
//! Per-peer trust scores and the request/response correlation maps, with
//! TTL-based reaping so the maps stay bounded on a long-lived node.
//!
//! Copyright © 2025 Stephen Bilodeau. All rights reserved.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::collab::message::{CollabRequest, CollabResponse};

/// Score assigned to a peer that has never responded to us.
pub const REPUTATION_DEFAULT: f64 = 1.0;
/// Step applied per agreeing or disagreeing response.
pub const REPUTATION_STEP: f64 = 0.1;
/// Minimum originator score for pre-emptive high-priority mitigation.
pub const PREMITIGATION_TRUST_FLOOR: f64 = 0.5;

/// Additive per-peer trust scores.
///
/// Only responses to this node's own requests move a score; weighting
/// responses to third-party requests would overweight social consensus.
pub struct ReputationBook {
    scores: DashMap<String, f64>,
}

impl ReputationBook {
    pub fn new() -> Self {
        ReputationBook {
            scores: DashMap::new(),
        }
    }

    pub fn score(&self, peer: &str) -> f64 {
        self.scores.get(peer).map(|score| *score).unwrap_or(REPUTATION_DEFAULT)
    }

    /// Peer agreed with one of our detections.
    pub fn credit(&self, peer: &str) {
        self.adjust(peer, REPUTATION_STEP);
    }

    /// Peer rejected one of our detections.
    pub fn penalize(&self, peer: &str) {
        self.adjust(peer, -REPUTATION_STEP);
    }

    fn adjust(&self, peer: &str, delta: f64) {
        *self.scores.entry(peer.to_string()).or_insert(REPUTATION_DEFAULT) += delta;
    }

    pub fn snapshot(&self) -> HashMap<String, f64> {
        self.scores
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect()
    }
}

impl Default for ReputationBook {
    fn default() -> Self {
        Self::new()
    }
}

/// Requests seen (sent or received), keyed by request id for correlation.
pub struct PendingRequests {
    entries: DashMap<String, (Instant, CollabRequest)>,
}

impl PendingRequests {
    pub fn new() -> Self {
        PendingRequests {
            entries: DashMap::new(),
        }
    }

    pub fn insert(&self, request: &CollabRequest) {
        self.entries
            .insert(request.request_id.clone(), (Instant::now(), request.clone()));
    }

    pub fn get(&self, request_id: &str) -> Option<CollabRequest> {
        self.entries.get(request_id).map(|entry| entry.value().1.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop entries older than `ttl`; returns how many were removed.
    pub fn reap(&self, ttl: Duration) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, (inserted, _)| inserted.elapsed() <= ttl);
        before - self.entries.len()
    }
}

impl Default for PendingRequests {
    fn default() -> Self {
        Self::new()
    }
}

/// Responses accumulated per request id, keyed by responding AS.
pub struct ResponseLedger {
    entries: DashMap<String, (Instant, HashMap<String, CollabResponse>)>,
}

impl ResponseLedger {
    pub fn new() -> Self {
        ResponseLedger {
            entries: DashMap::new(),
        }
    }

    pub fn record(&self, response: &CollabResponse) {
        let mut entry = self
            .entries
            .entry(response.request_id.clone())
            .or_insert_with(|| (Instant::now(), HashMap::new()));
        entry.1.insert(response.as_name.clone(), response.clone());
    }

    pub fn responses_for(&self, request_id: &str) -> Option<HashMap<String, CollabResponse>> {
        self.entries.get(request_id).map(|entry| entry.value().1.clone())
    }

    /// Number of requests with at least one tallied response.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop per-request tallies older than `ttl`; returns how many request
    /// ids were removed.
    pub fn reap(&self, ttl: Duration) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, (created, _)| created.elapsed() <= ttl);
        before - self.entries.len()
    }
}

impl Default for ResponseLedger {
    fn default() -> Self {
        Self::new()
    }
}
