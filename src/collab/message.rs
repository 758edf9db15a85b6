//! Collaboration messages exchanged between defense nodes.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Topic suffix carrying collaboration requests.
pub const REQ_SUFFIX: &str = ".REQ";
/// Topic suffix carrying collaboration responses.
pub const RES_SUFFIX: &str = ".RES";

/// How a victim-side detection was triggered.
///
/// Serialized by name on the wire; any unrecognized name decodes to
/// [`Detection::None`], which no local threshold agrees with.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum Detection {
    Threshold,
    TrafficIncrease,
    None,
}

impl Detection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Detection::Threshold => "THRESHOLD",
            Detection::TrafficIncrease => "TRAFFIC_INCREASE",
            Detection::None => "NONE",
        }
    }
}

impl From<Detection> for String {
    fn from(detection: Detection) -> Self {
        detection.as_str().to_string()
    }
}

impl From<String> for Detection {
    fn from(name: String) -> Self {
        match name.as_str() {
            "THRESHOLD" => Detection::Threshold,
            "TRAFFIC_INCREASE" => Detection::TrafficIncrease,
            _ => Detection::None,
        }
    }
}

/// A responder's verdict on a collaboration request.
///
/// Unrecognized names decode to [`Decision::Unknown`], which triggers no
/// dispatch side effect.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum Decision {
    /// The responder manages none of the candidate IPs.
    NotManaged,
    /// The responder does not agree an attack is happening at all.
    NotAck,
    /// Managed candidates exist, but none passed the source thresholds.
    UnderThrs,
    /// At least one candidate was confirmed as an attacker.
    Found,
    Unknown,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::NotManaged => "NOT_MANAGED",
            Decision::NotAck => "NOT_ACK",
            Decision::UnderThrs => "UNDER_THRS",
            Decision::Found => "FOUND",
            Decision::Unknown => "UNKNOWN",
        }
    }
}

impl From<Decision> for String {
    fn from(decision: Decision) -> Self {
        decision.as_str().to_string()
    }
}

impl From<String> for Decision {
    fn from(name: String) -> Self {
        match name.as_str() {
            "NOT_MANAGED" => Decision::NotManaged,
            "NOT_ACK" => Decision::NotAck,
            "UNDER_THRS" => Decision::UnderThrs,
            "FOUND" => Decision::Found,
            _ => Decision::Unknown,
        }
    }
}

/// Request for a defense collaboration round.
///
/// Asks peers to check, for each candidate IP they manage, whether that
/// candidate is a heavy hitter against the named victim. The detection
/// strength travels normalized by the originator's AS size so receivers
/// can rescale it against their own thresholds.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CollabRequest {
    pub potential_attacker_ips: Vec<String>,
    pub potential_victim: String,
    pub requests_relative_to_size: f64,
    pub request_detection: Detection,
    pub request_id: String,
    pub request_originator: String,
}

impl CollabRequest {
    pub fn new(
        originator: &str,
        potential_victim: &str,
        potential_attacker_ips: Vec<String>,
        request_detection: Detection,
        requests_relative_to_size: f64,
    ) -> Self {
        CollabRequest {
            potential_attacker_ips,
            potential_victim: potential_victim.to_string(),
            requests_relative_to_size,
            request_detection,
            request_id: Uuid::new_v4().to_string(),
            request_originator: originator.to_string(),
        }
    }
}

/// Response to a collaboration request.
///
/// `ack_potential_attacker_ips` is the subset of the request's candidates
/// this responder confirmed; `request_id` and `request_originator` are
/// echoed for correlation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CollabResponse {
    pub ack_potential_attacker_ips: Vec<String>,
    pub decision: Decision,
    pub as_name: String,
    pub request_id: String,
    pub request_originator: String,
}

/// Base topic of a suffixed bus topic.
pub fn base_topic(topic: &str) -> String {
    topic
        .strip_suffix(REQ_SUFFIX)
        .or_else(|| topic.strip_suffix(RES_SUFFIX))
        .unwrap_or(topic)
        .to_string()
}

pub fn request_topic(base: &str) -> String {
    format!("{base}{REQ_SUFFIX}")
}

pub fn response_topic(base: &str) -> String {
    format!("{base}{RES_SUFFIX}")
}

/// Split a candidate list into bus-sized chunks, preserving order.
pub fn chunk_candidates(candidates: &[String], chunk_size: usize) -> Vec<Vec<String>> {
    candidates
        .chunks(chunk_size.max(1))
        .map(|chunk| chunk.to_vec())
        .collect()
}
