//! Node Configuration
//! ==================
//! Environment-backed configuration for a SentinelMesh node.
//!
//! Copyright © 2025 Stephen Bilodeau. All rights reserved.

use std::time::Duration;

use serde::Deserialize;

use crate::collab::message::{REQ_SUFFIX, RES_SUFFIX};

/// Immutable configuration value for one defense node.
///
/// Every threshold and topic name is read once at startup and shared by
/// `Arc`; no component mutates configuration after construction.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    /// Message bus host, e.g. a Kafka broker hostname.
    #[serde(default)]
    pub kafka_host: String,
    /// Message bus port.
    #[serde(default)]
    pub kafka_port: String,

    /// Name of the autonomous system this node defends.
    #[serde(default)]
    pub as_name: String,
    /// Relative size of this AS, used to normalize collaboration requests
    /// across networks of different scale.
    #[serde(default)]
    pub as_size: u64,

    /// Fraction of observed packets that enter the counters, in `[0, 1]`.
    #[serde(default = "default_sampling_rate")]
    pub sampling_rate: f64,
    /// Seconds between shallow analysis ticks.
    #[serde(default)]
    pub analysis_period: f64,
    /// Maximum number of candidate IPs carried by a single request.
    #[serde(default = "default_msg_length")]
    pub msg_length: usize,
    /// Replace raw IP identifiers with lowercase SHA3-256 hex digests.
    #[serde(default = "default_use_hash")]
    pub use_hash: bool,

    /// Additional collaboration topics beyond the two priority topics.
    #[serde(default)]
    pub as_topics: Vec<String>,
    /// Topic for detections that are highly certain.
    #[serde(default)]
    pub topic_high: String,
    /// Topic for detections that are merely probable.
    #[serde(default)]
    pub topic_low: String,
    /// When set, publish to every additional topic instead of the single
    /// priority topic.
    #[serde(default)]
    pub topics_use_additional: bool,

    /// Path of the newline-delimited managed-IP file.
    #[serde(default)]
    pub managed_ips_path: String,

    /// Victim-side packet count above which an attack is assumed.
    #[serde(default)]
    pub threshold_victim_lo: u64,
    /// Victim-side packet count above which the attack is highly certain.
    #[serde(default)]
    pub threshold_victim_hi: u64,
    /// Window-over-window traffic ratio above which an increase is an attack.
    #[serde(default)]
    pub threshold_victim_time_percentage: f64,
    /// Minimum packets in the current window before the increase rule applies.
    #[serde(default)]
    pub threshold_victim_time_min: f64,

    /// Per-flow packet count marking a source as a heavy hitter.
    #[serde(default)]
    pub threshold_src_1: f64,
    /// Total outbound packet count marking a fan-out heavy source.
    #[serde(default)]
    pub threshold_src_2: f64,
    /// Flow concentration ratio for the targeted-minority rule.
    #[serde(default)]
    pub threshold_src_3: f64,
    /// Minimum outbound packets before the targeted-minority rule applies.
    #[serde(default)]
    pub threshold_src_3_min: f64,
    /// Forward/return packet ratio marking an asymmetric conversation.
    #[serde(default)]
    pub threshold_traffic_proportionality: f64,

    /// Seconds between reaper passes over the correlation maps.
    #[serde(default = "default_reap_interval_secs")]
    pub reap_interval_secs: u64,
    /// Seconds a request or its responses stay correlatable before reaping.
    #[serde(default = "default_request_ttl_secs")]
    pub request_ttl_secs: u64,
}

fn default_sampling_rate() -> f64 {
    1.0
}

fn default_msg_length() -> usize {
    10_000
}

fn default_use_hash() -> bool {
    true
}

fn default_reap_interval_secs() -> u64 {
    300
}

fn default_request_ttl_secs() -> u64 {
    3600
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            kafka_host: String::new(),
            kafka_port: String::new(),
            as_name: String::new(),
            as_size: 0,
            sampling_rate: default_sampling_rate(),
            analysis_period: 0.0,
            msg_length: default_msg_length(),
            use_hash: default_use_hash(),
            as_topics: Vec::new(),
            topic_high: String::new(),
            topic_low: String::new(),
            topics_use_additional: false,
            managed_ips_path: String::new(),
            threshold_victim_lo: 0,
            threshold_victim_hi: 0,
            threshold_victim_time_percentage: 0.0,
            threshold_victim_time_min: 0.0,
            threshold_src_1: 0.0,
            threshold_src_2: 0.0,
            threshold_src_3: 0.0,
            threshold_src_3_min: 0.0,
            threshold_traffic_proportionality: 0.0,
            reap_interval_secs: default_reap_interval_secs(),
            request_ttl_secs: default_request_ttl_secs(),
        }
    }
}

impl NodeConfig {
    /// Load the configuration from process environment variables.
    ///
    /// Variable names match the struct fields uppercased (`AS_NAME`,
    /// `SAMPLING_RATE`, `THRESHOLD_VICTIM_LO`, ...); `AS_TOPICS` is a
    /// comma-separated list.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let source = config::Environment::default()
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("as_topics");
        let settings = config::Config::builder().add_source(source).build()?;
        Ok(settings.try_deserialize()?)
    }

    /// `host:port` address of the message bus broker.
    pub fn bus_addr(&self) -> String {
        format!("{}:{}", self.kafka_host, self.kafka_port)
    }

    /// All topics this node consumes: the additional topics plus both
    /// priority topics, each with the request and response suffix.
    pub fn consumer_topics(&self) -> Vec<String> {
        let mut bases = self.as_topics.clone();
        bases.push(self.topic_high.clone());
        bases.push(self.topic_low.clone());

        let mut topics = Vec::with_capacity(bases.len() * 2);
        for base in bases {
            topics.push(format!("{base}{REQ_SUFFIX}"));
            topics.push(format!("{base}{RES_SUFFIX}"));
        }
        topics
    }

    pub fn analysis_interval(&self) -> Duration {
        Duration::from_secs_f64(self.analysis_period.max(0.0))
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.reap_interval_secs)
    }

    pub fn request_ttl(&self) -> Duration {
        Duration::from_secs(self.request_ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_keep_everything_sampled_and_hashed() {
        let config = NodeConfig::default();
        assert_eq!(config.sampling_rate, 1.0);
        assert_eq!(config.msg_length, 10_000);
        assert!(config.use_hash);
        assert!(!config.topics_use_additional);
    }

    #[test]
    fn consumer_topics_cover_all_bases_with_both_suffixes() {
        let config = NodeConfig {
            as_topics: vec!["EXTRA".to_string()],
            topic_high: "AS.HIGH".to_string(),
            topic_low: "AS.LOW".to_string(),
            ..NodeConfig::default()
        };

        let topics = config.consumer_topics();
        assert_eq!(
            topics,
            vec![
                "EXTRA.REQ".to_string(),
                "EXTRA.RES".to_string(),
                "AS.HIGH.REQ".to_string(),
                "AS.HIGH.RES".to_string(),
                "AS.LOW.REQ".to_string(),
                "AS.LOW.RES".to_string(),
            ]
        );
    }

    #[test]
    fn bus_addr_joins_host_and_port() {
        let config = NodeConfig {
            kafka_host: "broker".to_string(),
            kafka_port: "9092".to_string(),
            ..NodeConfig::default()
        };
        assert_eq!(config.bus_addr(), "broker:9092");
    }
}
