//! Prometheus metrics for the SentinelMesh defense node
//!
//! This module provides metrics collection for:
//! - Packet ingestion and sampling
//! - Shallow detection outcomes
//! - Collaboration request/response traffic
//! - System performance

use lazy_static::lazy_static;
use prometheus::{
    Encoder, Gauge, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, TextEncoder,
};

// Global metrics registry
lazy_static! {
    pub static ref METRICS_REGISTRY: prometheus::Registry = {
        let registry = prometheus::Registry::new();

        // Register all metrics with the registry
        registry.register(Box::new(PACKETS_INGESTED_TOTAL.clone())).unwrap();
        registry.register(Box::new(PACKETS_SAMPLED_OUT_TOTAL.clone())).unwrap();
        registry.register(Box::new(ATTACKS_DETECTED_TOTAL.clone())).unwrap();
        registry.register(Box::new(COLLAB_REQUESTS_TOTAL.clone())).unwrap();
        registry.register(Box::new(COLLAB_RESPONSES_TOTAL.clone())).unwrap();
        registry.register(Box::new(CORRELATION_REAPED_TOTAL.clone())).unwrap();
        registry.register(Box::new(ANALYSIS_DURATION_SECONDS.clone())).unwrap();
        registry.register(Box::new(SYSTEM_MEMORY_USAGE_BYTES.clone())).unwrap();
        registry.register(Box::new(SYSTEM_CPU_USAGE_PERCENT.clone())).unwrap();

        registry
    };

    // Ingestion Metrics
    pub static ref PACKETS_INGESTED_TOTAL: IntCounter = IntCounter::new(
        "sentinel_packets_ingested_total",
        "Total number of packets counted into the current window"
    ).unwrap();

    pub static ref PACKETS_SAMPLED_OUT_TOTAL: IntCounter = IntCounter::new(
        "sentinel_packets_sampled_out_total",
        "Total number of packets dropped by the sampling gate"
    ).unwrap();

    // Detection Metrics
    pub static ref ATTACKS_DETECTED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("sentinel_attacks_detected_total", "Victim detections per shallow analysis case"),
        &["case"]
    ).unwrap();

    pub static ref ANALYSIS_DURATION_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new("sentinel_analysis_duration_seconds", "Wall time of one shallow analysis tick")
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0])
    ).unwrap();

    // Collaboration Metrics
    pub static ref COLLAB_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("sentinel_collab_requests_total", "Collaboration requests handled, by origin"),
        &["origin"]
    ).unwrap();

    pub static ref COLLAB_RESPONSES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("sentinel_collab_responses_total", "Collaboration responses tallied, by decision"),
        &["decision"]
    ).unwrap();

    pub static ref CORRELATION_REAPED_TOTAL: IntCounter = IntCounter::new(
        "sentinel_correlation_reaped_total",
        "Expired request/response correlation entries removed by the reaper"
    ).unwrap();

    // System Metrics
    pub static ref SYSTEM_MEMORY_USAGE_BYTES: Gauge = Gauge::new(
        "sentinel_system_memory_usage_bytes",
        "Current memory usage in bytes"
    ).unwrap();

    pub static ref SYSTEM_CPU_USAGE_PERCENT: Gauge = Gauge::new(
        "sentinel_system_cpu_usage_percent",
        "Current CPU usage percentage"
    ).unwrap();
}

/// Metrics server for exposing Prometheus metrics
pub struct MetricsServer {
    encoder: TextEncoder,
}

impl MetricsServer {
    pub fn new() -> Self {
        Self {
            encoder: TextEncoder::new(),
        }
    }

    /// Generate metrics output in Prometheus format
    pub fn encode_metrics(&self) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
        let mut buffer = Vec::new();
        self.encoder.encode(&METRICS_REGISTRY.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

impl Default for MetricsServer {
    fn default() -> Self {
        Self::new()
    }
}

/// Initialize metrics with default values
pub fn init_metrics() {
    ATTACKS_DETECTED_TOTAL.with_label_values(&["THRESHOLD"]).reset();
    ATTACKS_DETECTED_TOTAL.with_label_values(&["TRAFFIC_INCREASE"]).reset();
    COLLAB_REQUESTS_TOTAL.with_label_values(&["local"]).reset();
    COLLAB_REQUESTS_TOTAL.with_label_values(&["bus"]).reset();
}

/// Update system metrics
pub fn update_system_metrics() {
    use sysinfo::System;

    let mut sys = System::new_all();
    sys.refresh_all();

    // Memory usage
    let used_memory = sys.used_memory() as f64 * 1024.0; // Convert to bytes
    SYSTEM_MEMORY_USAGE_BYTES.set(used_memory);

    // CPU usage
    let cpu_usage = sys.global_cpu_info().cpu_usage() as f64;
    SYSTEM_CPU_USAGE_PERCENT.set(cpu_usage);
}
