//! Status Gateway Module
//! =====================
//! REST surface for node health, Prometheus metrics, and collaboration
//! state.
//!
//! Copyright © 2025 Stephen Bilodeau. All rights reserved.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use axum::{extract::State, response::Json as AxumJson, routing::get, Json, Router};
use prometheus::Encoder;
use serde::Serialize;

use crate::collab::client::CollabClient;
use crate::config::NodeConfig;
use crate::detection::counters::TrafficCounters;
use crate::metrics::METRICS_REGISTRY;

/// Shared state behind the gateway handlers.
pub struct GatewayState {
    config: Arc<NodeConfig>,
    client: Arc<CollabClient>,
    counters: Arc<TrafficCounters>,
    started: Instant,
}

/// REST gateway for node introspection.
pub struct StatusGateway {
    state: Arc<GatewayState>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    uptime: u64,
}

#[derive(Serialize)]
struct CollabStatusResponse {
    as_name: String,
    reputation: HashMap<String, f64>,
    pending_requests: usize,
    tallied_requests: usize,
    heavy_hitters_recorded: u64,
    window_destinations: usize,
    window_managed_sources: usize,
}

impl StatusGateway {
    pub fn new(config: Arc<NodeConfig>, client: Arc<CollabClient>, counters: Arc<TrafficCounters>) -> Self {
        StatusGateway {
            state: Arc::new(GatewayState {
                config,
                client,
                counters,
                started: Instant::now(),
            }),
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(health_check))
            .route("/metrics", get(prometheus_metrics))
            .route("/collab/status", get(collab_status))
            .with_state(Arc::clone(&self.state))
    }

    pub async fn serve(&self, addr: &str) -> Result<(), Box<dyn std::error::Error>> {
        let app = self.router();
        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;
        Ok(())
    }
}

async fn health_check(State(state): State<Arc<GatewayState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime: state.started.elapsed().as_secs(),
    })
}

async fn collab_status(State(state): State<Arc<GatewayState>>) -> AxumJson<CollabStatusResponse> {
    AxumJson(CollabStatusResponse {
        as_name: state.config.as_name.clone(),
        reputation: state.client.reputation().snapshot(),
        pending_requests: state.client.pending().len(),
        tallied_requests: state.client.ledger().len(),
        heavy_hitters_recorded: state.client.heavy_hitters().recorded(),
        window_destinations: state.counters.dst_len(),
        window_managed_sources: state.counters.src_len(),
    })
}

async fn prometheus_metrics() -> String {
    let encoder = prometheus::TextEncoder::new();
    let metric_families = METRICS_REGISTRY.gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_else(|_| "# Error encoding metrics".to_string())
}
