//! SentinelMesh Defense Node
//! =========================
//! Main entry point for the per-AS collaborative DDoS detection daemon.
//!
//! Copyright © 2025 Stephen Bilodeau. All rights reserved.
//! Licensed under GPL-3.0.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::fmt::format::json;

use sentinel_mesh::collab::bus::{wait_for_bus, InMemoryBus, BUS_READY_ATTEMPTS, BUS_READY_DELAY};
use sentinel_mesh::collab::client::CollabClient;
use sentinel_mesh::config::NodeConfig;
use sentinel_mesh::detection::analysis::{Analysis, HeavyHitterAnalysis, VolumetricAttackAnalysis};
use sentinel_mesh::detection::counters::TrafficCounters;
use sentinel_mesh::detection::ingest::Ingestor;
use sentinel_mesh::detection::membership::ManagedIps;
use sentinel_mesh::gateway::StatusGateway;
use sentinel_mesh::metrics::{init_metrics, update_system_metrics};
use sentinel_mesh::mitigation::{LogMitigation, Mitigation};
use sentinel_mesh::node::SentinelNode;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize tracing with JSON format for structured logging
    tracing_subscriber::fmt()
        .event_format(json())
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Initialize Prometheus metrics
    init_metrics();
    info!("Prometheus metrics initialized");

    let config = Arc::new(NodeConfig::from_env()?);
    info!(
        as_name = %config.as_name,
        bus = %config.bus_addr(),
        "Starting SentinelMesh defense node v{}",
        env!("CARGO_PKG_VERSION")
    );

    let managed = Arc::new(ManagedIps::load(
        Path::new(&config.managed_ips_path),
        config.use_hash,
    )?);
    let counters = Arc::new(TrafficCounters::new());
    let mitigation: Arc<dyn Mitigation> = Arc::new(LogMitigation);

    // In-process loopback bus; a Kafka-backed producer/consumer pair plugs
    // into the same two traits for multi-AS deployments.
    let bus = Arc::new(InMemoryBus::new());
    wait_for_bus(bus.as_ref(), BUS_READY_ATTEMPTS, BUS_READY_DELAY).await?;
    let consumer = bus.subscribe(&config.consumer_topics());

    let attack_analysis: Arc<dyn Analysis> = Arc::new(VolumetricAttackAnalysis::new(config.clone()));
    let attacker_analysis: Arc<dyn Analysis> = Arc::new(HeavyHitterAnalysis::new(config.clone()));

    let client = Arc::new(CollabClient::new(
        config.clone(),
        counters.clone(),
        managed.clone(),
        attacker_analysis,
        mitigation.clone(),
        bus.clone(),
    ));
    let node = Arc::new(SentinelNode::new(
        config.clone(),
        counters.clone(),
        client.clone(),
        attack_analysis,
        mitigation,
    ));

    // Packet queue for the traffic source; the sender half stays alive so
    // an external capture process can be attached over FFI or a socket
    // bridge without restarting the loops.
    let (packet_tx, packet_rx) = mpsc::unbounded_channel();
    let _packet_tx = packet_tx;

    let ingestor = Ingestor::new(counters.clone(), managed, &config);
    tokio::spawn(async move {
        ingestor.run(packet_rx).await;
    });

    {
        let client = client.clone();
        tokio::spawn(async move {
            client.listen(Box::new(consumer)).await;
        });
    }

    {
        let node = node.clone();
        tokio::spawn(async move {
            node.run_reaper().await;
        });
    }

    // Start status gateway in background
    let gateway = StatusGateway::new(config.clone(), client, counters);
    tokio::spawn(async move {
        if let Err(e) = gateway.serve("0.0.0.0:8080").await {
            warn!("status gateway error: {}", e);
        }
    });

    // Start metrics update task
    tokio::spawn(async {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(30));
        loop {
            interval.tick().await;
            update_system_metrics();
        }
    });

    info!("SentinelMesh defense node initialized successfully");
    info!("Status gateway available on http://localhost:8080");
    info!("Packet queue ready; awaiting traffic source");

    // Shallow analysis loop runs on the main task until the process is
    // killed.
    node.run_analysis().await;
    Ok(())
}
