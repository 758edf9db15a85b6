//! SentinelMesh Defense Library
//! ============================
//! Core library for per-AS collaborative DDoS detection.
//!
//! Copyright © 2025 Stephen Bilodeau. All rights reserved.
//! Licensed under GPL-3.0.

// Re-export main modules
pub mod collab;
pub mod config;
pub mod detection;
pub mod gateway;
pub mod metrics;
pub mod mitigation;
pub mod node;

// Re-export key types for external use
pub use collab::client::CollabClient;
pub use config::NodeConfig;
pub use detection::{Ingestor, PacketRecord, TrafficCounters};
pub use node::SentinelNode;

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the SentinelMesh library
pub fn init() {
    tracing::info!("SentinelMesh library v{} initialized", VERSION);
}
