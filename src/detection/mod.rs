//! Detection Engine Module
//! =======================
//! Traffic accounting and the two-stage DDoS analysis: the victim-centric
//! shallow pass over destination counters and the source-centric
//! heavy-hitter confirmation run on behalf of peers.
//!
//! Copyright © 2025 Stephen Bilodeau. All rights reserved.

pub mod analysis;
pub mod counters;
pub mod ingest;
pub mod membership;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use analysis::{Analysis, AnalysisInput, AnalysisKind, HeavyHitterAnalysis, Verdict, VolumetricAttackAnalysis};
pub use counters::{CounterView, TrafficCounters};
pub use ingest::{is_sampling_skip, Ingestor};
pub use membership::{canonical_ip, sha3_hex, HeavyHitterTable, ManagedIps};

/// Transport layer of an observed packet.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Transport {
    Tcp,
    Udp,
}

/// One observed packet header.
///
/// Only `src` and `dst` are consumed by the detection core; ports and
/// transport ride along for traffic sources that want to filter upstream.
/// When identifier hashing is enabled, `src` and `dst` are canonicalized
/// with [`canonical_ip`] at record-creation time, so every identifier in
/// the counters, the managed-IP oracle, and the collaboration messages is
/// already in wire form.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PacketRecord {
    pub src: String,
    pub dst: String,
    pub srcport: String,
    pub dstport: String,
    pub timestamp: DateTime<Utc>,
    pub transport: Transport,
}

impl PacketRecord {
    pub fn new(
        src: impl Into<String>,
        dst: impl Into<String>,
        srcport: impl Into<String>,
        dstport: impl Into<String>,
        transport: Transport,
    ) -> Self {
        PacketRecord {
            src: src.into(),
            dst: dst.into(),
            srcport: srcport.into(),
            dstport: dstport.into(),
            timestamp: Utc::now(),
            transport,
        }
    }
}
