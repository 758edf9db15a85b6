//! Approximate Membership
//! ======================
//! Bloom-filter oracles: the managed-IP set this AS can act on, and the
//! table of heavy hitters confirmed across collaboration rounds.
//!
//! Copyright © 2025 Stephen Bilodeau. All rights reserved.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use bloom::{BloomFilter, ASMS};
use parking_lot::Mutex;
use sha3::{Digest, Sha3_256};
use tracing::info;

const MANAGED_CAPACITY: u32 = 100_000;
const HEAVY_HITTER_CAPACITY: u32 = 10_000;
const BLOOM_ERROR_RATE: f32 = 0.001;

/// Lowercase hex SHA3-256 digest of an identifier's UTF-8 bytes.
pub fn sha3_hex(raw: &str) -> String {
    hex::encode(Sha3_256::digest(raw.as_bytes()))
}

/// Wire form of an IP identifier: the raw text, or its SHA3-256 digest
/// when identifier hashing is enabled.
///
/// Applied uniformly at packet-record creation and at managed-IP file
/// load, so membership lookups never hash again.
pub fn canonical_ip(raw: &str, use_hash: bool) -> String {
    if use_hash {
        sha3_hex(raw)
    } else {
        raw.to_string()
    }
}

/// Approximate set of the IPs this AS is responsible for.
///
/// False positives are possible and tolerated; false negatives are not.
/// Membership is the sole query, on identifiers already in wire form.
pub struct ManagedIps {
    filter: BloomFilter,
}

impl ManagedIps {
    /// Load the oracle from a newline-delimited file of IP literals.
    pub fn load(path: &Path, use_hash: bool) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let contents = std::fs::read_to_string(path)?;
        let oracle = Self::from_entries(contents.lines(), use_hash);
        info!(path = %path.display(), "managed IP oracle loaded");
        Ok(oracle)
    }

    /// Build the oracle from raw entries, hashing each when requested.
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = &'a str>, use_hash: bool) -> Self {
        let mut filter = BloomFilter::with_rate(BLOOM_ERROR_RATE, MANAGED_CAPACITY);
        let mut loaded = 0usize;
        for entry in entries {
            if entry.is_empty() {
                continue;
            }
            filter.insert(&canonical_ip(entry, use_hash));
            loaded += 1;
        }
        info!(loaded, "managed IP filter populated");
        ManagedIps { filter }
    }

    /// Whether `ip` is (probably) managed by this AS.
    pub fn contains(&self, ip: &str) -> bool {
        self.filter.contains(&ip.to_string())
    }
}

/// Insert-only record of IPs confirmed as attackers.
///
/// Grows monotonically for the process lifetime. The membership probe is
/// not yet consulted by the detection pipeline; it is the hook for a
/// pre-filter ahead of the per-candidate analysis.
pub struct HeavyHitterTable {
    filter: Mutex<BloomFilter>,
    recorded: AtomicU64,
}

impl HeavyHitterTable {
    pub fn new() -> Self {
        HeavyHitterTable {
            filter: Mutex::new(BloomFilter::with_rate(BLOOM_ERROR_RATE, HEAVY_HITTER_CAPACITY)),
            recorded: AtomicU64::new(0),
        }
    }

    /// Add confirmed attacker IPs, already in wire form.
    pub fn record(&self, ips: &[String]) {
        if ips.is_empty() {
            return;
        }
        let mut filter = self.filter.lock();
        for ip in ips {
            filter.insert(ip);
        }
        self.recorded.fetch_add(ips.len() as u64, Ordering::Relaxed);
    }

    /// Whether `ip` has (probably) been confirmed as an attacker before.
    pub fn contains(&self, ip: &str) -> bool {
        self.filter.lock().contains(&ip.to_string())
    }

    /// Number of insertions since startup.
    pub fn recorded(&self) -> u64 {
        self.recorded.load(Ordering::Relaxed)
    }
}

impl Default for HeavyHitterTable {
    fn default() -> Self {
        Self::new()
    }
}
