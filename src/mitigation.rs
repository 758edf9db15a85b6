//! Mitigation Sink
//! ===============
//! Seam toward whatever actually blocks traffic. The detection engine only
//! emits ordered lists of IPs to filter; actuation lives elsewhere.
//!
//! Copyright © 2025 Stephen Bilodeau. All rights reserved.

use tracing::info;

/// Receives IP lists to block. Implementations may be no-ops.
pub trait Mitigation: Send + Sync {
    fn filter(&self, ips: &[String]);

    fn filter_one(&self, ip: &str) {
        self.filter(&[ip.to_string()]);
    }
}

/// Discards every filter list.
pub struct NoMitigation;

impl Mitigation for NoMitigation {
    fn filter(&self, _ips: &[String]) {}
}

/// Logs every non-empty filter list so emitted mitigations are observable.
pub struct LogMitigation;

impl Mitigation for LogMitigation {
    fn filter(&self, ips: &[String]) {
        if ips.is_empty() {
            return;
        }
        info!(count = ips.len(), ips = ?ips, "mitigation filter list emitted");
    }
}
