//! Attack Analyses
//! ===============
//! The two detection passes behind one capability interface: the shallow
//! victim-centric pass over destination counters, and the deep
//! source-centric heavy-hitter confirmation.
//!
//! Copyright © 2025 Stephen Bilodeau. All rights reserved.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::collab::message::Detection;
use crate::config::NodeConfig;
use crate::detection::counters::CounterView;

/// Which side of an attack an analysis reasons about.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AnalysisKind {
    /// Victim-centric: is this destination under attack?
    Attack,
    /// Source-centric: is this candidate a heavy hitter against the victim?
    Attacker,
}

/// Counter views an analysis runs against.
///
/// The views are owned snapshots taken by the caller; analyses never touch
/// the live counters. `src_prev` and `dst_aggregate_prev` are only
/// meaningful for the analysis kind that consumes them.
pub struct AnalysisInput<'a> {
    pub attacker_ip: &'a str,
    pub victim_ip: &'a str,
    pub src_view: &'a CounterView,
    pub dst_view: &'a CounterView,
    pub src_prev: Option<&'a CounterView>,
    pub dst_aggregate_prev: Option<&'a HashMap<String, u64>>,
}

/// Tagged analysis result, one variant per [`AnalysisKind`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Verdict {
    Attack {
        detected: bool,
        case: Detection,
        strength: f64,
    },
    Attacker {
        detected: bool,
    },
}

impl Verdict {
    /// Read this verdict as a victim-side result. An attacker-side verdict
    /// degrades to its detection flag with no case or strength.
    pub fn into_attack(self) -> (bool, Detection, f64) {
        match self {
            Verdict::Attack { detected, case, strength } => (detected, case, strength),
            Verdict::Attacker { detected } => (detected, Detection::None, 0.0),
        }
    }

    /// Read this verdict as a bare detection flag.
    pub fn is_detected(&self) -> bool {
        match self {
            Verdict::Attack { detected, .. } => *detected,
            Verdict::Attacker { detected } => *detected,
        }
    }
}

/// Capability interface over both analyses. Dispatch is by the verdict's
/// explicit variant, not by downcasting.
pub trait Analysis: Send + Sync {
    fn kind(&self) -> AnalysisKind;
    fn run(&self, input: &AnalysisInput<'_>) -> Verdict;
}

fn flow(view: &CounterView, from: &str, to: &str) -> u64 {
    view.get(from).and_then(|inner| inner.get(to)).copied().unwrap_or(0)
}

fn outbound_total(view: &CounterView, from: &str) -> u64 {
    view.get(from).map(|inner| inner.values().sum()).unwrap_or(0)
}

/// Victim-centric detection over the destination counters.
///
/// Rule A: the destination's packet total crosses the absolute threshold.
/// Rule B: the total grew past the configured ratio of the previous
/// window, once it clears the minimum that makes a ratio meaningful.
pub struct VolumetricAttackAnalysis {
    config: Arc<NodeConfig>,
}

impl VolumetricAttackAnalysis {
    pub fn new(config: Arc<NodeConfig>) -> Self {
        VolumetricAttackAnalysis { config }
    }
}

impl Analysis for VolumetricAttackAnalysis {
    fn kind(&self) -> AnalysisKind {
        AnalysisKind::Attack
    }

    fn run(&self, input: &AnalysisInput<'_>) -> Verdict {
        let victim = input.victim_ip;
        let packets: u64 = input
            .dst_view
            .get(victim)
            .map(|sources| sources.values().sum())
            .unwrap_or(0);

        if packets > self.config.threshold_victim_lo {
            return Verdict::Attack {
                detected: true,
                case: Detection::Threshold,
                strength: packets as f64,
            };
        }

        let previous = input
            .dst_aggregate_prev
            .and_then(|aggregate| aggregate.get(victim))
            .copied()
            .unwrap_or(0);
        if previous == 0 || (packets as f64) < self.config.threshold_victim_time_min {
            return Verdict::Attack {
                detected: false,
                case: Detection::None,
                strength: 0.0,
            };
        }

        let ratio = packets as f64 / previous as f64;
        if ratio > self.config.threshold_victim_time_percentage {
            debug!(victim, ratio, "traffic increase past threshold");
            return Verdict::Attack {
                detected: true,
                case: Detection::TrafficIncrease,
                strength: ratio,
            };
        }

        Verdict::Attack {
            detected: false,
            case: Detection::None,
            strength: 0.0,
        }
    }
}

/// Source-centric heavy-hitter confirmation against a named victim.
///
/// Flow and total values take the maximum of the current and previous
/// window so an attacker cannot hide behind a window rotation. The four
/// cases are evaluated in order with a short-circuit on the first hit.
pub struct HeavyHitterAnalysis {
    config: Arc<NodeConfig>,
}

impl HeavyHitterAnalysis {
    pub fn new(config: Arc<NodeConfig>) -> Self {
        HeavyHitterAnalysis { config }
    }

    /// Whether traffic between attacker and victim is roughly symmetric.
    ///
    /// A source that sends far more packets to the victim than it gets
    /// back is conducting a one-sided conversation; a completely silent
    /// return channel weighs ten times heavier than a single packet.
    fn is_traffic_direction_proportional(
        &self,
        attacker_ip: &str,
        victim_ip: &str,
        packets_to_victim: u64,
        dst_view: &CounterView,
    ) -> bool {
        let mut packets_from_victim = flow(dst_view, attacker_ip, victim_ip) as f64;
        if packets_from_victim == 0.0 {
            packets_from_victim = 0.1;
        }

        // Only the attacker-to-victim direction matters here; the victim
        // being an attacker is somebody else's request.
        if packets_to_victim as f64 / packets_from_victim >= self.config.threshold_traffic_proportionality {
            debug!(
                attacker = attacker_ip,
                to_victim = packets_to_victim,
                from_victim = packets_from_victim,
                "asymmetric conversation"
            );
            return false;
        }
        true
    }
}

impl Analysis for HeavyHitterAnalysis {
    fn kind(&self) -> AnalysisKind {
        AnalysisKind::Attacker
    }

    fn run(&self, input: &AnalysisInput<'_>) -> Verdict {
        let attacker = input.attacker_ip;
        let victim = input.victim_ip;
        let empty = CounterView::new();
        let src_prev = input.src_prev.unwrap_or(&empty);

        let packets_to_victim = flow(input.src_view, attacker, victim).max(flow(src_prev, attacker, victim));

        // case 1: source sends too many packets to the victim
        if packets_to_victim as f64 > self.config.threshold_src_1 {
            debug!(attacker, packets_to_victim, "heavy flow toward victim");
            return Verdict::Attacker { detected: true };
        }

        // case 2: source sends many packets overall
        let packets_from_source =
            outbound_total(input.src_view, attacker).max(outbound_total(src_prev, attacker));
        if packets_from_source as f64 > self.config.threshold_src_2 {
            debug!(attacker, packets_from_source, "fan-out heavy source");
            return Verdict::Attacker { detected: true };
        }

        // case 3: modest sender, but nearly all of it aimed at the victim
        if packets_from_source as f64 > self.config.threshold_src_3_min
            && packets_to_victim as f64 / packets_from_source as f64 >= self.config.threshold_src_3
        {
            debug!(attacker, packets_to_victim, packets_from_source, "targeted minority flow");
            return Verdict::Attacker { detected: true };
        }

        // case 4: one-sided conversation with the victim
        if !self.is_traffic_direction_proportional(attacker, victim, packets_to_victim, input.dst_view) {
            return Verdict::Attacker { detected: true };
        }

        Verdict::Attacker { detected: false }
    }
}
