//! ResourceMonitor — memory-pressure sampling and tier derivation.
//!
//! Reads a coarse used/total memory signal through a `MemoryProbe` and maps
//! it onto a capability tier via two configured thresholds. Absent telemetry
//! is treated as "no change": the monitor keeps returning its last-known
//! state and never errors. There is no push notification — callers
//! re-`sample()` explicitly (the batch scheduler does so after every chunk).

use std::sync::Mutex;

use crate::config::PressureThresholds;
use crate::pipeline::traits::{MemoryProbe, MemorySample};
use crate::pipeline::types::{ResourceState, Tier};

/// Production probe reading `/proc/meminfo`.
///
/// Returns `None` on non-Linux platforms or any parse failure, which the
/// monitor treats as missing telemetry.
pub struct ProcMeminfoProbe;

impl MemoryProbe for ProcMeminfoProbe {
    fn sample(&self) -> Option<MemorySample> {
        let contents = std::fs::read_to_string("/proc/meminfo").ok()?;
        let mut total_kb: Option<u64> = None;
        let mut available_kb: Option<u64> = None;

        for line in contents.lines() {
            // Format: "MemTotal:       16384000 kB"
            let mut parts = line.split_whitespace();
            match parts.next() {
                Some("MemTotal:") => total_kb = parts.next()?.parse().ok(),
                Some("MemAvailable:") => available_kb = parts.next()?.parse().ok(),
                _ => {}
            }
            if total_kb.is_some() && available_kb.is_some() {
                break;
            }
        }

        let total = total_kb? * 1024;
        let available = available_kb? * 1024;
        Some(MemorySample {
            used_bytes: total.saturating_sub(available),
            total_bytes: total,
        })
    }
}

/// Samples memory pressure and derives the current capability tier.
pub struct ResourceMonitor {
    probe: Box<dyn MemoryProbe>,
    thresholds: PressureThresholds,
    state: Mutex<ResourceState>,
}

impl ResourceMonitor {
    pub fn new(probe: Box<dyn MemoryProbe>, thresholds: PressureThresholds) -> Self {
        Self {
            probe,
            thresholds,
            state: Mutex::new(ResourceState::initial()),
        }
    }

    /// Take a fresh reading and return the updated state.
    ///
    /// If the probe has nothing to report, the last-known state is returned
    /// unchanged — missing telemetry never crashes or degrades the tier.
    pub fn sample(&self) -> ResourceState {
        match self.probe.sample() {
            Some(sample) if sample.total_bytes > 0 => {
                let ratio =
                    (sample.used_bytes as f64 / sample.total_bytes as f64).clamp(0.0, 1.0) as f32;
                let next = ResourceState {
                    tier: derive_tier(ratio, &self.thresholds),
                    pressure_ratio: ratio,
                };
                *self.lock_state() = next;
                next
            }
            _ => {
                tracing::debug!("memory telemetry unavailable, keeping last-known tier");
                *self.lock_state()
            }
        }
    }

    /// Last-known state without taking a new reading.
    pub fn current(&self) -> ResourceState {
        *self.lock_state()
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, ResourceState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Map a pressure ratio onto a tier. Higher pressure never yields a higher
/// tier: `ratio > critical` → Low, `ratio > low` → Medium, else High.
fn derive_tier(ratio: f32, thresholds: &PressureThresholds) -> Tier {
    if ratio > thresholds.critical {
        Tier::Low
    } else if ratio > thresholds.low {
        Tier::Medium
    } else {
        Tier::High
    }
}
