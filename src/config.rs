//! Pipeline configuration.
//!
//! All tunables carry defaults matching production deployments; a plain
//! `PipelineConfig::default()` is a fully working configuration. Everything
//! serializes, so a deployment can load overrides from JSON.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::pipeline::types::Tier;

/// Memory-pressure thresholds separating the capability tiers.
///
/// `ratio > critical` → Low, `ratio > low` → Medium, otherwise High.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PressureThresholds {
    pub critical: f32,
    pub low: f32,
}

impl Default for PressureThresholds {
    fn default() -> Self {
        Self {
            critical: 0.85,
            low: 0.65,
        }
    }
}

/// Batch chunk size per tier.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ChunkTable {
    pub low: usize,
    pub medium: usize,
    pub high: usize,
}

impl ChunkTable {
    pub fn for_tier(&self, tier: Tier) -> usize {
        match tier {
            Tier::Low => self.low,
            Tier::Medium => self.medium,
            Tier::High => self.high,
        }
    }
}

impl Default for ChunkTable {
    fn default() -> Self {
        Self {
            low: 1,
            medium: 2,
            high: 4,
        }
    }
}

/// Inter-chunk delay per tier, in milliseconds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DelayTable {
    pub low_ms: u64,
    pub medium_ms: u64,
    pub high_ms: u64,
}

impl DelayTable {
    pub fn for_tier(&self, tier: Tier) -> Duration {
        Duration::from_millis(match tier {
            Tier::Low => self.low_ms,
            Tier::Medium => self.medium_ms,
            Tier::High => self.high_ms,
        })
    }
}

impl Default for DelayTable {
    fn default() -> Self {
        Self {
            low_ms: 1500,
            medium_ms: 500,
            high_ms: 100,
        }
    }
}

/// Named weights for the default priority strategy. Additive: a document
/// collects every weight whose signal it matches.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PriorityWeights {
    /// Score every document starts from.
    pub base: f64,
    /// Bonus for sources larger than `large_source_bytes`.
    pub large_source: f64,
    /// Bonus for page-description formats (PDF, PostScript).
    pub page_format: f64,
    /// Bonus for filenames carrying legal-document markers.
    pub legal_name: f64,
    /// Bonus for raster images below `small_raster_pixels`.
    pub small_raster: f64,
    /// Numerator of the submission-order tie-break term.
    pub recency: f64,
    pub large_source_bytes: u64,
    pub small_raster_pixels: u64,
}

impl Default for PriorityWeights {
    fn default() -> Self {
        Self {
            base: 1.0,
            large_source: 0.5,
            page_format: 0.3,
            legal_name: 0.4,
            small_raster: 0.2,
            recency: 0.1,
            large_source_bytes: 1_000_000,
            small_raster_pixels: 300_000,
        }
    }
}

/// Top-level pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub thresholds: PressureThresholds,
    pub chunk_sizes: ChunkTable,
    pub chunk_delays: DelayTable,
    pub weights: PriorityWeights,
    /// Deadline for inference-status queries, in seconds.
    pub status_timeout_secs: u64,
    /// Deadline for a background-worker reply, in seconds.
    pub worker_timeout_secs: u64,
    /// Spawn a background worker and offload jobs to it. Off means every job
    /// runs directly on the caller's task.
    pub offload_to_worker: bool,
    /// Buffered capacity of the diagnostics broadcast channel.
    pub diagnostics_capacity: usize,
}

impl PipelineConfig {
    pub fn status_timeout(&self) -> Duration {
        Duration::from_secs(self.status_timeout_secs)
    }

    pub fn worker_timeout(&self) -> Duration {
        Duration::from_secs(self.worker_timeout_secs)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            thresholds: PressureThresholds::default(),
            chunk_sizes: ChunkTable::default(),
            chunk_delays: DelayTable::default(),
            weights: PriorityWeights::default(),
            status_timeout_secs: 3,
            worker_timeout_secs: 30,
            offload_to_worker: true,
            diagnostics_capacity: 64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_thresholds() {
        let t = PressureThresholds::default();
        assert_eq!(t.critical, 0.85);
        assert_eq!(t.low, 0.65);
        assert!(t.critical > t.low);
    }

    #[test]
    fn chunk_table_tracks_tier() {
        let chunks = ChunkTable::default();
        assert_eq!(chunks.for_tier(Tier::Low), 1);
        assert_eq!(chunks.for_tier(Tier::Medium), 2);
        assert_eq!(chunks.for_tier(Tier::High), 4);
    }

    #[test]
    fn delay_table_is_inverse_to_tier() {
        let delays = DelayTable::default();
        assert_eq!(delays.for_tier(Tier::Low), Duration::from_millis(1500));
        assert_eq!(delays.for_tier(Tier::Medium), Duration::from_millis(500));
        assert_eq!(delays.for_tier(Tier::High), Duration::from_millis(100));
    }

    #[test]
    fn default_timeouts() {
        let config = PipelineConfig::default();
        assert_eq!(config.status_timeout(), Duration::from_secs(3));
        assert_eq!(config.worker_timeout(), Duration::from_secs(30));
        assert!(config.offload_to_worker);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"worker_timeout_secs": 10, "offload_to_worker": false}"#)
                .unwrap();
        assert_eq!(config.worker_timeout_secs, 10);
        assert!(!config.offload_to_worker);
        assert_eq!(config.status_timeout_secs, 3);
        assert_eq!(config.chunk_sizes.high, 4);
    }

    #[test]
    fn config_roundtrips_through_json() {
        let config = PipelineConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: PipelineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.diagnostics_capacity, config.diagnostics_capacity);
        assert_eq!(parsed.weights.legal_name, config.weights.legal_name);
    }
}
