//! ModelSelector — embedding-model configuration from inference status.
//!
//! Issues one bounded status request per call and maps the reply onto a
//! `ModelConfig` via GPU-memory bands. Fails soft: any failure, timeout, or
//! unusable-GPU report collapses to a conservative default that every
//! deployment can load. Configs are produced fresh per call — service status
//! can change between calls, so nothing here is cached.
//!
//! The current tier applies as a post-band adjustment: at tier Low the
//! parallelism and cache hints are halved. Band selection itself is
//! tier-independent.

use std::sync::Arc;
use std::time::Duration;

use crate::diagnostics::{DiagnosticsHub, PipelineEvent};
use crate::pipeline::traits::InferenceStatusClient;
use crate::pipeline::types::{InferenceStatus, ModelConfig, Tier};

// ═══════════════════════════════════════════════════════════
// Constants — model universe and memory bands
// ═══════════════════════════════════════════════════════════

/// High-quality embedding model, needs a comfortable GPU.
const MODEL_HIGH: &str = "nomic-embed-text-v1.5";
/// Balanced default, loadable on most deployments.
const MODEL_BALANCED: &str = "nomic-embed-text";
/// Lightweight last resort.
const MODEL_LIGHT: &str = "gemma3:270m";

/// GPU memory bands (MB of available memory).
const BAND_HIGH_MB: u64 = 2048;
const BAND_BALANCED_MB: u64 = 1024;
const BAND_REDUCED_MB: u64 = 512;

/// Below this the GPU is treated as unusable outright.
const MIN_USABLE_MB: u64 = 512;

// ═══════════════════════════════════════════════════════════
// Selector
// ═══════════════════════════════════════════════════════════

/// Picks the embedding model, fallback chain, and capacity hints.
pub struct ModelSelector {
    status: Arc<dyn InferenceStatusClient>,
    timeout: Duration,
    diagnostics: DiagnosticsHub,
}

impl ModelSelector {
    pub fn new(
        status: Arc<dyn InferenceStatusClient>,
        timeout: Duration,
        diagnostics: DiagnosticsHub,
    ) -> Self {
        Self {
            status,
            timeout,
            diagnostics,
        }
    }

    /// Select a model configuration for the current tier. Never fails.
    pub async fn select(&self, tier: Tier) -> ModelConfig {
        let status = match tokio::time::timeout(self.timeout, self.status.fetch_status()).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                self.degraded(format!("status query failed: {e}"));
                return adjust_for_tier(default_config(), tier);
            }
            Err(_) => {
                self.degraded(format!("status query exceeded {:?}", self.timeout));
                return adjust_for_tier(default_config(), tier);
            }
        };

        if status.models_loading {
            tracing::debug!("inference service reports models still loading");
        }

        adjust_for_tier(config_from_status(&status, &self.diagnostics), tier)
    }

    fn degraded(&self, reason: String) {
        tracing::warn!(reason = %reason, "model selection degraded to default config");
        self.diagnostics
            .emit(PipelineEvent::StatusDegraded { reason });
    }
}

/// Conservative configuration used whenever the GPU cannot be trusted.
fn default_config() -> ModelConfig {
    ModelConfig {
        model_name: MODEL_BALANCED.to_string(),
        fallback_chain: vec![MODEL_BALANCED.to_string(), MODEL_LIGHT.to_string()],
        parallelism: 4,
        cache_size_mb: 128,
        external_fallback: false,
    }
}

/// Band on available GPU memory. Only called with a fresh, successful status.
fn config_from_status(status: &InferenceStatus, diagnostics: &DiagnosticsHub) -> ModelConfig {
    let avail = status.gpu_memory_available;

    if !status.gpu_detected || status.gpu_busy || avail < MIN_USABLE_MB {
        let reason = if !status.gpu_detected {
            "GPU not recognized".to_string()
        } else if status.gpu_busy {
            "GPU busy".to_string()
        } else {
            format!("only {avail} MB GPU memory available")
        };
        tracing::info!(reason = %reason, "GPU unusable, selecting default config");
        diagnostics.emit(PipelineEvent::StatusDegraded { reason });
        return default_config();
    }

    if avail > BAND_HIGH_MB {
        ModelConfig {
            model_name: MODEL_HIGH.to_string(),
            fallback_chain: vec![
                MODEL_HIGH.to_string(),
                MODEL_BALANCED.to_string(),
                MODEL_LIGHT.to_string(),
            ],
            parallelism: 8,
            cache_size_mb: 512,
            external_fallback: false,
        }
    } else if avail > BAND_BALANCED_MB {
        ModelConfig {
            model_name: MODEL_BALANCED.to_string(),
            fallback_chain: vec![MODEL_BALANCED.to_string(), MODEL_LIGHT.to_string()],
            parallelism: 6,
            cache_size_mb: 256,
            external_fallback: false,
        }
    } else if avail > BAND_REDUCED_MB {
        // Same model, reduced capacity hints.
        ModelConfig {
            model_name: MODEL_BALANCED.to_string(),
            fallback_chain: vec![MODEL_BALANCED.to_string(), MODEL_LIGHT.to_string()],
            parallelism: 3,
            cache_size_mb: 128,
            external_fallback: false,
        }
    } else {
        ModelConfig {
            model_name: MODEL_LIGHT.to_string(),
            fallback_chain: vec![MODEL_LIGHT.to_string()],
            parallelism: 2,
            cache_size_mb: 64,
            external_fallback: true,
        }
    }
}

/// Tier hook: heavy memory pressure halves the capacity hints.
fn adjust_for_tier(mut config: ModelConfig, tier: Tier) -> ModelConfig {
    if tier == Tier::Low {
        config.parallelism = (config.parallelism / 2).max(1);
        config.cache_size_mb = (config.cache_size_mb / 2).max(32);
    }
    config
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
