//! Diagnostics channel.
//!
//! Degraded-path decisions (GPU fallback, status degradation, worker
//! timeouts, tier changes) are published on a broadcast channel that any
//! number of observers can subscribe to. Emission never blocks and never
//! fails: with no subscribers, events simply vanish. Processing results are
//! never affected by anything here.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::pipeline::types::Tier;

/// One observable pipeline event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// GPU transform failed or produced unusable output; identity fallback
    /// was used instead.
    GpuFallback { job_id: String, reason: String },
    /// Inference-status query failed, timed out, or reported an unusable
    /// GPU; the default model config was selected.
    StatusDegraded { reason: String },
    /// Background worker missed its reply deadline; the job ran directly.
    WorkerTimedOut { job_id: String },
    /// Background worker reported a failure; the job ran directly.
    WorkerFailed { job_id: String, error: String },
    /// Memory pressure moved the batch into a different tier.
    TierChanged { tier: Tier, pressure_ratio: f32 },
    ChunkCompleted {
        chunk_index: usize,
        dispatched: usize,
        succeeded: usize,
    },
    BatchCompleted {
        submitted: usize,
        processed: usize,
        dropped: usize,
        duration_ms: u64,
    },
}

/// Broadcast hub for pipeline events. Cheap to clone; all clones publish to
/// the same subscribers.
#[derive(Clone)]
pub struct DiagnosticsHub {
    tx: broadcast::Sender<PipelineEvent>,
}

impl DiagnosticsHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.tx.subscribe()
    }

    /// Publish an event. Fire-and-forget; a send with no subscribers is not
    /// an error.
    pub fn emit(&self, event: PipelineEvent) {
        tracing::debug!(event = ?event, "pipeline event");
        let _ = self.tx.send(event);
    }
}

impl Default for DiagnosticsHub {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_emitted_events() {
        let hub = DiagnosticsHub::new(8);
        let mut rx = hub.subscribe();
        hub.emit(PipelineEvent::StatusDegraded {
            reason: "unreachable".to_string(),
        });
        assert!(matches!(
            rx.recv().await.unwrap(),
            PipelineEvent::StatusDegraded { .. }
        ));
    }

    #[tokio::test]
    async fn emit_without_subscribers_is_silent() {
        let hub = DiagnosticsHub::new(8);
        hub.emit(PipelineEvent::WorkerTimedOut {
            job_id: "j1".to_string(),
        });
    }

    #[tokio::test]
    async fn clones_share_subscribers() {
        let hub = DiagnosticsHub::new(8);
        let mut rx = hub.subscribe();
        let clone = hub.clone();
        clone.emit(PipelineEvent::TierChanged {
            tier: Tier::Medium,
            pressure_ratio: 0.7,
        });
        assert!(matches!(
            rx.recv().await.unwrap(),
            PipelineEvent::TierChanged { .. }
        ));
    }

    #[test]
    fn events_serialize_tagged() {
        let json = serde_json::to_string(&PipelineEvent::GpuFallback {
            job_id: "j1".to_string(),
            reason: "device lost".to_string(),
        })
        .unwrap();
        assert!(json.contains("\"type\":\"gpu_fallback\""));
        assert!(json.contains("\"job_id\":\"j1\""));
    }
}
