//! Pipeline error taxonomy.
//!
//! Propagation policy: the single-item entry point is fail-fast (the first
//! stage error aborts the call); the batch entry point is fail-soft (item
//! failures are isolated and dropped). `ComputeBackend` errors never reach
//! callers at all — the tensor stage converts them into the identity
//! fallback.

use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// OCR engine never finished initializing. Fatal to the call — there is
    /// no second text-extraction path.
    #[error("OCR engine unavailable: {0}")]
    Initialization(String),

    /// Status or embedding request failed. Status failures degrade to a
    /// default config; embedding failures fail the stage.
    #[error("Network request failed: {0}")]
    Network(String),

    /// A bounded operation exceeded its deadline.
    #[error("{0} timed out after {1:?}")]
    Timeout(&'static str, Duration),

    /// GPU compute path failed. Internal only — downgraded to the CPU
    /// identity fallback before it can surface.
    #[error("Compute backend failed: {0}")]
    ComputeBackend(String),

    /// A single batch item failed; isolated by the scheduler.
    #[error("Batch item {id} failed: {source}")]
    Item {
        id: Uuid,
        #[source]
        source: Box<PipelineError>,
    },
}

impl PipelineError {
    /// Wrap a stage error with the job it belonged to (batch isolation).
    pub fn for_item(id: Uuid, source: PipelineError) -> Self {
        Self::Item {
            id,
            source: Box::new(source),
        }
    }
}
