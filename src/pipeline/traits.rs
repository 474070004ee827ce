//! Collaborator traits — the seams between the pipeline and its externals.
//!
//! Everything the pipeline touches outside this crate sits behind one of
//! these traits and is handed in at construction time, so the whole pipeline
//! is testable with mock implementations and multiple independent processor
//! instances can coexist.

use async_trait::async_trait;

use super::error::PipelineError;
use super::types::{
    DocumentPayload, EmbeddingResult, InferenceStatus, ModelConfig, OcrOptions, OcrResult,
    PipelineResult,
};

/// Platform memory telemetry. Synchronous and cheap; may legitimately have
/// nothing to report (missing telemetry is not an error).
pub trait MemoryProbe: Send + Sync {
    fn sample(&self) -> Option<MemorySample>;
}

/// One raw reading from the platform memory signal.
#[derive(Debug, Clone, Copy)]
pub struct MemorySample {
    pub used_bytes: u64,
    pub total_bytes: u64,
}

/// OCR engine collaborator. May be permanently unavailable if its own
/// initialization failed; `is_ready` gates every extraction call.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    fn is_ready(&self) -> bool;

    async fn extract(
        &self,
        payload: &DocumentPayload,
        options: &OcrOptions,
    ) -> Result<OcrResult, PipelineError>;
}

/// Inference-status collaborator. The selector bounds this call at 3 s;
/// implementations need no timeout of their own.
#[async_trait]
pub trait InferenceStatusClient: Send + Sync {
    async fn fetch_status(&self) -> Result<InferenceStatus, PipelineError>;
}

/// Embedding service collaborator. One call = one HTTP request for one model;
/// the embedding stage walks the fallback chain, not the client.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    async fn embed(
        &self,
        text: &str,
        model: &str,
        config: &ModelConfig,
    ) -> Result<EmbeddingResult, PipelineError>;
}

/// GPU compute collaborator used by the tensor-transform stage. Must return
/// a vector of the same length as the input; any error (or a length
/// mismatch) triggers the CPU identity fallback upstream.
#[async_trait]
pub trait ComputeBackend: Send + Sync {
    async fn transform(&self, input: &[f32]) -> Result<Vec<f32>, PipelineError>;
}

/// Persistence collaborator. Fire-and-forget from the pipeline's view — a
/// storage failure never undoes already-computed results.
#[async_trait]
pub trait ResultStore: Send + Sync {
    async fn store(&self, results: &[PipelineResult]) -> Result<(), PipelineError>;
}
