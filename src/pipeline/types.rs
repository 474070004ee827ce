//! Core types for the document-processing pipeline.
//!
//! These model the full lifecycle:
//! Job → OCR → Embedding → Tensor transform → Search-index reduction → Result.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ═══════════════════════════════════════════
// Capability tier
// ═══════════════════════════════════════════

/// Coarse quality/capacity setting derived from memory pressure.
///
/// Controls chunk size, inter-chunk delay, and model-config adjustments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Low,
    Medium,
    High,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Snapshot of resource pressure and the tier derived from it.
///
/// Produced only by the `ResourceMonitor`; read-copy everywhere else.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ResourceState {
    pub tier: Tier,
    /// Used/total memory fraction in `[0, 1]`.
    pub pressure_ratio: f32,
}

impl ResourceState {
    /// Optimistic initial state, used until the first successful probe.
    pub fn initial() -> Self {
        Self {
            tier: Tier::High,
            pressure_ratio: 0.0,
        }
    }
}

// ═══════════════════════════════════════════
// Job (input)
// ═══════════════════════════════════════════

/// Source document for one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentPayload {
    /// Raw image bytes (scanned page or rendered PDF page).
    pub bytes: Vec<u8>,
    pub filename: String,
    /// MIME type of the source (e.g. `application/pdf`, `image/png`).
    pub content_type: String,
    /// Pixel count for raw-image sources, if known.
    pub pixel_count: Option<u64>,
}

/// OCR language/quality options carried with a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrOptions {
    pub languages: Vec<String>,
    pub quality: OcrQuality,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OcrQuality {
    Fast,
    Balanced,
    Thorough,
}

impl Default for OcrOptions {
    fn default() -> Self {
        Self {
            languages: vec!["eng".to_string()],
            quality: OcrQuality::Balanced,
        }
    }
}

/// One unit of pipeline work. Immutable once queued — the scheduler assigns
/// `priority` before sorting, nothing mutates a job after that.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub payload: DocumentPayload,
    pub options: OcrOptions,
    /// Priority score, filled in by the scheduler.
    pub priority: f64,
    /// Position in the caller's submission order (tie-break input).
    pub submission_index: usize,
}

impl Job {
    pub fn new(payload: DocumentPayload, options: OcrOptions, submission_index: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            payload,
            options,
            priority: 0.0,
            submission_index,
        }
    }
}

// ═══════════════════════════════════════════
// Model configuration
// ═══════════════════════════════════════════

/// Embedding-model configuration, produced fresh per call by the selector.
///
/// Not cached across calls: inference-service status can change between calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub model_name: String,
    /// Ordered most-preferred-first alternatives. Walked by the embedding
    /// stage only when the previous model fails — the selector never retries.
    pub fallback_chain: Vec<String>,
    pub parallelism: u32,
    pub cache_size_mb: u32,
    /// Set when local capacity is so constrained that an external
    /// orchestration fallback should take over.
    pub external_fallback: bool,
}

impl ModelConfig {
    /// Primary model followed by the fallback chain, de-duplicated.
    pub fn models_to_try(&self) -> Vec<&str> {
        let mut models: Vec<&str> = vec![self.model_name.as_str()];
        for m in &self.fallback_chain {
            if !models.contains(&m.as_str()) {
                models.push(m.as_str());
            }
        }
        models
    }
}

/// Status report from the inference-status collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceStatus {
    pub gpu_detected: bool,
    pub gpu_busy: bool,
    /// Total GPU memory in MB.
    pub gpu_memory_total: u64,
    /// Available GPU memory in MB.
    pub gpu_memory_available: u64,
    pub models_loading: bool,
}

// ═══════════════════════════════════════════
// Stage results
// ═══════════════════════════════════════════

/// Bounding box for a recognized word (review-screen highlighting).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrWord {
    pub text: String,
    pub bbox: BoundingBox,
    pub confidence: f32,
}

/// Output of the text-extraction stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrResult {
    pub text: String,
    pub confidence: f32,
    pub words: Vec<OcrWord>,
}

/// Output of the embedding stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingResult {
    pub vector: Vec<f32>,
    pub from_cache: bool,
    pub model_used: String,
}

/// Where a tensor result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TensorSource {
    GpuTransform,
    /// Identity fallback — vector passed through unmodified.
    CpuIdentity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TensorMetadata {
    pub source: TensorSource,
    pub produced_at: DateTime<Utc>,
    /// Job this tensor belongs to.
    pub id: Uuid,
    pub confidence: f32,
}

/// Output of the tensor-transform stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TensorResult {
    pub vector: Vec<f32>,
    pub dimensions: usize,
    pub metadata: TensorMetadata,
}

/// Final output of one pipeline run. Owned by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResult {
    pub job_id: Uuid,
    pub ocr: OcrResult,
    pub tensor: TensorResult,
    pub search_index: Vec<f32>,
    pub elapsed_ms: u64,
    /// True when the embedding service answered from its cache.
    pub cache_hit: bool,
}

// ═══════════════════════════════════════════
// Worker envelopes
// ═══════════════════════════════════════════

/// Outbound message to the background worker. Correlated by `request_id`,
/// so multiple dispatches to one worker can be in flight at once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerRequest {
    pub request_id: u64,
    pub job: Job,
    pub tier: Tier,
    pub pressure_ratio: f32,
}

/// Inbound reply from the background worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerReply {
    pub request_id: u64,
    pub outcome: Result<PipelineResult, String>,
}

// ═══════════════════════════════════════════
// Batch outcome
// ═══════════════════════════════════════════

/// Summary of one batch run (item results are returned separately).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub submitted: usize,
    pub processed: usize,
    pub dropped: usize,
    pub duration_ms: u64,
}
