//! Lexora document-processing pipeline.
//!
//! Turns scanned legal documents into searchable vector data through four
//! stages — OCR text extraction, embedding generation, a tensor transform,
//! and search-index reduction — while adapting batch throughput to memory
//! pressure and inference-service capacity.
//!
//! Entry point is [`DocumentProcessor`]: hand it a [`PipelineDependencies`]
//! with your service clients and a [`PipelineConfig`], then call
//! `process_document` or `process_batch`.

pub mod clients;
pub mod config;
pub mod diagnostics;
pub mod pipeline;

pub use config::PipelineConfig;
pub use diagnostics::{DiagnosticsHub, PipelineEvent};
pub use pipeline::error::PipelineError;
pub use pipeline::processor::{DocumentProcessor, PipelineDependencies, StagePipeline};
pub use pipeline::resource::{ProcMeminfoProbe, ResourceMonitor};
pub use pipeline::scheduler::{BatchRun, BatchScheduler, JobDispatcher};
pub use pipeline::selector::ModelSelector;
pub use pipeline::types::{
    BatchOutcome, DocumentPayload, Job, OcrOptions, OcrQuality, PipelineResult, Tier,
};

#[cfg(feature = "gpu-compute")]
pub use pipeline::stages::tensor::WgpuBackend;
