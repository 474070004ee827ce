//! Adaptive document-processing pipeline.
//!
//! Documents flow through OCR, embedding generation, a tensor transform, and
//! search-index reduction. Around the stages sit a memory-pressure monitor
//! driving a capability tier, a status-aware model selector, a priority
//! batch scheduler, and an optional background worker.

pub mod error;
pub mod priority;
pub mod processor;
pub mod resource;
pub mod scheduler;
pub mod selector;
pub mod stages;
pub mod traits;
pub mod types;
pub mod worker;
