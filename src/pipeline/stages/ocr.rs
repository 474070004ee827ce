//! Text-extraction stage.
//!
//! Thin gate over the `OcrEngine` collaborator: a not-ready engine fails the
//! job immediately, because there is no alternative text-extraction path.

use crate::pipeline::error::PipelineError;
use crate::pipeline::traits::OcrEngine;
use crate::pipeline::types::{Job, OcrResult};

pub async fn extract_text(engine: &dyn OcrEngine, job: &Job) -> Result<OcrResult, PipelineError> {
    if !engine.is_ready() {
        return Err(PipelineError::Initialization(
            "engine reported not ready".to_string(),
        ));
    }

    let result = engine.extract(&job.payload, &job.options).await?;
    tracing::debug!(
        job_id = %job.id,
        chars = result.text.len(),
        confidence = result.confidence,
        "text extraction complete"
    );
    Ok(result)
}
