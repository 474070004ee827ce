//! Embedding stage — fallback-chain walk over the embedding service.
//!
//! Tries the selector's primary model first, then each distinct chain entry
//! in order. Each failure is logged and swallowed; only exhausting the whole
//! chain fails the stage, with the last model's error.

use crate::pipeline::error::PipelineError;
use crate::pipeline::traits::EmbeddingClient;
use crate::pipeline::types::{EmbeddingResult, ModelConfig};

pub async fn embed_text(
    client: &dyn EmbeddingClient,
    text: &str,
    config: &ModelConfig,
) -> Result<EmbeddingResult, PipelineError> {
    let mut last_error: Option<PipelineError> = None;

    for model in config.models_to_try() {
        match client.embed(text, model, config).await {
            Ok(result) => {
                if result.from_cache {
                    tracing::debug!(model, "embedding served from cache");
                }
                return Ok(result);
            }
            Err(e) => {
                tracing::warn!(model, error = %e, "embedding model failed, trying next in chain");
                last_error = Some(e);
            }
        }
    }

    Err(last_error
        .unwrap_or_else(|| PipelineError::Network("no embedding model configured".to_string())))
}
