//! HTTP implementations of the pipeline's service collaborators.
//!
//! All three talk JSON over reqwest to the local inference/storage services.
//! Transport and non-2xx failures surface as `PipelineError::Network`; the
//! callers decide what degrades and what fails.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::pipeline::error::PipelineError;
use crate::pipeline::traits::{EmbeddingClient, InferenceStatusClient, ResultStore};
use crate::pipeline::types::{EmbeddingResult, InferenceStatus, ModelConfig, PipelineResult};

/// Identifies this pipeline in service-side request logs.
const CLIENT_SOURCE: &str = "lexora-pipeline";

fn build_client() -> Result<reqwest::Client, PipelineError> {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(60))
        .build()
        .map_err(|e| PipelineError::Network(format!("failed to build HTTP client: {e}")))
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, PipelineError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(PipelineError::Network(format!(
            "service returned {status}: {body}"
        )));
    }
    Ok(response)
}

// ═══════════════════════════════════════════════════════════
// Inference status
// ═══════════════════════════════════════════════════════════

/// GET `{base}/status` on the inference service.
pub struct HttpStatusClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpStatusClient {
    pub fn new(base_url: &str) -> Result<Self, PipelineError> {
        Ok(Self {
            client: build_client()?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl InferenceStatusClient for HttpStatusClient {
    async fn fetch_status(&self) -> Result<InferenceStatus, PipelineError> {
        let response = self
            .client
            .get(format!("{}/status", self.base_url))
            .send()
            .await
            .map_err(|e| PipelineError::Network(format!("status request failed: {e}")))?;
        check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| PipelineError::Network(format!("malformed status reply: {e}")))
    }
}

// ═══════════════════════════════════════════════════════════
// Embeddings
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    text: &'a str,
    model: &'a str,
    fallback: &'a [String],
    parallelism: u32,
    cache_size_mb: u32,
    source: &'static str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
    #[serde(rename = "fromCache", default)]
    from_cache: bool,
    model: String,
}

/// POST `{base}/embeddings` on the inference service.
pub struct HttpEmbeddingClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpEmbeddingClient {
    pub fn new(base_url: &str) -> Result<Self, PipelineError> {
        Ok(Self {
            client: build_client()?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl EmbeddingClient for HttpEmbeddingClient {
    async fn embed(
        &self,
        text: &str,
        model: &str,
        config: &ModelConfig,
    ) -> Result<EmbeddingResult, PipelineError> {
        let request = EmbeddingRequest {
            text,
            model,
            fallback: &config.fallback_chain,
            parallelism: config.parallelism,
            cache_size_mb: config.cache_size_mb,
            source: CLIENT_SOURCE,
        };
        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| PipelineError::Network(format!("embedding request failed: {e}")))?;
        let reply: EmbeddingResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| PipelineError::Network(format!("malformed embedding reply: {e}")))?;

        Ok(EmbeddingResult {
            vector: reply.embedding,
            from_cache: reply.from_cache,
            model_used: reply.model,
        })
    }
}

// ═══════════════════════════════════════════════════════════
// Result storage
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Serialize)]
struct StoreRequest<'a> {
    results: &'a [PipelineResult],
    metadata: StoreMetadata,
}

#[derive(Debug, Serialize)]
struct StoreMetadata {
    source: &'static str,
    stored_at: chrono::DateTime<chrono::Utc>,
}

/// POST `{base}/store` on the storage service.
pub struct HttpResultStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpResultStore {
    pub fn new(base_url: &str) -> Result<Self, PipelineError> {
        Ok(Self {
            client: build_client()?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ResultStore for HttpResultStore {
    async fn store(&self, results: &[PipelineResult]) -> Result<(), PipelineError> {
        let request = StoreRequest {
            results,
            metadata: StoreMetadata {
                source: CLIENT_SOURCE,
                stored_at: chrono::Utc::now(),
            },
        };
        let response = self
            .client
            .post(format!("{}/store", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| PipelineError::Network(format!("store request failed: {e}")))?;
        check_status(response).await?;
        tracing::debug!(count = results.len(), "stored batch results");
        Ok(())
    }
}
