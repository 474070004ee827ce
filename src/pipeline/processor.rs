//! DocumentProcessor — the assembled pipeline.
//!
//! `StagePipeline` runs one job through the four stages in order.
//! `DocumentProcessor` wraps it with the resource monitor, batch scheduler,
//! and worker bridge, and is the public entry point. Every collaborator
//! arrives through `PipelineDependencies` at construction time; nothing is
//! global, so independent processors (and tests) coexist freely.

use std::sync::Arc;
use std::time::Instant;

use crate::config::PipelineConfig;
use crate::diagnostics::{DiagnosticsHub, PipelineEvent};
use crate::pipeline::error::PipelineError;
use crate::pipeline::priority::WeightedPriority;
use crate::pipeline::resource::ResourceMonitor;
use crate::pipeline::scheduler::{BatchRun, BatchScheduler};
use crate::pipeline::selector::ModelSelector;
use crate::pipeline::stages::{embedding, ocr, reduction, tensor};
use crate::pipeline::traits::{
    ComputeBackend, EmbeddingClient, InferenceStatusClient, MemoryProbe, OcrEngine, ResultStore,
};
use crate::pipeline::types::{DocumentPayload, Job, OcrOptions, PipelineResult};
use crate::pipeline::worker::{spawn_pipeline_worker, WorkerBridge};

/// Everything the processor talks to. Injected wholesale at construction.
pub struct PipelineDependencies {
    pub ocr: Arc<dyn OcrEngine>,
    pub status: Arc<dyn InferenceStatusClient>,
    pub embedder: Arc<dyn EmbeddingClient>,
    pub compute: Option<Arc<dyn ComputeBackend>>,
    pub store: Arc<dyn ResultStore>,
    pub probe: Box<dyn MemoryProbe>,
}

/// The four stages, wired to their collaborators. Shared between the direct
/// path and the background worker.
pub struct StagePipeline {
    ocr: Arc<dyn OcrEngine>,
    selector: ModelSelector,
    embedder: Arc<dyn EmbeddingClient>,
    compute: Option<Arc<dyn ComputeBackend>>,
    monitor: Arc<ResourceMonitor>,
    diagnostics: DiagnosticsHub,
}

impl StagePipeline {
    /// Run one job through extraction, embedding, transform, and reduction.
    /// Fail-fast: the first stage error aborts the call.
    pub async fn execute(&self, job: &Job) -> Result<PipelineResult, PipelineError> {
        let started = Instant::now();

        let ocr = ocr::extract_text(self.ocr.as_ref(), job).await?;
        let config = self.selector.select(self.monitor.current().tier).await;
        let embedding = embedding::embed_text(self.embedder.as_ref(), &ocr.text, &config).await?;
        let tensor =
            tensor::transform(self.compute.as_deref(), job.id, &embedding, &self.diagnostics)
                .await;
        let search_index = reduction::reduce(&tensor.vector);

        let elapsed_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            job_id = %job.id,
            model = %embedding.model_used,
            cache_hit = embedding.from_cache,
            index_len = search_index.len(),
            elapsed_ms,
            "pipeline run complete"
        );

        Ok(PipelineResult {
            job_id: job.id,
            cache_hit: embedding.from_cache,
            ocr,
            tensor,
            search_index,
            elapsed_ms,
        })
    }
}

/// Public entry point for single-document and batch processing.
pub struct DocumentProcessor {
    pipeline: Arc<StagePipeline>,
    monitor: Arc<ResourceMonitor>,
    scheduler: BatchScheduler,
    dispatcher: WorkerBridge,
    store: Arc<dyn ResultStore>,
    diagnostics: DiagnosticsHub,
}

impl DocumentProcessor {
    /// Assemble a processor. Spawns the background worker when offload is
    /// enabled, so this must be called from within a Tokio runtime.
    pub fn new(deps: PipelineDependencies, config: PipelineConfig) -> Self {
        let diagnostics = DiagnosticsHub::new(config.diagnostics_capacity);
        let monitor = Arc::new(ResourceMonitor::new(deps.probe, config.thresholds));

        let pipeline = Arc::new(StagePipeline {
            ocr: deps.ocr,
            selector: ModelSelector::new(
                deps.status,
                config.status_timeout(),
                diagnostics.clone(),
            ),
            embedder: deps.embedder,
            compute: deps.compute,
            monitor: Arc::clone(&monitor),
            diagnostics: diagnostics.clone(),
        });

        let worker = if config.offload_to_worker {
            Some(spawn_pipeline_worker(Arc::clone(&pipeline)))
        } else {
            None
        };
        let dispatcher = WorkerBridge::new(
            worker,
            Arc::clone(&pipeline),
            config.worker_timeout(),
            diagnostics.clone(),
        );

        let scheduler = BatchScheduler::new(
            Box::new(WeightedPriority::new(config.weights)),
            config.chunk_sizes,
            config.chunk_delays,
            diagnostics.clone(),
        );

        Self {
            pipeline,
            monitor,
            scheduler,
            dispatcher,
            store: deps.store,
            diagnostics,
        }
    }

    /// Process a single document directly, bypassing scheduling and offload.
    /// Fail-fast: stage errors propagate to the caller.
    pub async fn process_document(
        &self,
        payload: DocumentPayload,
        options: OcrOptions,
    ) -> Result<PipelineResult, PipelineError> {
        self.monitor.sample();
        let job = Job::new(payload, options, 0);
        self.pipeline.execute(&job).await
    }

    /// Process a batch, returning item results in completion order. Failed
    /// items are dropped; see `process_batch_detailed` for counts.
    pub async fn process_batch(
        &self,
        documents: Vec<(DocumentPayload, OcrOptions)>,
    ) -> Vec<PipelineResult> {
        self.process_batch_detailed(documents).await.results
    }

    /// Process a batch and return results together with the run summary.
    ///
    /// Persistence is fire-and-forget: results are handed to the store on a
    /// detached task and a storage failure is logged, never propagated.
    pub async fn process_batch_detailed(
        &self,
        documents: Vec<(DocumentPayload, OcrOptions)>,
    ) -> BatchRun {
        let jobs: Vec<Job> = documents
            .into_iter()
            .enumerate()
            .map(|(index, (payload, options))| Job::new(payload, options, index))
            .collect();

        let run = self
            .scheduler
            .run(&self.dispatcher, &self.monitor, jobs)
            .await;

        if !run.results.is_empty() {
            let store = Arc::clone(&self.store);
            let results = run.results.clone();
            tokio::spawn(async move {
                if let Err(e) = store.store(&results).await {
                    tracing::warn!(error = %e, count = results.len(), "failed to persist batch results");
                }
            });
        }

        run
    }

    pub fn diagnostics(&self) -> &DiagnosticsHub {
        &self.diagnostics
    }

    /// Subscribe to pipeline events (fallbacks, timeouts, tier changes).
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<PipelineEvent> {
        self.diagnostics.subscribe()
    }
}

// ═══════════════════════════════════════════════════════════
// Shared test fixtures
// ═══════════════════════════════════════════════════════════

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::config::PressureThresholds;
    use crate::pipeline::traits::MemorySample;
    use crate::pipeline::types::{
        EmbeddingResult, InferenceStatus, ModelConfig, OcrResult,
    };
    use async_trait::async_trait;
    use std::time::Duration;

    pub struct StubOcr;

    #[async_trait]
    impl OcrEngine for StubOcr {
        fn is_ready(&self) -> bool {
            true
        }

        async fn extract(
            &self,
            payload: &DocumentPayload,
            _options: &OcrOptions,
        ) -> Result<OcrResult, PipelineError> {
            Ok(OcrResult {
                text: format!("contents of {}", payload.filename),
                confidence: 0.92,
                words: vec![],
            })
        }
    }

    pub struct StubStatus;

    #[async_trait]
    impl InferenceStatusClient for StubStatus {
        async fn fetch_status(&self) -> Result<InferenceStatus, PipelineError> {
            Ok(InferenceStatus {
                gpu_detected: true,
                gpu_busy: false,
                gpu_memory_total: 8192,
                gpu_memory_available: 4096,
                models_loading: false,
            })
        }
    }

    /// Deterministic embedder: same text, same vector.
    pub struct StubEmbedder;

    #[async_trait]
    impl EmbeddingClient for StubEmbedder {
        async fn embed(
            &self,
            text: &str,
            model: &str,
            _config: &ModelConfig,
        ) -> Result<EmbeddingResult, PipelineError> {
            let seed = text.len() as f32;
            Ok(EmbeddingResult {
                vector: (0..8).map(|i| seed + i as f32).collect(),
                from_cache: false,
                model_used: model.to_string(),
            })
        }
    }

    pub struct StubStore;

    #[async_trait]
    impl ResultStore for StubStore {
        async fn store(&self, _results: &[PipelineResult]) -> Result<(), PipelineError> {
            Ok(())
        }
    }

    pub struct StubProbe;

    impl MemoryProbe for StubProbe {
        fn sample(&self) -> Option<MemorySample> {
            Some(MemorySample {
                used_bytes: 2,
                total_bytes: 10,
            })
        }
    }

    pub fn dependencies() -> PipelineDependencies {
        PipelineDependencies {
            ocr: Arc::new(StubOcr),
            status: Arc::new(StubStatus),
            embedder: Arc::new(StubEmbedder),
            compute: None,
            store: Arc::new(StubStore),
            probe: Box::new(StubProbe),
        }
    }

    /// A stage pipeline over the stub collaborators, for worker tests.
    pub fn stage_pipeline() -> StagePipeline {
        let diagnostics = DiagnosticsHub::new(16);
        StagePipeline {
            ocr: Arc::new(StubOcr),
            selector: ModelSelector::new(
                Arc::new(StubStatus),
                Duration::from_secs(3),
                diagnostics.clone(),
            ),
            embedder: Arc::new(StubEmbedder),
            compute: None,
            monitor: Arc::new(ResourceMonitor::new(
                Box::new(StubProbe),
                PressureThresholds::default(),
            )),
            diagnostics,
        }
    }

    pub fn stub_job(filename: &str) -> Job {
        Job::new(
            DocumentPayload {
                bytes: vec![0u8; 256],
                filename: filename.to_string(),
                content_type: "image/png".to_string(),
                pixel_count: Some(150_000),
            },
            OcrOptions::default(),
            0,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::pipeline::types::{EmbeddingResult, ModelConfig, OcrResult, TensorSource};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn document(filename: &str) -> (DocumentPayload, OcrOptions) {
        (
            DocumentPayload {
                bytes: vec![0u8; 256],
                filename: filename.to_string(),
                content_type: "image/png".to_string(),
                pixel_count: Some(150_000),
            },
            OcrOptions::default(),
        )
    }

    fn fast_config() -> PipelineConfig {
        PipelineConfig {
            chunk_delays: crate::config::DelayTable {
                low_ms: 1,
                medium_ms: 1,
                high_ms: 1,
            },
            ..PipelineConfig::default()
        }
    }

    #[tokio::test]
    async fn single_document_runs_all_stages() {
        let processor = DocumentProcessor::new(dependencies(), fast_config());
        let (payload, options) = document("deed-of-sale.png");
        let result = processor.process_document(payload, options).await.unwrap();

        assert_eq!(result.ocr.text, "contents of deed-of-sale.png");
        // 8-wide embedding reduces to 2 index components.
        assert_eq!(result.tensor.dimensions, 8);
        assert_eq!(result.search_index.len(), 2);
        assert_eq!(result.tensor.metadata.source, TensorSource::CpuIdentity);
        assert!(!result.cache_hit);
    }

    #[tokio::test]
    async fn single_document_fails_fast_on_ocr_error() {
        struct BrokenOcr;

        #[async_trait]
        impl OcrEngine for BrokenOcr {
            fn is_ready(&self) -> bool {
                false
            }

            async fn extract(
                &self,
                _payload: &DocumentPayload,
                _options: &OcrOptions,
            ) -> Result<OcrResult, PipelineError> {
                unreachable!("gated by is_ready")
            }
        }

        let mut deps = dependencies();
        deps.ocr = Arc::new(BrokenOcr);
        let processor = DocumentProcessor::new(deps, fast_config());

        let (payload, options) = document("deed.png");
        let err = processor.process_document(payload, options).await.unwrap_err();
        assert!(matches!(err, PipelineError::Initialization(_)));
    }

    #[tokio::test]
    async fn batch_processes_all_documents_offloaded() {
        let processor = DocumentProcessor::new(dependencies(), fast_config());
        let documents = (0..6).map(|i| document(&format!("doc-{i}.png"))).collect();
        let run = processor.process_batch_detailed(documents).await;

        assert_eq!(run.outcome.submitted, 6);
        assert_eq!(run.outcome.processed, 6);
        assert_eq!(run.outcome.dropped, 0);
        assert_eq!(run.results.len(), 6);
    }

    #[tokio::test]
    async fn batch_without_offload_runs_directly() {
        let config = PipelineConfig {
            offload_to_worker: false,
            ..fast_config()
        };
        let processor = DocumentProcessor::new(dependencies(), config);
        let results = processor
            .process_batch(vec![document("a.png"), document("b.png")])
            .await;
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn batch_drops_failing_items_and_keeps_rest() {
        struct FlakyEmbedder;

        #[async_trait]
        impl EmbeddingClient for FlakyEmbedder {
            async fn embed(
                &self,
                text: &str,
                model: &str,
                _config: &ModelConfig,
            ) -> Result<EmbeddingResult, PipelineError> {
                if text.contains("poison") {
                    return Err(PipelineError::Network("embedding refused".to_string()));
                }
                Ok(EmbeddingResult {
                    vector: vec![0.5; 8],
                    from_cache: false,
                    model_used: model.to_string(),
                })
            }
        }

        let mut deps = dependencies();
        deps.embedder = Arc::new(FlakyEmbedder);
        let processor = DocumentProcessor::new(deps, fast_config());

        let run = processor
            .process_batch_detailed(vec![
                document("a.png"),
                document("poison.png"),
                document("c.png"),
            ])
            .await;
        assert_eq!(run.outcome.processed, 2);
        assert_eq!(run.outcome.dropped, 1);
    }

    #[tokio::test]
    async fn batch_results_are_persisted() {
        struct CountingStore {
            stored: AtomicUsize,
        }

        #[async_trait]
        impl ResultStore for CountingStore {
            async fn store(&self, results: &[PipelineResult]) -> Result<(), PipelineError> {
                self.stored.fetch_add(results.len(), Ordering::SeqCst);
                Ok(())
            }
        }

        let store = Arc::new(CountingStore {
            stored: AtomicUsize::new(0),
        });
        let mut deps = dependencies();
        deps.store = Arc::clone(&store) as Arc<dyn ResultStore>;
        let processor = DocumentProcessor::new(deps, fast_config());

        let _ = processor
            .process_batch(vec![document("a.png"), document("b.png")])
            .await;

        // Storage runs on a detached task; give it a moment.
        for _ in 0..50 {
            if store.stored.load(Ordering::SeqCst) == 2 {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("batch results were never stored");
    }

    #[tokio::test]
    async fn storage_failure_does_not_affect_results() {
        struct FailingStore;

        #[async_trait]
        impl ResultStore for FailingStore {
            async fn store(&self, _results: &[PipelineResult]) -> Result<(), PipelineError> {
                Err(PipelineError::Network("store unavailable".to_string()))
            }
        }

        let mut deps = dependencies();
        deps.store = Arc::new(FailingStore);
        let processor = DocumentProcessor::new(deps, fast_config());

        let results = processor.process_batch(vec![document("a.png")]).await;
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn two_processors_are_independent() {
        struct RecordingEmbedder {
            calls: Mutex<Vec<String>>,
        }

        #[async_trait]
        impl EmbeddingClient for RecordingEmbedder {
            async fn embed(
                &self,
                text: &str,
                model: &str,
                _config: &ModelConfig,
            ) -> Result<EmbeddingResult, PipelineError> {
                self.calls.lock().unwrap().push(text.to_string());
                Ok(EmbeddingResult {
                    vector: vec![1.0; 4],
                    from_cache: false,
                    model_used: model.to_string(),
                })
            }
        }

        let embedder_a = Arc::new(RecordingEmbedder {
            calls: Mutex::new(vec![]),
        });
        let embedder_b = Arc::new(RecordingEmbedder {
            calls: Mutex::new(vec![]),
        });

        let mut deps_a = dependencies();
        deps_a.embedder = Arc::clone(&embedder_a) as Arc<dyn EmbeddingClient>;
        let mut deps_b = dependencies();
        deps_b.embedder = Arc::clone(&embedder_b) as Arc<dyn EmbeddingClient>;

        let a = DocumentProcessor::new(deps_a, fast_config());
        let b = DocumentProcessor::new(deps_b, fast_config());

        let (payload, options) = document("only-for-a.png");
        let _ = a.process_document(payload, options).await.unwrap();

        assert_eq!(embedder_a.calls.lock().unwrap().len(), 1);
        assert!(embedder_b.calls.lock().unwrap().is_empty());
        drop(b);
    }

    #[tokio::test]
    async fn subscribe_sees_batch_events() {
        let processor = DocumentProcessor::new(dependencies(), fast_config());
        let mut rx = processor.subscribe();

        let _ = processor.process_batch(vec![document("a.png")]).await;

        loop {
            match rx.recv().await.unwrap() {
                crate::diagnostics::PipelineEvent::BatchCompleted { submitted, .. } => {
                    assert_eq!(submitted, 1);
                    break;
                }
                _ => continue,
            }
        }
    }
}
