//! BatchScheduler — priority ordering, tier-driven chunking, fail-soft runs.
//!
//! A batch is scored, sorted highest-priority-first, then processed in chunks
//! whose size tracks the current tier. Chunk members run concurrently and
//! results are collected in completion order. One failed item is logged,
//! counted, and dropped — it never aborts its chunk or the batch. Between
//! chunks the scheduler re-samples memory pressure and sleeps the tier's
//! adaptive delay, so a batch that starts at full speed backs off as pressure
//! climbs.

use std::cmp::Ordering;
use std::time::Instant;

use async_trait::async_trait;
use futures_util::stream::{FuturesUnordered, StreamExt};

use crate::config::{ChunkTable, DelayTable};
use crate::diagnostics::{DiagnosticsHub, PipelineEvent};
use crate::pipeline::error::PipelineError;
use crate::pipeline::priority::PriorityStrategy;
use crate::pipeline::resource::ResourceMonitor;
use crate::pipeline::types::{BatchOutcome, Job, PipelineResult, ResourceState};

/// Executes one job. Implemented by the worker bridge (offload with direct
/// fallback) and, in tests, by stubs.
#[async_trait]
pub trait JobDispatcher: Send + Sync {
    async fn dispatch(&self, job: Job, state: ResourceState)
        -> Result<PipelineResult, PipelineError>;
}

/// Item results plus the run summary.
pub struct BatchRun {
    pub results: Vec<PipelineResult>,
    pub outcome: BatchOutcome,
}

pub struct BatchScheduler {
    strategy: Box<dyn PriorityStrategy>,
    chunks: ChunkTable,
    delays: DelayTable,
    diagnostics: DiagnosticsHub,
}

impl BatchScheduler {
    pub fn new(
        strategy: Box<dyn PriorityStrategy>,
        chunks: ChunkTable,
        delays: DelayTable,
        diagnostics: DiagnosticsHub,
    ) -> Self {
        Self {
            strategy,
            chunks,
            delays,
            diagnostics,
        }
    }

    /// Run a batch to completion. Item failures are dropped, not propagated;
    /// the returned results are in completion order, not submission order.
    pub async fn run(
        &self,
        dispatcher: &dyn JobDispatcher,
        monitor: &ResourceMonitor,
        mut jobs: Vec<Job>,
    ) -> BatchRun {
        let started = Instant::now();
        let submitted = jobs.len();

        for job in &mut jobs {
            job.priority = self.strategy.score(job);
        }
        // Descending by score. Equal scores keep no particular order; the
        // strategy's recency term already separates same-signal documents.
        jobs.sort_by(|a, b| b.priority.partial_cmp(&a.priority).unwrap_or(Ordering::Equal));

        let mut state = monitor.sample();
        let mut results = Vec::with_capacity(submitted);
        let mut dropped = 0usize;
        let mut remaining = jobs.into_iter();
        let mut chunk_index = 0usize;

        loop {
            let chunk: Vec<Job> = remaining
                .by_ref()
                .take(self.chunks.for_tier(state.tier))
                .collect();
            if chunk.is_empty() {
                break;
            }

            let dispatched = chunk.len();
            tracing::debug!(
                chunk_index,
                dispatched,
                tier = %state.tier,
                "dispatching chunk"
            );

            let mut in_flight: FuturesUnordered<_> = chunk
                .into_iter()
                .map(|job| {
                    let id = job.id;
                    async move { (id, dispatcher.dispatch(job, state).await) }
                })
                .collect();

            let mut succeeded = 0usize;
            while let Some((id, outcome)) = in_flight.next().await {
                match outcome {
                    Ok(result) => {
                        succeeded += 1;
                        results.push(result);
                    }
                    Err(e) => {
                        dropped += 1;
                        tracing::warn!(error = %PipelineError::for_item(id, e), "dropping batch item");
                    }
                }
            }

            self.diagnostics.emit(PipelineEvent::ChunkCompleted {
                chunk_index,
                dispatched,
                succeeded,
            });
            chunk_index += 1;

            let next = monitor.sample();
            if next.tier != state.tier {
                tracing::info!(from = %state.tier, to = %next.tier, "tier changed between chunks");
                self.diagnostics.emit(PipelineEvent::TierChanged {
                    tier: next.tier,
                    pressure_ratio: next.pressure_ratio,
                });
            }
            state = next;

            if remaining.as_slice().is_empty() {
                break;
            }
            tokio::time::sleep(self.delays.for_tier(state.tier)).await;
        }

        let outcome = BatchOutcome {
            submitted,
            processed: results.len(),
            dropped,
            duration_ms: started.elapsed().as_millis() as u64,
        };
        tracing::info!(
            submitted = outcome.submitted,
            processed = outcome.processed,
            dropped = outcome.dropped,
            duration_ms = outcome.duration_ms,
            "batch complete"
        );
        self.diagnostics.emit(PipelineEvent::BatchCompleted {
            submitted: outcome.submitted,
            processed: outcome.processed,
            dropped: outcome.dropped,
            duration_ms: outcome.duration_ms,
        });

        BatchRun { results, outcome }
    }
}
