//! Background-worker offload with direct fallback.
//!
//! The `WorkerHandle` speaks a request/reply protocol over channels, with
//! every request carrying a monotonically increasing `request_id`. A router
//! task matches replies to waiting callers through a pending map keyed by
//! that id, so several dispatches can be in flight on one worker at once and
//! replies may arrive in any order.
//!
//! `WorkerBridge` is the scheduler-facing dispatcher: offload to the worker
//! when one is attached, fall back to running the stages directly on any
//! worker timeout or failure. Offload is an optimization, never a
//! correctness requirement.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use crate::diagnostics::{DiagnosticsHub, PipelineEvent};
use crate::pipeline::error::PipelineError;
use crate::pipeline::processor::StagePipeline;
use crate::pipeline::scheduler::JobDispatcher;
use crate::pipeline::types::{Job, PipelineResult, ResourceState, WorkerReply, WorkerRequest};

/// Why a worker request did not produce a result.
#[derive(Debug)]
pub enum WorkerError {
    /// No reply within the deadline. The request stays with the worker; a
    /// late reply is discarded by the router.
    TimedOut(Duration),
    /// Request or reply channel closed — worker is gone.
    Disconnected,
    /// Worker ran the job and reported a failure.
    Job(String),
}

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<PipelineResult, String>>>>>;

/// Client side of a background worker.
pub struct WorkerHandle {
    tx: mpsc::Sender<WorkerRequest>,
    pending: PendingMap,
    next_id: AtomicU64,
}

impl WorkerHandle {
    /// Attach to a worker's channel pair and start the reply router.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn connect(tx: mpsc::Sender<WorkerRequest>, mut replies: mpsc::Receiver<WorkerReply>) -> Self {
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));

        let router_pending = Arc::clone(&pending);
        tokio::spawn(async move {
            while let Some(reply) = replies.recv().await {
                let waiter = lock_pending(&router_pending).remove(&reply.request_id);
                match waiter {
                    Some(sender) => {
                        let _ = sender.send(reply.outcome);
                    }
                    // Caller gave up (timed out) before the reply landed.
                    None => {
                        tracing::debug!(request_id = reply.request_id, "discarding late worker reply");
                    }
                }
            }
            tracing::debug!("worker reply channel closed, router exiting");
        });

        Self {
            tx,
            pending,
            next_id: AtomicU64::new(1),
        }
    }

    /// Send one job to the worker and wait up to `timeout` for its reply.
    pub async fn request(
        &self,
        job: Job,
        state: ResourceState,
        timeout: Duration,
    ) -> Result<PipelineResult, WorkerError> {
        let request_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (reply_tx, reply_rx) = oneshot::channel();
        lock_pending(&self.pending).insert(request_id, reply_tx);

        let envelope = WorkerRequest {
            request_id,
            job,
            tier: state.tier,
            pressure_ratio: state.pressure_ratio,
        };
        if self.tx.send(envelope).await.is_err() {
            lock_pending(&self.pending).remove(&request_id);
            return Err(WorkerError::Disconnected);
        }

        match tokio::time::timeout(timeout, reply_rx).await {
            Ok(Ok(Ok(result))) => Ok(result),
            Ok(Ok(Err(message))) => Err(WorkerError::Job(message)),
            Ok(Err(_)) => {
                lock_pending(&self.pending).remove(&request_id);
                Err(WorkerError::Disconnected)
            }
            Err(_) => {
                lock_pending(&self.pending).remove(&request_id);
                Err(WorkerError::TimedOut(timeout))
            }
        }
    }
}

fn lock_pending(
    pending: &PendingMap,
) -> std::sync::MutexGuard<'_, HashMap<u64, oneshot::Sender<Result<PipelineResult, String>>>> {
    match pending.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Spawn an in-process worker that runs jobs through the given stages and
/// return a handle connected to it. Must be called from within a Tokio
/// runtime.
pub fn spawn_pipeline_worker(pipeline: Arc<StagePipeline>) -> WorkerHandle {
    let (request_tx, mut request_rx) = mpsc::channel::<WorkerRequest>(64);
    let (reply_tx, reply_rx) = mpsc::channel::<WorkerReply>(64);

    tokio::spawn(async move {
        while let Some(request) = request_rx.recv().await {
            tracing::debug!(
                request_id = request.request_id,
                job_id = %request.job.id,
                tier = %request.tier,
                "worker picked up job"
            );
            let outcome = pipeline
                .execute(&request.job)
                .await
                .map_err(|e| e.to_string());
            if reply_tx
                .send(WorkerReply {
                    request_id: request.request_id,
                    outcome,
                })
                .await
                .is_err()
            {
                break;
            }
        }
        tracing::debug!("worker request channel closed, worker exiting");
    });

    WorkerHandle::connect(request_tx, reply_rx)
}

/// Scheduler-facing dispatcher: worker offload with direct-execution fallback.
pub struct WorkerBridge {
    worker: Option<WorkerHandle>,
    pipeline: Arc<StagePipeline>,
    timeout: Duration,
    diagnostics: DiagnosticsHub,
}

impl WorkerBridge {
    pub fn new(
        worker: Option<WorkerHandle>,
        pipeline: Arc<StagePipeline>,
        timeout: Duration,
        diagnostics: DiagnosticsHub,
    ) -> Self {
        Self {
            worker,
            pipeline,
            timeout,
            diagnostics,
        }
    }
}

#[async_trait]
impl JobDispatcher for WorkerBridge {
    async fn dispatch(
        &self,
        job: Job,
        state: ResourceState,
    ) -> Result<PipelineResult, PipelineError> {
        if let Some(worker) = &self.worker {
            match worker.request(job.clone(), state, self.timeout).await {
                Ok(result) => return Ok(result),
                Err(WorkerError::TimedOut(after)) => {
                    tracing::warn!(job_id = %job.id, after = ?after, "worker timed out, running directly");
                    self.diagnostics.emit(PipelineEvent::WorkerTimedOut {
                        job_id: job.id.to_string(),
                    });
                }
                Err(WorkerError::Job(message)) => {
                    tracing::warn!(job_id = %job.id, error = %message, "worker failed job, running directly");
                    self.diagnostics.emit(PipelineEvent::WorkerFailed {
                        job_id: job.id.to_string(),
                        error: message,
                    });
                }
                Err(WorkerError::Disconnected) => {
                    tracing::warn!(job_id = %job.id, "worker disconnected, running directly");
                    self.diagnostics.emit(PipelineEvent::WorkerFailed {
                        job_id: job.id.to_string(),
                        error: "worker disconnected".to_string(),
                    });
                }
            }
        }

        self.pipeline.execute(&job).await
    }
}
