use std::sync::Arc;

use rusqlite::Connection;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use drover_data::{JobKind, SpecializationRegistry};

use crate::dispatch;
use crate::error::{EngineError, Result};
use crate::registry::WorkerRegistry;

/// One-shot job request. Carries only the task id and the job type the
/// task's specialization declared; everything else is looked up when
/// the job runs.
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub task_id: String,
    pub kind: JobKind,
}

/// Handle for submitting jobs, constructed once at startup and passed
/// to every component that fires them.
#[derive(Clone)]
pub struct JobScheduler {
    tx: mpsc::UnboundedSender<JobRequest>,
}

impl JobScheduler {
    /// Create the scheduler and the receiving end for its runner.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<JobRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (JobScheduler { tx }, rx)
    }

    /// Submit a job for immediate, one-shot execution.
    pub fn submit(&self, request: JobRequest) -> Result<()> {
        self.tx.send(request).map_err(|e| {
            EngineError::Inconsistent(format!(
                "job runner is gone, cannot submit dispatch for task '{}'",
                e.0.task_id
            ))
        })
    }
}

/// Everything a running job needs, shared across all jobs.
#[derive(Clone)]
pub struct JobContext {
    pub conn: Arc<Mutex<Connection>>,
    pub registry: Arc<dyn WorkerRegistry>,
    pub specializations: Arc<SpecializationRegistry>,
    /// Client used for worker POSTs; its timeout is the per-call
    /// transport timeout.
    pub http: reqwest::Client,
}

/// Spawn the job runner loop.
///
/// Each received request is executed on its own task, so dispatch jobs
/// for different tasks run concurrently and one slow worker never
/// stalls the queue. Job failures are logged here and never retried.
pub fn spawn_runner(
    mut rx: mpsc::UnboundedReceiver<JobRequest>,
    ctx: JobContext,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("job runner stopping");
                    break;
                }
                request = rx.recv() => {
                    let Some(request) = request else {
                        info!("job channel closed, runner stopping");
                        break;
                    };
                    let ctx = ctx.clone();
                    tokio::spawn(async move {
                        let outcome = match request.kind {
                            JobKind::Dispatch => dispatch::run(&ctx, &request.task_id).await,
                        };
                        if let Err(e) = outcome {
                            error!(
                                task_id = %request.task_id,
                                kind = request.kind.as_str(),
                                error = %e,
                                "job failed"
                            );
                        }
                    });
                }
            }
        }
    })
}
