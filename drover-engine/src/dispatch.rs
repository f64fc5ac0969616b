use std::collections::HashMap;

use serde::Deserialize;
use tracing::{debug, info, warn};

use drover_data::{assignments, store, AssignmentStatus, TaskBackend};

use crate::error::{EngineError, Result};
use crate::jobs::JobContext;
use crate::registry::WorkerDetails;

/// Method suffix appended to a worker's endpoint for task hand-off.
pub const EXECUTE_METHOD: &str = "execute";

/// Generic status envelope workers answer dispatch calls with.
#[derive(Debug, Deserialize)]
struct StatusEnvelope {
    status: String,
    #[serde(default)]
    message: String,
}

/// Run one dispatch job for `task_id`.
///
/// Pushes the task to every assigned worker in turn. A worker that is
/// unknown, disabled, or endpoint-less is skipped without recording
/// anything. Transport failures and worker-side errors are recorded as
/// that worker's status and never stop the loop, and each outcome is
/// persisted immediately so partial progress survives a crash
/// mid-loop. The connection is never held across a worker call.
pub async fn run(ctx: &JobContext, task_id: &str) -> Result<()> {
    let (task, pairings, spec) = {
        let conn = ctx.conn.lock().await;
        let Some(kind) = store::resolve_store_kind(&conn, task_id)? else {
            warn!(task_id = %task_id, "dispatch fired for a task that no longer exists");
            return Ok(());
        };
        let Some(spec) = ctx.specializations.get(&kind) else {
            return Err(EngineError::Inconsistent(format!(
                "no specialization registered for store kind '{kind}'"
            )));
        };
        let pairings = assignments::for_task(&conn, task_id)?;
        if pairings.is_empty() {
            info!(task_id = %task_id, "task has no worker assignments, nothing to dispatch");
            return Ok(());
        }
        let Some(task) = store::load(&conn, task_id)? else {
            warn!(task_id = %task_id, "task vanished while loading for dispatch");
            return Ok(());
        };
        (task, pairings, spec)
    };

    let ids: Vec<String> = pairings.iter().map(|p| p.backend_id.clone()).collect();
    let workers: HashMap<String, WorkerDetails> = ctx
        .registry
        .resolve(&ids)
        .into_iter()
        .map(|w| (w.backend_id.clone(), w))
        .collect();

    for pairing in &pairings {
        let Some(worker) = workers.get(&pairing.backend_id) else {
            debug!(backend_id = %pairing.backend_id, "worker not in registry, skipped");
            continue;
        };
        if !worker.enabled {
            debug!(backend_id = %pairing.backend_id, "worker disabled, skipped");
            continue;
        }
        let Some(endpoint) = worker.endpoint.as_deref() else {
            debug!(backend_id = %pairing.backend_id, "worker has no endpoint, skipped");
            continue;
        };

        let body = {
            let conn = ctx.conn.lock().await;
            spec.payload(&conn, &task, &worker.response_shape)?
        };

        let url = format!("{}/{}", endpoint.trim_end_matches('/'), EXECUTE_METHOD);
        let (status, message) = match ctx.http.post(&url).json(&body).send().await {
            Ok(response) => {
                let http_status = response.status();
                let base = if http_status.is_success() {
                    AssignmentStatus::Executing
                } else {
                    AssignmentStatus::Error
                };
                match response.json::<StatusEnvelope>().await {
                    Ok(envelope) => {
                        (base, format!("{} : {}", envelope.status, envelope.message))
                    }
                    Err(_) => (
                        AssignmentStatus::Unknown,
                        format!("Unparseable worker response (HTTP {})", http_status.as_u16()),
                    ),
                }
            }
            Err(e) => (AssignmentStatus::Error, format!("POST {url} failed: {e}")),
        };

        let outcome = TaskBackend {
            backend_id: pairing.backend_id.clone(),
            status,
            message,
        };
        let recorded = {
            let mut conn = ctx.conn.lock().await;
            store::status_updated(&mut conn, &outcome, task_id)?
        };
        if recorded {
            info!(
                task_id = %task_id,
                backend_id = %outcome.backend_id,
                status = %outcome.status,
                "dispatched to worker"
            );
        } else {
            warn!(
                task_id = %task_id,
                backend_id = %outcome.backend_id,
                "status write targeted a stale pairing"
            );
        }
    }

    Ok(())
}
