use std::collections::HashSet;

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use drover_data::measurements::{self, ResultRecord};
use drover_data::{store, uploads, AssignmentStatus, TaskBackend};

use crate::error::{EngineError, Result};
use crate::permissions;
use crate::registry::{WorkerRegistry, AUTH_BACKENDS};

/// One worker's final say on the tasks a report references.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerOutcome {
    pub backend_id: String,
    pub status: AssignmentStatus,
    #[serde(default)]
    pub message: String,
}

/// A worker's asynchronous completion report.
///
/// One report can reference several tasks when they share the same
/// workers; outcomes and results apply to every referenced task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionReport {
    #[serde(default)]
    pub task_ids: Vec<String>,
    #[serde(default)]
    pub outcomes: Vec<WorkerOutcome>,
    #[serde(default)]
    pub results: Vec<ResultRecord>,
    /// A fresh task definition has no place in a completion report and
    /// is rejected when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition: Option<serde_json::Value>,
}

/// What a processed report amounted to.
#[derive(Debug, Serialize)]
pub struct IntakeOutcome {
    pub task_ids: Vec<String>,
    pub results_accepted: usize,
}

/// Process a worker's completion report on behalf of `requester`.
///
/// Task ids that resolve to nothing are dropped with a warning, but a
/// single task for which the requester lacks worker authority fails
/// the whole call before any row is touched. Status writes targeting
/// a pairing that does not exist are fatal, an inconsistent status
/// being worse than a rejected call.
pub fn finished(
    conn: &mut Connection,
    registry: &dyn WorkerRegistry,
    requester: &str,
    report: &CompletionReport,
) -> Result<IntakeOutcome> {
    if report.task_ids.is_empty() {
        return Err(EngineError::Validation(
            "completion report must reference at least one task".to_string(),
        ));
    }
    if report.definition.is_some() {
        return Err(EngineError::Validation(
            "completion report cannot carry a task definition".to_string(),
        ));
    }
    if report.outcomes.is_empty() && report.results.is_empty() {
        return Err(EngineError::Validation(
            "completion report carries neither outcomes nor results".to_string(),
        ));
    }

    let mut named: Vec<String> = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();
    for backend_id in report
        .outcomes
        .iter()
        .map(|o| o.backend_id.as_str())
        .chain(report.results.iter().map(|r| r.backend_id.as_str()))
    {
        if seen.insert(backend_id) {
            named.push(backend_id.to_string());
        }
    }

    // Authorization before any write: one unauthorized pairing fails
    // the whole call, so a bad report cannot ride in on a valid id.
    let mut surviving: Vec<String> = Vec::new();
    for task_id in &report.task_ids {
        let perms = permissions::resolve(conn, registry, true, task_id, requester)?;
        if !perms.exists() {
            warn!(task_id = %task_id, "completion report references an unknown task, dropped");
            continue;
        }
        if !perms.has_permissions(&named, &[AUTH_BACKENDS]) {
            return Err(EngineError::PermissionDenied(format!(
                "'{requester}' may not report for task '{task_id}'"
            )));
        }
        surviving.push(task_id.clone());
    }
    if surviving.is_empty() {
        return Err(EngineError::NotFound(
            "none of the reported tasks exist".to_string(),
        ));
    }

    for outcome in &report.outcomes {
        let pairing = TaskBackend {
            backend_id: outcome.backend_id.clone(),
            status: outcome.status,
            message: outcome.message.clone(),
        };
        for task_id in &surviving {
            if !store::status_updated(conn, &pairing, task_id)? {
                return Err(EngineError::Inconsistent(format!(
                    "status report for task '{}' names worker '{}' which is not assigned to it",
                    task_id, outcome.backend_id
                )));
            }
        }
    }

    let mut accepted: Vec<ResultRecord> = Vec::new();
    for record in &report.results {
        if let Some(file_id) = record.file_id.as_deref() {
            if !uploads::is_owner(conn, file_id, &record.backend_id)? {
                warn!(
                    backend_id = %record.backend_id,
                    file_id = %file_id,
                    "result claims a file the worker did not register, dropped"
                );
                continue;
            }
        }
        accepted.push(record.clone());
    }
    let result_rows = if accepted.is_empty() {
        0
    } else {
        measurements::insert_all(conn, &surviving, &accepted)?
    };

    info!(
        tasks = surviving.len(),
        outcomes = report.outcomes.len(),
        result_rows,
        "completion report processed"
    );
    Ok(IntakeOutcome {
        task_ids: surviving,
        results_accepted: accepted.len(),
    })
}
