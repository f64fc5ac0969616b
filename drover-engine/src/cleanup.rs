use std::sync::Arc;

use rusqlite::Connection;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use drover_data::{assignments, store, tasks, SpecializationRegistry};

use crate::events::LifecycleEvent;

/// Spawn the listener that reacts to user and worker removals.
///
/// Both reactions are best-effort: failures are logged and never fed
/// back to whatever triggered the event.
pub fn spawn_cleanup(
    conn: Arc<Mutex<Connection>>,
    specializations: Arc<SpecializationRegistry>,
    mut events: broadcast::Receiver<LifecycleEvent>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("lifecycle cleanup listener started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("lifecycle cleanup listener stopping");
                    break;
                }
                received = events.recv() => match received {
                    Ok(LifecycleEvent::BackendRemoved { backend_id }) => {
                        let conn = conn.lock().await;
                        detach_worker(&conn, &backend_id);
                    }
                    Ok(LifecycleEvent::UserRemoved { user_id }) => {
                        let mut conn = conn.lock().await;
                        remove_user_tasks(&mut conn, &specializations, &user_id);
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "lifecycle cleanup fell behind, events lost");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
    })
}

/// Delete every assignment row for `backend_id` across all tasks. The
/// tasks themselves stay.
pub fn detach_worker(conn: &Connection, backend_id: &str) {
    match assignments::delete_for_backend(conn, backend_id) {
        Ok(removed) => {
            info!(backend_id = %backend_id, removed, "worker deregistered, assignments dropped");
        }
        Err(e) => {
            warn!(backend_id = %backend_id, error = %e, "failed to drop assignments for removed worker");
        }
    }
}

/// Remove every task `user_id` owns, each through its own
/// specialization so the domain rows go with it. Tasks whose store
/// kind cannot be resolved are kept and logged.
pub fn remove_user_tasks(
    conn: &mut Connection,
    specializations: &SpecializationRegistry,
    user_id: &str,
) {
    let task_ids = match tasks::ids_owned_by(conn, user_id) {
        Ok(ids) => ids,
        Err(e) => {
            warn!(user_id = %user_id, error = %e, "failed to enumerate tasks of removed user");
            return;
        }
    };

    let mut removed = 0usize;
    for task_id in &task_ids {
        let kind = match store::resolve_store_kind(conn, task_id) {
            Ok(Some(kind)) => kind,
            Ok(None) => continue,
            Err(e) => {
                warn!(task_id = %task_id, error = %e, "failed to resolve store kind, task kept");
                continue;
            }
        };
        let Some(spec) = specializations.get(&kind) else {
            warn!(task_id = %task_id, kind = %kind, "no specialization registered, task kept");
            continue;
        };
        match store::remove(conn, task_id, spec.as_ref()) {
            Ok(true) => removed += 1,
            Ok(false) => {}
            Err(e) => {
                warn!(task_id = %task_id, error = %e, "failed to remove task of removed user");
            }
        }
    }
    info!(user_id = %user_id, removed, total = task_ids.len(), "removed user's tasks");
}
