use rusqlite::Connection;
use tracing::{error, info};

use drover_data::{store, Specialization, Task};

use crate::error::{EngineError, Result};
use crate::jobs::{JobRequest, JobScheduler};

/// Persist a task and queue its one-shot dispatch.
///
/// Zero ids creates, one id updates, more is rejected. Persistence and
/// job submission form a small saga: when submission fails after a
/// create, the fresh row is removed again so no task can exist that
/// was never queued for dispatch. An update that fails submission
/// keeps the row, since the pre-update state is already gone, and the
/// caller is told exactly that.
pub fn schedule(
    conn: &mut Connection,
    jobs: &JobScheduler,
    spec: &dyn Specialization,
    task: &Task,
) -> Result<String> {
    if task.owner.trim().is_empty() {
        return Err(EngineError::Validation(
            "task owner must not be blank".to_string(),
        ));
    }
    if task.tags.is_empty() {
        return Err(EngineError::Validation(
            "task needs at least one type tag".to_string(),
        ));
    }

    let created = task.ids.is_empty();
    let task_id = match task.ids.as_slice() {
        [] => {
            let id = store::create(conn, task, spec)?;
            info!(task_id = %id, kind = spec.store_kind(), "task created");
            id
        }
        [id] => {
            if !store::update(conn, id, task, spec)? {
                return Err(EngineError::Vanished(id.clone()));
            }
            info!(task_id = %id, "task updated");
            id.clone()
        }
        more => {
            return Err(EngineError::Validation(format!(
                "scheduling with {} ids is unsupported, pass zero to create or one to update",
                more.len()
            )));
        }
    };

    let request = JobRequest {
        task_id: task_id.clone(),
        kind: spec.dispatch_job(),
    };
    if let Err(e) = jobs.submit(request) {
        if created {
            return match store::remove(conn, &task_id, spec) {
                Ok(_) => {
                    error!(task_id = %task_id, error = %e, "dispatch submission failed, new task rolled back");
                    Err(EngineError::Inconsistent(format!(
                        "dispatch submission failed, task '{task_id}' was rolled back"
                    )))
                }
                Err(rollback) => {
                    error!(
                        task_id = %task_id,
                        error = %e,
                        rollback_error = %rollback,
                        "dispatch submission failed and rollback failed too"
                    );
                    Err(EngineError::Inconsistent(format!(
                        "dispatch submission failed and task '{task_id}' could not be rolled back"
                    )))
                }
            };
        }
        error!(task_id = %task_id, error = %e, "dispatch submission failed after update");
        return Err(EngineError::Inconsistent(format!(
            "task '{task_id}' was persisted but dispatch submission failed"
        )));
    }

    Ok(task_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use drover_data::db::test_db;
    use drover_data::sensing::SensingStore;
    use drover_data::types::{JobKind, TaskBackend, Visibility};
    use drover_data::{assignments, AssignmentStatus};

    fn draft(owner: &str, tags: &[&str], backends: &[&str]) -> Task {
        Task {
            ids: Vec::new(),
            owner: owner.to_string(),
            name: "field survey".to_string(),
            description: String::new(),
            visibility: Visibility::Private,
            state: 0,
            tags: tags.iter().map(|t| t.to_string()).collect(),
            backends: backends.iter().map(|b| TaskBackend::new(*b)).collect(),
            store_kind: None,
            created_at: None,
            updated_at: None,
            extension: json!({ "outputs": ["moisture"] }),
        }
    }

    #[test]
    fn test_create_persists_and_queues_dispatch() {
        let mut conn = test_db();
        let (jobs, mut rx) = JobScheduler::new();

        let task = draft("alice", &["sensing"], &["w1"]);
        let task_id = schedule(&mut conn, &jobs, &SensingStore, &task).unwrap();

        assert!(store::load(&conn, &task_id).unwrap().is_some());
        let request = rx.try_recv().unwrap();
        assert_eq!(request.task_id, task_id);
        assert_eq!(request.kind, JobKind::Dispatch);
    }

    #[test]
    fn test_update_replaces_and_requeues() {
        let mut conn = test_db();
        let (jobs, mut rx) = JobScheduler::new();

        let task = draft("alice", &["sensing"], &["w1"]);
        let task_id = schedule(&mut conn, &jobs, &SensingStore, &task).unwrap();
        rx.try_recv().unwrap();

        let mut revised = draft("alice", &["sensing"], &["w2"]);
        revised.ids = vec![task_id.clone()];
        let updated_id = schedule(&mut conn, &jobs, &SensingStore, &revised).unwrap();
        assert_eq!(updated_id, task_id);

        let pairings = assignments::for_task(&conn, &task_id).unwrap();
        assert_eq!(pairings.len(), 1);
        assert_eq!(pairings[0].backend_id, "w2");
        assert_eq!(pairings[0].status, AssignmentStatus::NotStarted);
        assert_eq!(rx.try_recv().unwrap().task_id, task_id);
    }

    #[test]
    fn test_update_of_vanished_task_fails() {
        let mut conn = test_db();
        let (jobs, mut rx) = JobScheduler::new();

        let mut task = draft("alice", &["sensing"], &["w1"]);
        task.ids = vec!["gone".to_string()];

        assert!(matches!(
            schedule(&mut conn, &jobs, &SensingStore, &task),
            Err(EngineError::Vanished(_))
        ));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_multi_id_scheduling_is_rejected() {
        let mut conn = test_db();
        let (jobs, _rx) = JobScheduler::new();

        let mut task = draft("alice", &["sensing"], &[]);
        task.ids = vec!["a".to_string(), "b".to_string()];

        assert!(matches!(
            schedule(&mut conn, &jobs, &SensingStore, &task),
            Err(EngineError::Validation(_))
        ));
    }

    #[test]
    fn test_malformed_tasks_are_rejected_before_persistence() {
        let mut conn = test_db();
        let (jobs, _rx) = JobScheduler::new();

        let blank_owner = draft("   ", &["sensing"], &[]);
        assert!(matches!(
            schedule(&mut conn, &jobs, &SensingStore, &blank_owner),
            Err(EngineError::Validation(_))
        ));

        let untagged = draft("alice", &[], &[]);
        assert!(matches!(
            schedule(&mut conn, &jobs, &SensingStore, &untagged),
            Err(EngineError::Validation(_))
        ));
    }

    #[test]
    fn test_failed_submission_rolls_back_a_create() {
        let mut conn = test_db();
        let (jobs, rx) = JobScheduler::new();
        drop(rx); // job runner is gone, every submit now fails

        let task = draft("alice", &["sensing"], &["w1"]);
        let result = schedule(&mut conn, &jobs, &SensingStore, &task);
        assert!(matches!(result, Err(EngineError::Inconsistent(_))));

        // No orphaned row survives the rollback.
        let listed = store::list(&conn, &Default::default(), Default::default()).unwrap();
        assert!(listed.is_empty());
    }

    #[test]
    fn test_failed_submission_after_update_keeps_the_row() {
        let mut conn = test_db();
        let (jobs, rx) = JobScheduler::new();

        let task = draft("alice", &["sensing"], &["w1"]);
        let task_id = schedule(&mut conn, &jobs, &SensingStore, &task).unwrap();
        drop(rx);

        let mut revised = draft("alice", &["sensing"], &["w2"]);
        revised.ids = vec![task_id.clone()];
        let result = schedule(&mut conn, &jobs, &SensingStore, &revised);
        assert!(matches!(result, Err(EngineError::Inconsistent(_))));

        assert!(store::load(&conn, &task_id).unwrap().is_some());
    }
}
