use std::collections::{HashMap, HashSet};

use rusqlite::Connection;

use drover_data::store::VIRTUAL_TAG;
use drover_data::{assignments, tags, tasks, Visibility};

use crate::error::Result;
use crate::registry::WorkerRegistry;

/// Snapshot of what one identity may do with one task, computed per
/// request and thrown away.
///
/// Built fail-closed: a task that does not exist yields an all-deny
/// snapshot instead of an error (callers treat non-existence and
/// permission denial differently), and a worker the registry has no
/// grants recorded for denies everything that references it.
#[derive(Debug, Clone, Default)]
pub struct TaskPermissions {
    exists: bool,
    owner: bool,
    visibility: Option<Visibility>,
    granted: HashMap<String, HashSet<String>>,
}

impl TaskPermissions {
    /// Snapshot for a task that does not exist. Denies everything.
    pub fn absent() -> Self {
        Self::default()
    }

    pub fn exists(&self) -> bool {
        self.exists
    }

    pub fn is_owner(&self) -> bool {
        self.owner
    }

    pub fn visibility(&self) -> Option<Visibility> {
        self.visibility
    }

    /// Whether the identity holds every required permission on every
    /// referenced worker. A worker with no recorded grants fails the
    /// check; an empty reference set passes vacuously.
    pub fn has_permissions(&self, backend_ids: &[String], required: &[&str]) -> bool {
        backend_ids.iter().all(|backend_id| match self.granted.get(backend_id) {
            Some(held) => required.iter().all(|p| held.contains(*p)),
            None => false,
        })
    }

    /// The minimum bar for reading task-derived data: the task exists
    /// and the identity owns it or holds at least one recorded
    /// permission on some assigned worker.
    pub fn can_access_data(&self) -> bool {
        self.exists && (self.owner || self.granted.values().any(|held| !held.is_empty()))
    }
}

/// Build the permission snapshot of `requester` against `task_id`.
///
/// With `need_worker_detail`, the requester's permission set is pulled
/// from the registry for every assigned worker and recorded even when
/// empty. Tasks tagged `virtual` skip worker resolution
/// unconditionally; their worker list, if any, is not permission-gated.
pub fn resolve(
    conn: &Connection,
    registry: &dyn WorkerRegistry,
    need_worker_detail: bool,
    task_id: &str,
    requester: &str,
) -> Result<TaskPermissions> {
    let Some((owner, visibility)) = tasks::owner_and_visibility(conn, task_id)? else {
        return Ok(TaskPermissions::absent());
    };

    let mut snapshot = TaskPermissions {
        exists: true,
        owner: owner == requester,
        visibility: Some(visibility),
        granted: HashMap::new(),
    };

    if !need_worker_detail || tags::has_tag(conn, task_id, VIRTUAL_TAG)? {
        return Ok(snapshot);
    }

    for pairing in assignments::for_task(conn, task_id)? {
        let held = registry
            .permissions(&pairing.backend_id, requester)
            .unwrap_or_default();
        snapshot.granted.insert(pairing.backend_id, held);
    }

    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{InMemoryWorkerRegistry, AUTH_BACKENDS};
    use drover_data::db::test_db;
    use drover_data::types::Visibility as Vis;
    use drover_data::{tags as tag_rows, TaskBackend};

    fn seed_task(conn: &Connection, id: &str, owner: &str, backends: &[&str]) {
        tasks::insert(
            conn,
            &tasks::TaskRow {
                id: id.to_string(),
                owner: owner.to_string(),
                name: "survey".to_string(),
                description: String::new(),
                visibility: Vis::Private,
                state: 0,
                store_kind: "sensing".to_string(),
                created_at: "2026-03-01T08:00:00.000Z".to_string(),
                updated_at: "2026-03-01T08:00:00.000Z".to_string(),
            },
        )
        .unwrap();
        tag_rows::insert_all(conn, id, &["sensing".to_string()]).unwrap();
        for backend in backends {
            assignments::upsert(conn, id, &TaskBackend::new(*backend)).unwrap();
        }
    }

    #[test]
    fn test_missing_task_denies_everything() {
        let conn = test_db();
        let registry = InMemoryWorkerRegistry::new();

        let snapshot = resolve(&conn, &registry, true, "ghost", "alice").unwrap();

        assert!(!snapshot.exists());
        assert!(!snapshot.is_owner());
        assert!(!snapshot.can_access_data());
        assert!(!snapshot.has_permissions(&["probe-1".to_string()], &[AUTH_BACKENDS]));
    }

    #[test]
    fn test_owner_without_grants_can_read_but_not_act_for_workers() {
        let conn = test_db();
        let registry = InMemoryWorkerRegistry::new();
        seed_task(&conn, "t-1", "alice", &["probe-1"]);

        let snapshot = resolve(&conn, &registry, true, "t-1", "alice").unwrap();

        assert!(snapshot.exists());
        assert!(snapshot.is_owner());
        assert_eq!(snapshot.visibility(), Some(Vis::Private));
        assert!(snapshot.can_access_data());
        // probe-1 is assigned but alice holds no grant on it
        assert!(!snapshot.has_permissions(&["probe-1".to_string()], &[AUTH_BACKENDS]));
    }

    #[test]
    fn test_has_permissions_requires_every_worker() {
        let conn = test_db();
        let registry = InMemoryWorkerRegistry::new();
        seed_task(&conn, "t-1", "alice", &["probe-1", "probe-2"]);
        registry.grant("probe-1", "relay", [AUTH_BACKENDS]);

        let snapshot = resolve(&conn, &registry, true, "t-1", "relay").unwrap();

        assert!(snapshot.has_permissions(&["probe-1".to_string()], &[AUTH_BACKENDS]));
        // probe-2 has no recorded grant for relay, so the pair fails
        assert!(!snapshot.has_permissions(
            &["probe-1".to_string(), "probe-2".to_string()],
            &[AUTH_BACKENDS]
        ));
        // A worker never referenced by the task fails outright
        assert!(!snapshot.has_permissions(&["ghost".to_string()], &[AUTH_BACKENDS]));
    }

    #[test]
    fn test_non_owner_with_grant_can_access_data() {
        let conn = test_db();
        let registry = InMemoryWorkerRegistry::new();
        seed_task(&conn, "t-1", "alice", &["probe-1"]);
        registry.grant("probe-1", "relay", [AUTH_BACKENDS]);

        let snapshot = resolve(&conn, &registry, true, "t-1", "relay").unwrap();

        assert!(!snapshot.is_owner());
        assert!(snapshot.can_access_data());
    }

    #[test]
    fn test_cheap_path_skips_worker_resolution() {
        let conn = test_db();
        let registry = InMemoryWorkerRegistry::new();
        seed_task(&conn, "t-1", "alice", &["probe-1"]);
        registry.grant("probe-1", "relay", [AUTH_BACKENDS]);

        let snapshot = resolve(&conn, &registry, false, "t-1", "relay").unwrap();

        // Ownership is known, but no grants were pulled
        assert!(snapshot.exists());
        assert!(!snapshot.has_permissions(&["probe-1".to_string()], &[AUTH_BACKENDS]));
    }

    #[test]
    fn test_virtual_task_skips_worker_gating() {
        let conn = test_db();
        let registry = InMemoryWorkerRegistry::new();
        seed_task(&conn, "t-1", "alice", &[]);
        tag_rows::insert_all(&conn, "t-1", &[VIRTUAL_TAG.to_string()]).unwrap();

        let snapshot = resolve(&conn, &registry, true, "t-1", "alice").unwrap();

        assert!(snapshot.exists());
        assert!(snapshot.can_access_data());
        // Nothing referenced, nothing to gate on
        assert!(snapshot.has_permissions(&[], &[AUTH_BACKENDS]));
    }
}
