use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

/// Permission an identity needs on a worker before it may act on that
/// worker's behalf or consume tasks dispatched to it.
pub const AUTH_BACKENDS: &str = "AUTH_BACKENDS";

/// Registry-held detail for one back-end worker.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerDetails {
    pub backend_id: String,
    pub endpoint: Option<String>,
    pub enabled: bool,
    pub response_shape: String,
}

/// Source of worker existence, reachability, and per-identity grants.
///
/// Drover does not own this data. Deployments back it with whatever
/// directory they have; the in-memory implementation below is loaded
/// from server configuration at startup.
pub trait WorkerRegistry: Send + Sync {
    /// The permission set `identity` holds on `backend_id`, or None
    /// when the registry has nothing recorded for the pair.
    fn permissions(&self, backend_id: &str, identity: &str) -> Option<HashSet<String>>;

    /// Resolve worker details for the given ids. Unknown ids are
    /// absent from the result.
    fn resolve(&self, backend_ids: &[String]) -> Vec<WorkerDetails>;
}

/// Worker registry held in memory.
#[derive(Default)]
pub struct InMemoryWorkerRegistry {
    inner: RwLock<RegistryState>,
}

#[derive(Default)]
struct RegistryState {
    workers: HashMap<String, WorkerDetails>,
    grants: HashMap<(String, String), HashSet<String>>,
}

impl InMemoryWorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_worker(&self, details: WorkerDetails) {
        let mut state = self.write();
        state.workers.insert(details.backend_id.clone(), details);
    }

    /// Record the permissions `identity` holds on `backend_id`,
    /// replacing any earlier grant for the pair.
    pub fn grant<I, S>(&self, backend_id: &str, identity: &str, permissions: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut state = self.write();
        state.grants.insert(
            (backend_id.to_string(), identity.to_string()),
            permissions.into_iter().map(Into::into).collect(),
        );
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, RegistryState> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, RegistryState> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl WorkerRegistry for InMemoryWorkerRegistry {
    fn permissions(&self, backend_id: &str, identity: &str) -> Option<HashSet<String>> {
        self.read()
            .grants
            .get(&(backend_id.to_string(), identity.to_string()))
            .cloned()
    }

    fn resolve(&self, backend_ids: &[String]) -> Vec<WorkerDetails> {
        let state = self.read();
        backend_ids
            .iter()
            .filter_map(|id| state.workers.get(id).cloned())
            .collect()
    }
}
