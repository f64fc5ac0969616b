use std::collections::HashMap;
use std::sync::Arc;

use rusqlite::{Connection, Transaction};

use crate::error::Result;
use crate::types::{JobKind, Task};

/// A concrete task store for one kind of task.
///
/// The core store owns the shared tables and calls back into the
/// specialization, inside the same transaction, for everything the
/// task's `extension` payload owns. A task records which specialization
/// created it (`store_kind`), and later operations are routed back
/// through that marker.
pub trait Specialization: Send + Sync {
    /// Marker persisted on each task row created through this store.
    fn store_kind(&self) -> &'static str;

    /// Which background job the scheduler submits once a task of this
    /// kind is persisted.
    fn dispatch_job(&self) -> JobKind {
        JobKind::Dispatch
    }

    /// Check the domain payload before anything is persisted.
    fn validate(&self, extension: &serde_json::Value) -> Result<()>;

    /// Persist domain rows for a freshly created task. Runs inside the
    /// creating transaction; `task.ids` holds the new id.
    fn after_create(&self, tx: &Transaction, task: &Task) -> Result<()>;

    /// Replace domain rows after a task update. Runs inside the
    /// updating transaction.
    fn after_update(&self, tx: &Transaction, task: &Task) -> Result<()>;

    /// Drop domain rows before the task row disappears. Runs inside
    /// the removing transaction.
    fn before_remove(&self, tx: &Transaction, task_id: &str) -> Result<()>;

    /// Assemble the dispatch body for one worker, scoped to that
    /// worker's preferred response shape.
    fn payload(
        &self,
        conn: &Connection,
        task: &Task,
        response_shape: &str,
    ) -> Result<serde_json::Value>;
}

/// Routes persisted store-kind markers back to their specialization.
#[derive(Clone, Default)]
pub struct SpecializationRegistry {
    entries: HashMap<&'static str, Arc<dyn Specialization>>,
}

impl SpecializationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a specialization under its own store kind. The last
    /// registration for a kind wins.
    pub fn register(&mut self, spec: Arc<dyn Specialization>) {
        self.entries.insert(spec.store_kind(), spec);
    }

    pub fn get(&self, kind: &str) -> Option<Arc<dyn Specialization>> {
        self.entries.get(kind).cloned()
    }
}
