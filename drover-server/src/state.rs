use std::sync::Arc;

use rusqlite::Connection;
use tokio::sync::{Mutex, MutexGuard};

use drover_data::SpecializationRegistry;
use drover_engine::{EventBus, JobScheduler, WorkerRegistry};

use crate::auth::TokenMap;

/// Shared application state accessible by all handlers.
///
/// The connection is the same one the job runner and cleanup listener
/// use; handlers must not hold it across outbound awaits.
pub struct AppState {
    conn: Arc<Mutex<Connection>>,
    pub registry: Arc<dyn WorkerRegistry>,
    pub specializations: Arc<SpecializationRegistry>,
    pub jobs: JobScheduler,
    pub bus: EventBus,
    pub tokens: TokenMap,
}

impl AppState {
    pub fn new(
        conn: Arc<Mutex<Connection>>,
        registry: Arc<dyn WorkerRegistry>,
        specializations: Arc<SpecializationRegistry>,
        jobs: JobScheduler,
        bus: EventBus,
        tokens: TokenMap,
    ) -> Arc<Self> {
        Arc::new(Self {
            conn,
            registry,
            specializations,
            jobs,
            bus,
            tokens,
        })
    }

    /// Lock the shared database connection.
    pub async fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().await
    }
}
