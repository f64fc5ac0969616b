use std::sync::Arc;
use std::time::Duration;

use axum::routing::post;
use axum::{Json, Router};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use drover_data::db::test_db;
use drover_data::sensing::SensingStore;
use drover_data::SpecializationRegistry;
use drover_engine::{
    cleanup, jobs, EventBus, InMemoryWorkerRegistry, JobContext, JobScheduler, WorkerDetails,
    AUTH_BACKENDS,
};
use drover_server::auth::{hash_token, TokenMap};
use drover_server::state::AppState;

/// A fully wired server over an in-memory database: job runner and
/// cleanup listener included, so dispatch and event cascades actually
/// happen. Tokens: alice, bob, and the worker identity robot.
pub struct Harness {
    pub state: Arc<AppState>,
    pub registry: Arc<InMemoryWorkerRegistry>,
    cancel: CancellationToken,
}

impl Harness {
    pub async fn start() -> Harness {
        let conn = Arc::new(Mutex::new(test_db()));
        let registry = Arc::new(InMemoryWorkerRegistry::new());
        let mut specs = SpecializationRegistry::new();
        specs.register(Arc::new(SensingStore));
        let specializations = Arc::new(specs);

        let (scheduler, job_rx) = JobScheduler::new();
        let bus = EventBus::new(16);
        let cancel = CancellationToken::new();

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(1))
            .build()
            .unwrap();
        let ctx = JobContext {
            conn: Arc::clone(&conn),
            registry: registry.clone(),
            specializations: Arc::clone(&specializations),
            http,
        };
        jobs::spawn_runner(job_rx, ctx, cancel.clone());
        cleanup::spawn_cleanup(
            Arc::clone(&conn),
            Arc::clone(&specializations),
            bus.subscribe(),
            cancel.clone(),
        );

        let mut tokens = TokenMap::new();
        tokens.insert("alice", &hash_token("alice-token"));
        tokens.insert("bob", &hash_token("bob-token"));
        tokens.insert("robot", &hash_token("robot-token"));

        let state = AppState::new(
            conn,
            registry.clone(),
            specializations,
            scheduler,
            bus,
            tokens,
        );
        Harness { state, registry, cancel }
    }

    /// Register a worker and grant the robot identity authority on it.
    pub fn add_worker(&self, backend_id: &str, endpoint: Option<String>) {
        self.registry.insert_worker(WorkerDetails {
            backend_id: backend_id.to_string(),
            endpoint,
            enabled: true,
            response_shape: "json".to_string(),
        });
        self.registry.grant(backend_id, "robot", [AUTH_BACKENDS]);
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Stand-in back-end worker that accepts every execute call.
/// Returns its base URL.
pub async fn spawn_worker() -> String {
    let app = Router::new().route(
        "/execute",
        post(|| async { Json(serde_json::json!({ "status": "OK", "message": "started" })) }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}
