pub mod api;
pub mod auth;
pub mod config;
pub mod state;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::state::AppState;

/// Build the Axum router with all routes
pub fn build_router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        .route("/health", get(api::health))
        .route("/tasks", post(api::schedule_task).get(api::list_tasks))
        .route("/tasks/{id}", get(api::get_task).delete(api::delete_task))
        .route("/reports", post(api::report_finished))
        .route("/uploads", post(api::register_upload))
        .route("/events/user-removed", post(api::user_removed))
        .route("/events/backend-removed", post(api::backend_removed));

    Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tokio::sync::Mutex;
    use tower::ServiceExt;

    use drover_data::db::test_db;
    use drover_data::sensing::SensingStore;
    use drover_data::SpecializationRegistry;
    use drover_engine::{EventBus, InMemoryWorkerRegistry, JobScheduler};

    use crate::auth::{hash_token, TokenMap};

    fn test_router() -> Router {
        let registry: Arc<InMemoryWorkerRegistry> = Arc::new(InMemoryWorkerRegistry::new());
        let mut specs = SpecializationRegistry::new();
        specs.register(Arc::new(SensingStore));
        let (jobs, _rx) = JobScheduler::new();

        let mut tokens = TokenMap::new();
        tokens.insert("alice", &hash_token("alice-token"));

        let state = AppState::new(
            Arc::new(Mutex::new(test_db())),
            registry,
            Arc::new(specs),
            jobs,
            EventBus::new(16),
            tokens,
        );
        build_router(state)
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = test_router();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_health_response_body() {
        let app = test_router();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn test_tasks_require_a_bearer_token() {
        let app = test_router();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/tasks")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_unknown_token_is_rejected() {
        let app = test_router();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/tasks")
                    .header("authorization", "Bearer wrong-token")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_get_nonexistent_task_endpoint() {
        let app = test_router();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/tasks/nonexistent")
                    .header("authorization", "Bearer alice-token")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
