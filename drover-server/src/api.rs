use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use drover_data::sensing;
use drover_data::{
    assignments, store, uploads, DataView, Paging, Task, TaskBackend, TaskFilter, TaskSummary,
    Visibility,
};
use drover_engine::{
    intake, permissions, scheduler, CompletionReport, EngineError, IntakeOutcome, LifecycleEvent,
    AUTH_BACKENDS,
};

use crate::auth;
use crate::state::AppState;

/// Map an engine failure onto the HTTP status taxonomy.
fn engine_error(e: EngineError) -> (StatusCode, String) {
    let status = match &e {
        EngineError::Validation(_) => StatusCode::BAD_REQUEST,
        EngineError::PermissionDenied(_) => StatusCode::FORBIDDEN,
        EngineError::NotFound(_) | EngineError::Vanished(_) => StatusCode::NOT_FOUND,
        EngineError::Inconsistent(_) | EngineError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, e.to_string())
}

fn db_error<E: Into<EngineError>>(e: E) -> (StatusCode, String) {
    engine_error(e.into())
}

fn paging_from(limit: Option<u32>, offset: Option<u32>) -> Paging {
    let defaults = Paging::default();
    Paging {
        limit: limit.unwrap_or(defaults.limit),
        offset: offset.unwrap_or(defaults.offset),
    }
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

// --- Tasks ---

#[derive(Debug, Deserialize)]
pub struct ScheduleRequest {
    /// Empty to create, exactly one id to update.
    #[serde(default)]
    pub ids: Vec<String>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub visibility: Option<Visibility>,
    #[serde(default)]
    pub state: i64,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Back-end worker ids the task is assigned to.
    #[serde(default)]
    pub backends: Vec<String>,
    pub store_kind: Option<String>,
    #[serde(default)]
    pub extension: serde_json::Value,
}

#[derive(Serialize, Debug)]
pub struct ScheduleResponse {
    pub task_id: String,
}

pub async fn schedule_task(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<ScheduleRequest>,
) -> Result<(StatusCode, Json<ScheduleResponse>), (StatusCode, String)> {
    let identity = auth::require_identity(&state.tokens, &headers)?;

    // On update the persisted marker governs which specialization runs;
    // everything else resolves it from the request.
    let kind = match body.ids.as_slice() {
        [id] => {
            let conn = state.conn().await;
            let perms = permissions::resolve(&conn, state.registry.as_ref(), false, id, &identity)
                .map_err(engine_error)?;
            if !perms.exists() {
                return Err((StatusCode::NOT_FOUND, format!("no task '{id}'")));
            }
            if !perms.is_owner() {
                return Err((
                    StatusCode::FORBIDDEN,
                    "only the owner may modify a task".to_string(),
                ));
            }
            let persisted = store::resolve_store_kind(&conn, id)
                .map_err(db_error)?
                .ok_or_else(|| (StatusCode::NOT_FOUND, format!("no task '{id}'")))?;
            if let Some(requested) = &body.store_kind {
                if requested != &persisted {
                    return Err((
                        StatusCode::BAD_REQUEST,
                        "store kind cannot change on update".to_string(),
                    ));
                }
            }
            persisted
        }
        _ => body
            .store_kind
            .clone()
            .unwrap_or_else(|| sensing::STORE_KIND.to_string()),
    };

    let Some(spec) = state.specializations.get(&kind) else {
        return Err((StatusCode::BAD_REQUEST, format!("unknown store kind '{kind}'")));
    };
    spec.validate(&body.extension)
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;

    let created = body.ids.is_empty();
    let task = Task {
        ids: body.ids,
        owner: identity,
        name: body.name,
        description: body.description,
        visibility: body.visibility.unwrap_or(Visibility::Private),
        state: body.state,
        tags: body.tags,
        backends: body.backends.into_iter().map(TaskBackend::new).collect(),
        store_kind: None,
        created_at: None,
        updated_at: None,
        extension: body.extension,
    };

    let mut conn = state.conn().await;
    let task_id =
        scheduler::schedule(&mut conn, &state.jobs, spec.as_ref(), &task).map_err(engine_error)?;

    let code = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((code, Json(ScheduleResponse { task_id })))
}

#[derive(Debug, Deserialize)]
pub struct GetTaskParams {
    /// Scope the read to one worker's view of the task.
    pub backend: Option<String>,
    /// `minimal` (default) or `full`.
    pub view: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

pub async fn get_task(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Query(params): Query<GetTaskParams>,
) -> Result<Json<Task>, (StatusCode, String)> {
    let identity = auth::require_identity(&state.tokens, &headers)?;

    let view = match params.view.as_deref() {
        None | Some("minimal") => DataView::Minimal,
        Some("full") => DataView::AllDetails,
        Some(other) => {
            return Err((
                StatusCode::BAD_REQUEST,
                format!("unknown view '{other}', expected 'minimal' or 'full'"),
            ));
        }
    };
    let paging = paging_from(params.limit, params.offset);

    let conn = state.conn().await;
    let perms = permissions::resolve(&conn, state.registry.as_ref(), true, &id, &identity)
        .map_err(engine_error)?;
    if !perms.exists() {
        return Err((StatusCode::NOT_FOUND, format!("no task '{id}'")));
    }
    if !perms.can_access_data() {
        return Err((
            StatusCode::FORBIDDEN,
            format!("'{identity}' may not read task '{id}'"),
        ));
    }

    let task = match params.backend.as_deref() {
        // Worker-scoped read: the task is only visible through an
        // existing assignment for that worker.
        Some(backend_id) => store::get(&conn, backend_id, view, paging, &id)
            .map_err(db_error)?
            .ok_or_else(|| {
                (
                    StatusCode::NOT_FOUND,
                    format!("no task '{id}' for worker '{backend_id}'"),
                )
            })?,
        None => {
            let mut task = store::load(&conn, &id)
                .map_err(db_error)?
                .ok_or_else(|| (StatusCode::NOT_FOUND, format!("no task '{id}'")))?;
            if view == DataView::AllDetails {
                task.backends =
                    assignments::for_task_paged(&conn, &id, paging).map_err(db_error)?;
            }
            task
        }
    };
    Ok(Json(task))
}

#[derive(Debug, Deserialize)]
pub struct ListTasksParams {
    pub backend: Option<String>,
    pub owner: Option<String>,
    pub state: Option<i64>,
    /// RFC 3339 lower bound on creation time.
    pub created_since: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

pub async fn list_tasks(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<ListTasksParams>,
) -> Result<Json<Vec<TaskSummary>>, (StatusCode, String)> {
    let identity = auth::require_identity(&state.tokens, &headers)?;

    if let Some(owner) = &params.owner {
        if owner != &identity {
            return Err((
                StatusCode::FORBIDDEN,
                "tasks can only be listed for your own identity".to_string(),
            ));
        }
    }
    let created_since = match &params.created_since {
        Some(raw) => Some(raw.parse::<DateTime<Utc>>().map_err(|e| {
            (
                StatusCode::BAD_REQUEST,
                format!("invalid created_since: {e}"),
            )
        })?),
        None => None,
    };

    let filter = TaskFilter {
        backend_id: params.backend.clone(),
        owner: Some(identity),
        state: params.state,
        created_since,
    };
    let paging = paging_from(params.limit, params.offset);

    let conn = state.conn().await;
    let summaries = store::list(&conn, &filter, paging).map_err(db_error)?;
    Ok(Json(summaries))
}

pub async fn delete_task(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode, (StatusCode, String)> {
    let identity = auth::require_identity(&state.tokens, &headers)?;

    let mut conn = state.conn().await;
    let perms = permissions::resolve(&conn, state.registry.as_ref(), false, &id, &identity)
        .map_err(engine_error)?;
    if !perms.exists() {
        return Err((StatusCode::NOT_FOUND, format!("no task '{id}'")));
    }
    if !perms.is_owner() {
        return Err((
            StatusCode::FORBIDDEN,
            "only the owner may remove a task".to_string(),
        ));
    }

    let kind = store::resolve_store_kind(&conn, &id)
        .map_err(db_error)?
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("no task '{id}'")))?;
    let spec = state.specializations.get(&kind).ok_or_else(|| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("no specialization registered for '{kind}'"),
        )
    })?;

    if store::remove(&mut conn, &id, spec.as_ref()).map_err(db_error)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err((StatusCode::NOT_FOUND, format!("no task '{id}'")))
    }
}

// --- Completion reports ---

pub async fn report_finished(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(report): Json<CompletionReport>,
) -> Result<Json<IntakeOutcome>, (StatusCode, String)> {
    let identity = auth::require_identity(&state.tokens, &headers)?;

    let mut conn = state.conn().await;
    intake::finished(&mut conn, state.registry.as_ref(), &identity, &report)
        .map(Json)
        .map_err(engine_error)
}

// --- Uploads ---

#[derive(Debug, Deserialize)]
pub struct RegisterUpload {
    pub file_id: String,
    pub backend_id: String,
}

#[derive(Serialize, Debug)]
pub struct UploadResponse {
    pub file_id: String,
    pub backend_id: String,
}

pub async fn register_upload(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<RegisterUpload>,
) -> Result<(StatusCode, Json<UploadResponse>), (StatusCode, String)> {
    let identity = auth::require_identity(&state.tokens, &headers)?;

    if body.file_id.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "file_id must not be blank".to_string()));
    }
    let authorized = state
        .registry
        .permissions(&body.backend_id, &identity)
        .is_some_and(|held| held.contains(AUTH_BACKENDS));
    if !authorized {
        return Err((
            StatusCode::FORBIDDEN,
            format!("'{identity}' holds no worker authority on '{}'", body.backend_id),
        ));
    }

    let conn = state.conn().await;
    if uploads::register(&conn, &body.file_id, &body.backend_id).map_err(db_error)? {
        Ok((
            StatusCode::CREATED,
            Json(UploadResponse {
                file_id: body.file_id,
                backend_id: body.backend_id,
            }),
        ))
    } else {
        Err((
            StatusCode::CONFLICT,
            format!("file '{}' is already registered", body.file_id),
        ))
    }
}

// --- Lifecycle events ---
//
// Stand-ins for the external user/worker registries' notification
// feeds; delivery is at-most-once, processing is best-effort.

#[derive(Debug, Deserialize)]
pub struct UserRemovedEvent {
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct BackendRemovedEvent {
    pub backend_id: String,
}

pub async fn user_removed(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<UserRemovedEvent>,
) -> Result<StatusCode, (StatusCode, String)> {
    auth::require_identity(&state.tokens, &headers)?;
    state.bus.publish(LifecycleEvent::UserRemoved {
        user_id: body.user_id,
    });
    Ok(StatusCode::ACCEPTED)
}

pub async fn backend_removed(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<BackendRemovedEvent>,
) -> Result<StatusCode, (StatusCode, String)> {
    auth::require_identity(&state.tokens, &headers)?;
    state.bus.publish(LifecycleEvent::BackendRemoved {
        backend_id: body.backend_id,
    });
    Ok(StatusCode::ACCEPTED)
}
