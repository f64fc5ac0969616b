use rusqlite::Connection;
use uuid::Uuid;

use crate::error::Result;
use crate::extension::Specialization;
use crate::types::{now_ts, DataView, Paging, Task, TaskBackend, TaskFilter, TaskSummary};
use crate::{assignments, tags, tasks};

/// Tag that marks a task as self-contained: it references no real
/// worker, and worker-grant checks do not apply to it.
pub const VIRTUAL_TAG: &str = "virtual";

/// Persist a new task and its domain rows in one transaction.
///
/// Generates the task id, stamps both timestamps, and records the
/// specialization's marker. Assignments keep whatever status and
/// message the caller pre-set on them; pairings left at their default
/// start at NOT_STARTED with an empty message. Returns the generated
/// id.
pub fn create(conn: &mut Connection, task: &Task, spec: &dyn Specialization) -> Result<String> {
    let tx = conn.transaction()?;
    let id = Uuid::new_v4().to_string();
    let now = now_ts();

    tasks::insert(
        &tx,
        &tasks::TaskRow {
            id: id.clone(),
            owner: task.owner.clone(),
            name: task.name.clone(),
            description: task.description.clone(),
            visibility: task.visibility,
            state: task.state,
            store_kind: spec.store_kind().to_string(),
            created_at: now.clone(),
            updated_at: now,
        },
    )?;
    for backend in &task.backends {
        assignments::upsert(&tx, &id, backend)?;
    }
    tags::insert_all(&tx, &id, &task.tags)?;

    let mut created = task.clone();
    created.ids = vec![id.clone()];
    spec.after_create(&tx, &created)?;

    tx.commit()?;
    Ok(id)
}

/// Rewrite an existing task in one transaction.
///
/// Caller-supplied fields replace the stored ones; tag and assignment
/// sets are replaced wholesale, and replaced pairings start over at
/// NOT_STARTED. The creation timestamp and specialization marker are
/// untouched. Returns false when no task with this id exists.
pub fn update(conn: &mut Connection, id: &str, task: &Task, spec: &dyn Specialization) -> Result<bool> {
    let tx = conn.transaction()?;

    let row = tasks::TaskRow {
        id: id.to_string(),
        owner: task.owner.clone(),
        name: task.name.clone(),
        description: task.description.clone(),
        visibility: task.visibility,
        state: task.state,
        // Not written by the UPDATE; both are immutable after create.
        store_kind: String::new(),
        created_at: String::new(),
        updated_at: now_ts(),
    };
    if !tasks::update(&tx, &row)? {
        return Ok(false);
    }

    tags::delete_for_task(&tx, id)?;
    tags::insert_all(&tx, id, &task.tags)?;
    assignments::delete_for_task(&tx, id)?;
    for backend in &task.backends {
        assignments::upsert(&tx, id, &TaskBackend::new(backend.backend_id.clone()))?;
    }

    let mut updated = task.clone();
    updated.ids = vec![id.to_string()];
    spec.after_update(&tx, &updated)?;

    tx.commit()?;
    Ok(true)
}

/// Load a task by id with its tags, without any worker gate and without
/// assignment detail. Used by flows that already hold authority over
/// the task, like dispatch.
pub fn load(conn: &Connection, task_id: &str) -> Result<Option<Task>> {
    let Some(row) = tasks::get(conn, task_id)? else {
        return Ok(None);
    };
    let tag_list = tags::for_task(conn, task_id)?;
    Ok(Some(task_from_row(row, tag_list, Vec::new())))
}

/// Worker-scoped read of one task.
///
/// Returns the task only when the given worker is actually assigned to
/// it; otherwise reports nothing, so a worker cannot probe for foreign
/// tasks. `Minimal` returns the base fields only; `AllDetails` also
/// attaches one page of the assignment list.
pub fn get(
    conn: &Connection,
    backend_id: &str,
    view: DataView,
    paging: Paging,
    task_id: &str,
) -> Result<Option<Task>> {
    if !assignments::exists(conn, task_id, backend_id)? {
        return Ok(None);
    }
    let Some(row) = tasks::get(conn, task_id)? else {
        return Ok(None);
    };
    let tag_list = tags::for_task(conn, task_id)?;
    let backends = match view {
        DataView::Minimal => Vec::new(),
        DataView::AllDetails => assignments::for_task_paged(conn, task_id, paging)?,
    };
    Ok(Some(task_from_row(row, tag_list, backends)))
}

/// List task summaries with their assignment lists attached.
///
/// Summaries only carry the persisted pairings, never registry-backed
/// worker detail.
pub fn list(conn: &Connection, filter: &TaskFilter, paging: Paging) -> Result<Vec<TaskSummary>> {
    let mut summaries = tasks::list(conn, filter, paging)?;
    for summary in &mut summaries {
        summary.backends = assignments::for_task(conn, &summary.id)?;
    }
    Ok(summaries)
}

/// Remove a task and everything hanging off it in one transaction.
///
/// The specialization drops its domain rows first, then tags,
/// assignments, and the task row itself go. Returns false when the
/// task does not exist.
pub fn remove(conn: &mut Connection, task_id: &str, spec: &dyn Specialization) -> Result<bool> {
    let tx = conn.transaction()?;
    spec.before_remove(&tx, task_id)?;
    tags::delete_for_task(&tx, task_id)?;
    assignments::delete_for_task(&tx, task_id)?;
    let existed = tasks::delete(&tx, task_id)?;
    tx.commit()?;
    Ok(existed)
}

/// The specialization marker for a task, used to route later calls
/// back to the concrete store that created it.
pub fn resolve_store_kind(conn: &Connection, task_id: &str) -> Result<Option<String>> {
    Ok(tasks::store_kind(conn, task_id)?)
}

/// Record a worker's status transition for one task.
///
/// The only write dispatch and completion intake perform. It runs as
/// an update, never an insert, so a true result proves the pairing was
/// already recorded; false signals a stale or invalid pairing that the
/// caller must surface. A true update also stamps the task's
/// `updated_at`.
pub fn status_updated(conn: &mut Connection, assignment: &TaskBackend, task_id: &str) -> Result<bool> {
    let tx = conn.transaction()?;
    let known = assignments::set_status(
        &tx,
        task_id,
        &assignment.backend_id,
        assignment.status,
        &assignment.message,
    )?;
    if !known {
        return Ok(false);
    }
    tasks::touch(&tx, task_id, &now_ts())?;
    tx.commit()?;
    Ok(true)
}

fn task_from_row(row: tasks::TaskRow, tags: Vec<String>, backends: Vec<TaskBackend>) -> Task {
    Task {
        ids: vec![row.id],
        owner: row.owner,
        name: row.name,
        description: row.description,
        visibility: row.visibility,
        state: row.state,
        tags,
        backends,
        store_kind: Some(row.store_kind),
        created_at: Some(row.created_at),
        updated_at: Some(row.updated_at),
        extension: serde_json::Value::Null,
    }
}
