use chrono::SecondsFormat;
use rusqlite::{params, Connection};

use crate::db::OptionalExt;
use crate::types::{Paging, TaskFilter, TaskSummary, Visibility};

/// Row shape of the `tasks` table. Assignments and type tags live in
/// their own tables.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskRow {
    pub id: String,
    pub owner: String,
    pub name: String,
    pub description: String,
    pub visibility: Visibility,
    pub state: i64,
    pub store_kind: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Insert a new task row.
pub fn insert(conn: &Connection, task: &TaskRow) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO tasks (id, owner, name, description, visibility, state, store_kind, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            task.id,
            task.owner,
            task.name,
            task.description,
            task.visibility,
            task.state,
            task.store_kind,
            task.created_at,
            task.updated_at,
        ],
    )?;
    Ok(())
}

/// Replace the caller-supplied fields of a task row, stamping `updated_at`.
///
/// The specialization marker and `created_at` are immutable once written.
/// Returns false when no row with this id exists.
pub fn update(conn: &Connection, task: &TaskRow) -> rusqlite::Result<bool> {
    let changed = conn.execute(
        "UPDATE tasks SET owner = ?1, name = ?2, description = ?3, visibility = ?4, state = ?5, updated_at = ?6
         WHERE id = ?7",
        params![
            task.owner,
            task.name,
            task.description,
            task.visibility,
            task.state,
            task.updated_at,
            task.id,
        ],
    )?;
    Ok(changed > 0)
}

/// Fetch one task row by id.
pub fn get(conn: &Connection, id: &str) -> rusqlite::Result<Option<TaskRow>> {
    conn.query_row(
        "SELECT id, owner, name, description, visibility, state, store_kind, created_at, updated_at
         FROM tasks WHERE id = ?1",
        params![id],
        row_to_task,
    )
    .optional()
}

/// Owner and visibility of a task, if it exists.
pub fn owner_and_visibility(conn: &Connection, id: &str) -> rusqlite::Result<Option<(String, Visibility)>> {
    conn.query_row(
        "SELECT owner, visibility FROM tasks WHERE id = ?1",
        params![id],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )
    .optional()
}

/// The specialization marker recorded when the task was created.
pub fn store_kind(conn: &Connection, id: &str) -> rusqlite::Result<Option<String>> {
    conn.query_row(
        "SELECT store_kind FROM tasks WHERE id = ?1",
        params![id],
        |row| row.get(0),
    )
    .optional()
}

/// Ids of every task owned by the given user, oldest first.
pub fn ids_owned_by(conn: &Connection, owner: &str) -> rusqlite::Result<Vec<String>> {
    let mut stmt =
        conn.prepare("SELECT id FROM tasks WHERE owner = ?1 ORDER BY created_at")?;
    let rows = stmt.query_map(params![owner], |row| row.get(0))?;
    rows.collect()
}

/// Stamp `updated_at` on a task. Returns false when the task does not exist.
pub fn touch(conn: &Connection, id: &str, ts: &str) -> rusqlite::Result<bool> {
    let changed = conn.execute(
        "UPDATE tasks SET updated_at = ?1 WHERE id = ?2",
        params![ts, id],
    )?;
    Ok(changed > 0)
}

/// Delete a task row. Returns false when nothing was deleted.
pub fn delete(conn: &Connection, id: &str) -> rusqlite::Result<bool> {
    let changed = conn.execute("DELETE FROM tasks WHERE id = ?1", params![id])?;
    Ok(changed > 0)
}

/// List task summaries matching the filter, newest first.
///
/// Assignment sub-lists are not populated here; callers that want them
/// attach them in a second pass.
pub fn list(conn: &Connection, filter: &TaskFilter, paging: Paging) -> rusqlite::Result<Vec<TaskSummary>> {
    let mut sql = String::from(
        "SELECT id, owner, name, description, created_at, updated_at FROM tasks",
    );
    let mut clauses: Vec<&str> = Vec::new();
    let mut args: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

    if let Some(backend_id) = &filter.backend_id {
        clauses.push("id IN (SELECT task_id FROM task_backends WHERE backend_id = ?)");
        args.push(Box::new(backend_id.clone()));
    }
    if let Some(owner) = &filter.owner {
        clauses.push("owner = ?");
        args.push(Box::new(owner.clone()));
    }
    if let Some(state) = filter.state {
        clauses.push("state = ?");
        args.push(Box::new(state));
    }
    if let Some(since) = &filter.created_since {
        clauses.push("created_at >= ?");
        args.push(Box::new(since.to_rfc3339_opts(SecondsFormat::Millis, true)));
    }

    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(" ORDER BY created_at DESC LIMIT ? OFFSET ?");
    args.push(Box::new(paging.limit));
    args.push(Box::new(paging.offset));

    let param_refs: Vec<&dyn rusqlite::types::ToSql> = args.iter().map(AsRef::as_ref).collect();
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(param_refs.as_slice(), |row| {
        Ok(TaskSummary {
            id: row.get(0)?,
            owner: row.get(1)?,
            name: row.get(2)?,
            description: row.get(3)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
            backends: Vec::new(),
        })
    })?;
    rows.collect()
}

fn row_to_task(row: &rusqlite::Row) -> rusqlite::Result<TaskRow> {
    Ok(TaskRow {
        id: row.get(0)?,
        owner: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        visibility: row.get(4)?,
        state: row.get(5)?,
        store_kind: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}
