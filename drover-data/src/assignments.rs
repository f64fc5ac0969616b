use rusqlite::{params, Connection};

use crate::types::{AssignmentStatus, Paging, TaskBackend};

/// Insert or refresh a task-to-worker pairing.
///
/// `(task_id, backend_id)` is unique; re-assigning an existing pairing
/// overwrites its tracked status and message.
pub fn upsert(conn: &Connection, task_id: &str, backend: &TaskBackend) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO task_backends (task_id, backend_id, status, message) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(task_id, backend_id) DO UPDATE SET status = excluded.status, message = excluded.message",
        params![task_id, backend.backend_id, backend.status, backend.message],
    )?;
    Ok(())
}

/// All pairings recorded for a task, in assignment order.
pub fn for_task(conn: &Connection, task_id: &str) -> rusqlite::Result<Vec<TaskBackend>> {
    let mut stmt = conn.prepare(
        "SELECT backend_id, status, message FROM task_backends WHERE task_id = ?1 ORDER BY id",
    )?;
    let rows = stmt.query_map(params![task_id], row_to_backend)?;
    rows.collect()
}

/// One page of the pairings recorded for a task, in assignment order.
pub fn for_task_paged(
    conn: &Connection,
    task_id: &str,
    paging: Paging,
) -> rusqlite::Result<Vec<TaskBackend>> {
    let mut stmt = conn.prepare(
        "SELECT backend_id, status, message FROM task_backends
         WHERE task_id = ?1 ORDER BY id LIMIT ?2 OFFSET ?3",
    )?;
    let rows = stmt.query_map(params![task_id, paging.limit, paging.offset], row_to_backend)?;
    rows.collect()
}

/// Whether a pairing between this task and worker is recorded.
pub fn exists(conn: &Connection, task_id: &str, backend_id: &str) -> rusqlite::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM task_backends WHERE task_id = ?1 AND backend_id = ?2",
        params![task_id, backend_id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Store a new status and message on an existing pairing.
///
/// Returns false when the pairing is not recorded. Writing the same
/// status again still counts as a change, so retries stay truthful.
pub fn set_status(
    conn: &Connection,
    task_id: &str,
    backend_id: &str,
    status: AssignmentStatus,
    message: &str,
) -> rusqlite::Result<bool> {
    let changed = conn.execute(
        "UPDATE task_backends SET status = ?1, message = ?2 WHERE task_id = ?3 AND backend_id = ?4",
        params![status, message, task_id, backend_id],
    )?;
    Ok(changed > 0)
}

/// Remove every pairing of a task. Returns the number removed.
pub fn delete_for_task(conn: &Connection, task_id: &str) -> rusqlite::Result<usize> {
    conn.execute("DELETE FROM task_backends WHERE task_id = ?1", params![task_id])
}

/// Remove every pairing that references a worker, across all tasks.
/// Returns the number removed.
pub fn delete_for_backend(conn: &Connection, backend_id: &str) -> rusqlite::Result<usize> {
    conn.execute(
        "DELETE FROM task_backends WHERE backend_id = ?1",
        params![backend_id],
    )
}

fn row_to_backend(row: &rusqlite::Row) -> rusqlite::Result<TaskBackend> {
    Ok(TaskBackend {
        backend_id: row.get(0)?,
        status: row.get(1)?,
        message: row.get(2)?,
    })
}
