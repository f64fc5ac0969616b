use rusqlite::{params, Connection};

use crate::db::OptionalExt;
use crate::types::now_ts;

/// Record that a worker registered a bulk upload under `file_id`.
/// First registration wins; returns false when the id is already taken.
pub fn register(conn: &Connection, file_id: &str, backend_id: &str) -> rusqlite::Result<bool> {
    let changed = conn.execute(
        "INSERT OR IGNORE INTO uploads (file_id, backend_id, registered_at) VALUES (?1, ?2, ?3)",
        params![file_id, backend_id, now_ts()],
    )?;
    Ok(changed > 0)
}

/// The worker that registered this upload, if any.
pub fn owner(conn: &Connection, file_id: &str) -> rusqlite::Result<Option<String>> {
    conn.query_row(
        "SELECT backend_id FROM uploads WHERE file_id = ?1",
        params![file_id],
        |row| row.get(0),
    )
    .optional()
}

/// Whether `backend_id` is the worker that registered this upload.
/// Unregistered ids belong to nobody.
pub fn is_owner(conn: &Connection, file_id: &str, backend_id: &str) -> rusqlite::Result<bool> {
    Ok(owner(conn, file_id)?.as_deref() == Some(backend_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_db;

    #[test]
    fn test_register_and_owner() {
        let conn = test_db();

        assert!(register(&conn, "file-1", "probe-1").unwrap());
        assert_eq!(owner(&conn, "file-1").unwrap().as_deref(), Some("probe-1"));
        assert!(owner(&conn, "file-2").unwrap().is_none());
    }

    #[test]
    fn test_first_registration_wins() {
        let conn = test_db();
        assert!(register(&conn, "file-1", "probe-1").unwrap());

        // A second worker cannot take over the same file id
        assert!(!register(&conn, "file-1", "probe-2").unwrap());
        assert_eq!(owner(&conn, "file-1").unwrap().as_deref(), Some("probe-1"));
    }

    #[test]
    fn test_is_owner() {
        let conn = test_db();
        register(&conn, "file-1", "probe-1").unwrap();

        assert!(is_owner(&conn, "file-1", "probe-1").unwrap());
        assert!(!is_owner(&conn, "file-1", "probe-2").unwrap());
        assert!(!is_owner(&conn, "ghost", "probe-1").unwrap());
    }
}
