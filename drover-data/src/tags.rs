use rusqlite::{params, Connection};

/// Record the task's type tags. Duplicates in the input collapse to one row.
pub fn insert_all(conn: &Connection, task_id: &str, tags: &[String]) -> rusqlite::Result<()> {
    let mut stmt =
        conn.prepare("INSERT OR IGNORE INTO task_tags (task_id, tag) VALUES (?1, ?2)")?;
    for tag in tags {
        stmt.execute(params![task_id, tag])?;
    }
    Ok(())
}

/// Tags recorded for a task, in insertion order.
pub fn for_task(conn: &Connection, task_id: &str) -> rusqlite::Result<Vec<String>> {
    let mut stmt =
        conn.prepare("SELECT tag FROM task_tags WHERE task_id = ?1 ORDER BY id")?;
    let rows = stmt.query_map(params![task_id], |row| row.get(0))?;
    rows.collect()
}

/// Whether the task carries the given tag.
pub fn has_tag(conn: &Connection, task_id: &str, tag: &str) -> rusqlite::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM task_tags WHERE task_id = ?1 AND tag = ?2",
        params![task_id, tag],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Remove every tag row of a task. Returns the number removed.
pub fn delete_for_task(conn: &Connection, task_id: &str) -> rusqlite::Result<usize> {
    conn.execute("DELETE FROM task_tags WHERE task_id = ?1", params![task_id])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_db;
    use crate::tasks;
    use crate::types::Visibility;

    fn seed_task(conn: &Connection, id: &str) {
        tasks::insert(
            conn,
            &tasks::TaskRow {
                id: id.to_string(),
                owner: "alice".to_string(),
                name: "survey".to_string(),
                description: String::new(),
                visibility: Visibility::Private,
                state: 0,
                store_kind: "sensing".to_string(),
                created_at: "2026-03-01T08:00:00.000Z".to_string(),
                updated_at: "2026-03-01T08:00:00.000Z".to_string(),
            },
        )
        .unwrap();
    }

    #[test]
    fn test_insert_all_collapses_duplicates() {
        let conn = test_db();
        seed_task(&conn, "t-1");

        insert_all(
            &conn,
            "t-1",
            &["sensing".to_string(), "field".to_string(), "sensing".to_string()],
        )
        .unwrap();

        let tags = for_task(&conn, "t-1").unwrap();
        assert_eq!(tags, vec!["sensing".to_string(), "field".to_string()]);
    }

    #[test]
    fn test_has_tag() {
        let conn = test_db();
        seed_task(&conn, "t-1");
        insert_all(&conn, "t-1", &["virtual".to_string()]).unwrap();

        assert!(has_tag(&conn, "t-1", "virtual").unwrap());
        assert!(!has_tag(&conn, "t-1", "sensing").unwrap());
    }

    #[test]
    fn test_delete_for_task() {
        let conn = test_db();
        seed_task(&conn, "t-1");
        insert_all(&conn, "t-1", &["a".to_string(), "b".to_string()]).unwrap();

        assert_eq!(delete_for_task(&conn, "t-1").unwrap(), 2);
        assert!(for_task(&conn, "t-1").unwrap().is_empty());
    }
}
