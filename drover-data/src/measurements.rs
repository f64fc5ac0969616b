use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use crate::types::now_ts;

/// One result record reported by a worker. `payload` is the measurement
/// body; `file_id` optionally points at a registered bulk upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub backend_id: String,
    pub payload: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
}

/// A stored measurement row.
#[derive(Debug, Clone, Serialize)]
pub struct Measurement {
    pub id: i64,
    pub task_id: String,
    pub backend_id: String,
    pub payload: serde_json::Value,
    pub file_id: Option<String>,
    pub recorded_at: String,
}

/// Store accepted result records against every referenced task, in one
/// transaction. Returns the number of rows written.
pub fn insert_all(
    conn: &mut Connection,
    task_ids: &[String],
    records: &[ResultRecord],
) -> rusqlite::Result<usize> {
    let tx = conn.transaction()?;
    let now = now_ts();
    let mut written = 0;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO measurements (task_id, backend_id, payload, file_id, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        for task_id in task_ids {
            for record in records {
                stmt.execute(params![
                    task_id,
                    record.backend_id,
                    record.payload.to_string(),
                    record.file_id,
                    now,
                ])?;
                written += 1;
            }
        }
    }
    tx.commit()?;
    Ok(written)
}

/// Measurements stored for a task, oldest first.
pub fn for_task(conn: &Connection, task_id: &str) -> rusqlite::Result<Vec<Measurement>> {
    let mut stmt = conn.prepare(
        "SELECT id, task_id, backend_id, payload, file_id, recorded_at
         FROM measurements WHERE task_id = ?1 ORDER BY id",
    )?;
    let rows = stmt.query_map(params![task_id], |row| {
        let raw: String = row.get(3)?;
        let payload = serde_json::from_str(&raw).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
        })?;
        Ok(Measurement {
            id: row.get(0)?,
            task_id: row.get(1)?,
            backend_id: row.get(2)?,
            payload,
            file_id: row.get(4)?,
            recorded_at: row.get(5)?,
        })
    })?;
    rows.collect()
}

/// Remove all measurements of a task. Returns the number removed.
pub fn delete_for_task(conn: &Connection, task_id: &str) -> rusqlite::Result<usize> {
    conn.execute("DELETE FROM measurements WHERE task_id = ?1", params![task_id])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_db;
    use serde_json::json;

    #[test]
    fn test_insert_all_crosses_tasks_and_records() {
        let mut conn = test_db();
        let task_ids = vec!["t-1".to_string(), "t-2".to_string()];
        let records = vec![
            ResultRecord {
                backend_id: "probe-1".to_string(),
                payload: json!({ "moisture": 0.31 }),
                file_id: None,
            },
            ResultRecord {
                backend_id: "probe-2".to_string(),
                payload: json!({ "moisture": 0.28 }),
                file_id: Some("file-9".to_string()),
            },
        ];

        let written = insert_all(&mut conn, &task_ids, &records).unwrap();
        assert_eq!(written, 4);

        let stored = for_task(&conn, "t-1").unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].backend_id, "probe-1");
        assert_eq!(stored[0].payload, json!({ "moisture": 0.31 }));
        assert_eq!(stored[1].file_id.as_deref(), Some("file-9"));
        assert!(!stored[0].recorded_at.is_empty());
    }

    #[test]
    fn test_delete_for_task() {
        let mut conn = test_db();
        insert_all(
            &mut conn,
            &["t-1".to_string()],
            &[ResultRecord {
                backend_id: "probe-1".to_string(),
                payload: json!(1),
                file_id: None,
            }],
        )
        .unwrap();

        assert_eq!(delete_for_task(&conn, "t-1").unwrap(), 1);
        assert!(for_task(&conn, "t-1").unwrap().is_empty());
    }
}
