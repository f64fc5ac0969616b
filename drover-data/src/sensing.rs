//! Sensing task store: persists acquisition conditions and expected
//! outputs for sensing work dispatched to probe workers.

use rusqlite::{params, Connection, Transaction};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{Result, StoreError};
use crate::extension::Specialization;
use crate::measurements;
use crate::types::Task;

pub const STORE_KIND: &str = "sensing";

/// One acquisition condition, e.g. `depth_cm <= 30`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub op: String,
    pub value: String,
}

/// Domain payload carried in a sensing task's `extension`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SensingExtension {
    #[serde(default)]
    pub conditions: Vec<Condition>,
    pub outputs: Vec<String>,
}

/// The concrete store for sensing tasks.
pub struct SensingStore;

impl SensingStore {
    fn parse(extension: &serde_json::Value) -> Result<SensingExtension> {
        serde_json::from_value(extension.clone())
            .map_err(|e| StoreError::InvalidExtension(format!("sensing payload: {e}")))
    }
}

impl Specialization for SensingStore {
    fn store_kind(&self) -> &'static str {
        STORE_KIND
    }

    fn validate(&self, extension: &serde_json::Value) -> Result<()> {
        let ext = Self::parse(extension)?;
        if ext.outputs.is_empty() {
            return Err(StoreError::InvalidExtension(
                "sensing task needs at least one expected output".to_string(),
            ));
        }
        if ext.outputs.iter().any(|name| name.trim().is_empty()) {
            return Err(StoreError::InvalidExtension(
                "output names must not be blank".to_string(),
            ));
        }
        for condition in &ext.conditions {
            if condition.field.trim().is_empty() || condition.op.trim().is_empty() {
                return Err(StoreError::InvalidExtension(
                    "conditions need a field and an operator".to_string(),
                ));
            }
        }
        Ok(())
    }

    fn after_create(&self, tx: &Transaction, task: &Task) -> Result<()> {
        let id = task.id().ok_or(StoreError::MissingTaskId)?;
        let ext = Self::parse(&task.extension)?;
        insert_rows(tx, id, &ext)
    }

    fn after_update(&self, tx: &Transaction, task: &Task) -> Result<()> {
        let id = task.id().ok_or(StoreError::MissingTaskId)?;
        let ext = Self::parse(&task.extension)?;
        delete_rows(tx, id)?;
        insert_rows(tx, id, &ext)
    }

    fn before_remove(&self, tx: &Transaction, task_id: &str) -> Result<()> {
        delete_rows(tx, task_id)?;
        measurements::delete_for_task(tx, task_id)?;
        Ok(())
    }

    fn payload(
        &self,
        conn: &Connection,
        task: &Task,
        response_shape: &str,
    ) -> Result<serde_json::Value> {
        let id = task.id().ok_or(StoreError::MissingTaskId)?;
        let ext = load_rows(conn, id)?;
        Ok(json!({
            "id": id,
            "name": task.name,
            "description": task.description,
            "state": task.state,
            "tags": task.tags,
            "conditions": ext.conditions,
            "outputs": ext.outputs,
            "format": response_shape,
        }))
    }
}

fn insert_rows(conn: &Connection, task_id: &str, ext: &SensingExtension) -> Result<()> {
    let mut condition = conn.prepare(
        "INSERT INTO sensing_conditions (task_id, field, op, value) VALUES (?1, ?2, ?3, ?4)",
    )?;
    for c in &ext.conditions {
        condition.execute(params![task_id, c.field, c.op, c.value])?;
    }
    let mut output =
        conn.prepare("INSERT INTO sensing_outputs (task_id, name) VALUES (?1, ?2)")?;
    for name in &ext.outputs {
        output.execute(params![task_id, name])?;
    }
    Ok(())
}

fn delete_rows(conn: &Connection, task_id: &str) -> Result<()> {
    conn.execute(
        "DELETE FROM sensing_conditions WHERE task_id = ?1",
        params![task_id],
    )?;
    conn.execute(
        "DELETE FROM sensing_outputs WHERE task_id = ?1",
        params![task_id],
    )?;
    Ok(())
}

/// Load the persisted domain rows for a task.
pub fn load_rows(conn: &Connection, task_id: &str) -> Result<SensingExtension> {
    let mut stmt = conn.prepare(
        "SELECT field, op, value FROM sensing_conditions WHERE task_id = ?1 ORDER BY id",
    )?;
    let conditions = stmt
        .query_map(params![task_id], |row| {
            Ok(Condition {
                field: row.get(0)?,
                op: row.get(1)?,
                value: row.get(2)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut stmt =
        conn.prepare("SELECT name FROM sensing_outputs WHERE task_id = ?1 ORDER BY id")?;
    let outputs = stmt
        .query_map(params![task_id], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(SensingExtension { conditions, outputs })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_db;
    use crate::measurements::ResultRecord;
    use crate::store;
    use crate::types::{TaskBackend, Visibility};

    fn make_sensing_task(extension: serde_json::Value) -> Task {
        Task {
            ids: Vec::new(),
            owner: "alice".to_string(),
            name: "soil survey".to_string(),
            description: String::new(),
            visibility: Visibility::Private,
            state: 0,
            tags: vec!["sensing".to_string()],
            backends: vec![TaskBackend::new("probe-1")],
            store_kind: None,
            created_at: None,
            updated_at: None,
            extension,
        }
    }

    fn soil_extension() -> serde_json::Value {
        json!({
            "conditions": [
                { "field": "depth_cm", "op": "<=", "value": "30" },
                { "field": "interval_mins", "op": "=", "value": "15" }
            ],
            "outputs": ["moisture", "temperature"]
        })
    }

    #[test]
    fn test_validate_requires_an_output() {
        let spec = SensingStore;
        assert!(spec.validate(&soil_extension()).is_ok());

        let err = spec.validate(&json!({ "outputs": [] })).unwrap_err();
        assert!(matches!(err, StoreError::InvalidExtension(_)));

        let err = spec.validate(&json!({})).unwrap_err();
        assert!(matches!(err, StoreError::InvalidExtension(_)));

        let err = spec
            .validate(&json!({
                "conditions": [{ "field": " ", "op": "=", "value": "1" }],
                "outputs": ["moisture"]
            }))
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidExtension(_)));
    }

    #[test]
    fn test_create_persists_domain_rows() {
        let mut conn = test_db();
        let id = store::create(&mut conn, &make_sensing_task(soil_extension()), &SensingStore)
            .unwrap();

        let rows = load_rows(&conn, &id).unwrap();
        assert_eq!(rows.conditions.len(), 2);
        assert_eq!(rows.conditions[0].field, "depth_cm");
        assert_eq!(rows.outputs, vec!["moisture".to_string(), "temperature".to_string()]);
    }

    #[test]
    fn test_update_replaces_domain_rows() {
        let mut conn = test_db();
        let id = store::create(&mut conn, &make_sensing_task(soil_extension()), &SensingStore)
            .unwrap();

        let changed = make_sensing_task(json!({ "outputs": ["salinity"] }));
        assert!(store::update(&mut conn, &id, &changed, &SensingStore).unwrap());

        let rows = load_rows(&conn, &id).unwrap();
        assert!(rows.conditions.is_empty());
        assert_eq!(rows.outputs, vec!["salinity".to_string()]);
    }

    #[test]
    fn test_remove_drops_domain_rows_and_measurements() {
        let mut conn = test_db();
        let id = store::create(&mut conn, &make_sensing_task(soil_extension()), &SensingStore)
            .unwrap();
        measurements::insert_all(
            &mut conn,
            std::slice::from_ref(&id),
            &[ResultRecord {
                backend_id: "probe-1".to_string(),
                payload: json!({ "moisture": 0.31 }),
                file_id: None,
            }],
        )
        .unwrap();

        assert!(store::remove(&mut conn, &id, &SensingStore).unwrap());

        let rows = load_rows(&conn, &id).unwrap();
        assert!(rows.conditions.is_empty());
        assert!(rows.outputs.is_empty());
        assert!(measurements::for_task(&conn, &id).unwrap().is_empty());
    }

    #[test]
    fn test_payload_is_scoped_to_response_shape() {
        let mut conn = test_db();
        let id = store::create(&mut conn, &make_sensing_task(soil_extension()), &SensingStore)
            .unwrap();
        let task = store::load(&conn, &id).unwrap().unwrap();

        let body = SensingStore.payload(&conn, &task, "compact-json").unwrap();

        assert_eq!(body["id"], json!(id));
        assert_eq!(body["name"], json!("soil survey"));
        assert_eq!(body["format"], json!("compact-json"));
        assert_eq!(body["outputs"], json!(["moisture", "temperature"]));
        assert_eq!(body["conditions"][0]["field"], json!("depth_cm"));
    }
}
