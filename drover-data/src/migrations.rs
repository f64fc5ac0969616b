use rusqlite::Connection;

/// Run all pending migrations on the database.
///
/// Uses `PRAGMA user_version` to track which migrations have been applied.
pub fn migrate(conn: &Connection) -> rusqlite::Result<()> {
    let version: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    if version < 1 {
        migrate_v0_to_v1(conn)?;
    }

    if version < 2 {
        migrate_v1_to_v2(conn)?;
    }

    Ok(())
}

fn migrate_v0_to_v1(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE tasks (
            id          TEXT PRIMARY KEY,
            owner       TEXT NOT NULL,
            name        TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            visibility  TEXT NOT NULL,
            state       INTEGER NOT NULL DEFAULT 0,
            store_kind  TEXT NOT NULL,
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        );

        CREATE TABLE task_backends (
            id          INTEGER PRIMARY KEY,
            task_id     TEXT NOT NULL REFERENCES tasks,
            backend_id  TEXT NOT NULL,
            status      TEXT NOT NULL,
            message     TEXT NOT NULL DEFAULT '',
            UNIQUE(task_id, backend_id)
        );

        CREATE TABLE task_tags (
            id          INTEGER PRIMARY KEY,
            task_id     TEXT NOT NULL REFERENCES tasks,
            tag         TEXT NOT NULL,
            UNIQUE(task_id, tag)
        );

        CREATE INDEX idx_tasks_owner ON tasks(owner);
        CREATE INDEX idx_task_backends_task ON task_backends(task_id);
        CREATE INDEX idx_task_backends_backend ON task_backends(backend_id);
        CREATE INDEX idx_task_tags_task ON task_tags(task_id);

        PRAGMA user_version = 1;
        ",
    )?;
    Ok(())
}

fn migrate_v1_to_v2(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE sensing_conditions (
            id          INTEGER PRIMARY KEY,
            task_id     TEXT NOT NULL REFERENCES tasks,
            field       TEXT NOT NULL,
            op          TEXT NOT NULL,
            value       TEXT NOT NULL
        );

        CREATE TABLE sensing_outputs (
            id          INTEGER PRIMARY KEY,
            task_id     TEXT NOT NULL REFERENCES tasks,
            name        TEXT NOT NULL
        );

        CREATE TABLE measurements (
            id          INTEGER PRIMARY KEY,
            task_id     TEXT NOT NULL,
            backend_id  TEXT NOT NULL,
            payload     TEXT NOT NULL,
            file_id     TEXT,
            recorded_at TEXT NOT NULL
        );

        CREATE TABLE uploads (
            file_id       TEXT PRIMARY KEY,
            backend_id    TEXT NOT NULL,
            registered_at TEXT NOT NULL
        );

        CREATE INDEX idx_sensing_conditions_task ON sensing_conditions(task_id);
        CREATE INDEX idx_sensing_outputs_task ON sensing_outputs(task_id);
        CREATE INDEX idx_measurements_task ON measurements(task_id);

        PRAGMA user_version = 2;
        ",
    )?;
    Ok(())
}
