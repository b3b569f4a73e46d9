//! Store schema and connection setup.

use rusqlite::Connection;
use std::time::Duration;

use crate::constants::STORE_BUSY_TIMEOUT_MS;

/// Bumped whenever the DDL below changes shape.
pub const SCHEMA_VERSION: i32 = 1;

const SCHEMA_V1: &str = "
CREATE TABLE IF NOT EXISTS collection_runs (
    id              TEXT PRIMARY KEY NOT NULL,
    started_at      TEXT NOT NULL,
    finished_at     TEXT,
    status          TEXT NOT NULL,
    hostname        TEXT NOT NULL,
    username        TEXT NOT NULL,
    total_records   INTEGER NOT NULL DEFAULT 0,
    inserted        INTEGER NOT NULL DEFAULT 0,
    unchanged       INTEGER NOT NULL DEFAULT 0,
    versioned       INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS collector_outcomes (
    run_id          TEXT NOT NULL REFERENCES collection_runs(id),
    position        INTEGER NOT NULL,
    collector       TEXT NOT NULL,
    status          TEXT NOT NULL,
    detail          TEXT,
    records         INTEGER NOT NULL,
    inserted        INTEGER NOT NULL,
    unchanged       INTEGER NOT NULL,
    versioned       INTEGER NOT NULL,
    skips           TEXT NOT NULL,
    size_skipped    TEXT NOT NULL,
    duration_ms     INTEGER NOT NULL,
    PRIMARY KEY (run_id, collector)
);

CREATE TABLE IF NOT EXISTS artifacts (
    seq                 INTEGER PRIMARY KEY AUTOINCREMENT,
    id                  TEXT NOT NULL UNIQUE,
    source              TEXT NOT NULL,
    artifact_type       TEXT NOT NULL,
    timestamp           TEXT,
    sort_time           TEXT NOT NULL,
    title               TEXT,
    content_preview     TEXT NOT NULL,
    file_path           TEXT NOT NULL,
    file_hash           TEXT,
    file_size           INTEGER,
    file_modified       TEXT,
    fingerprint         TEXT NOT NULL,
    record_key          TEXT,
    version             INTEGER NOT NULL DEFAULT 1,
    credential_detected INTEGER NOT NULL DEFAULT 0,
    metadata            TEXT NOT NULL,
    first_seen_run      TEXT NOT NULL REFERENCES collection_runs(id),
    first_collected_at  TEXT NOT NULL,
    collected_at        TEXT NOT NULL,
    run_id              TEXT NOT NULL REFERENCES collection_runs(id),
    UNIQUE (source, file_path, fingerprint)
);

CREATE INDEX IF NOT EXISTS idx_artifacts_source ON artifacts(source);
CREATE INDEX IF NOT EXISTS idx_artifacts_type ON artifacts(artifact_type);
CREATE INDEX IF NOT EXISTS idx_artifacts_sort ON artifacts(sort_time, seq);
CREATE INDEX IF NOT EXISTS idx_artifacts_timestamp ON artifacts(timestamp);
CREATE INDEX IF NOT EXISTS idx_artifacts_record_key ON artifacts(source, file_path, record_key);
";

/// WAL journaling lets readers proceed while a run writes.
pub fn configure_pragmas(conn: &Connection) -> rusqlite::Result<()> {
    // In-memory databases answer "memory"; that is fine for tests.
    conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
    conn.execute_batch(
        "PRAGMA synchronous = NORMAL;
         PRAGMA temp_store = MEMORY;
         PRAGMA foreign_keys = ON;",
    )?;
    conn.busy_timeout(Duration::from_millis(STORE_BUSY_TIMEOUT_MS))
}

/// Create missing tables and stamp `user_version`. Returns the version.
pub fn migrate(conn: &Connection) -> rusqlite::Result<i32> {
    let current: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if current < SCHEMA_VERSION {
        conn.execute_batch(SCHEMA_V1)?;
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    }
    Ok(SCHEMA_VERSION.max(current))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrate_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(migrate(&conn).unwrap(), SCHEMA_VERSION);
        assert_eq!(migrate(&conn).unwrap(), SCHEMA_VERSION);

        let tables: i64 = conn
            .query_row(
                "SELECT count(*) FROM sqlite_master WHERE type = 'table' \
                 AND name IN ('artifacts', 'collection_runs', 'collector_outcomes')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 3);
    }
}
