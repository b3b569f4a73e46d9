//! Evidence store: run lifecycle and idempotent artifact upserts.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::debug;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use uuid::Uuid;

use crate::error::{StorageError, StorageResult};
use crate::models::{Artifact, CollectionRun, RunStatus, UpsertStats};
use crate::normalize::to_canonical;
use crate::storage::schema::{configure_pragmas, migrate};

/// Handle on the single store file. One writer per process.
pub struct Store {
    conn: Connection,
    path: Option<PathBuf>,
    schema_version: i32,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("path", &self.path)
            .field("schema_version", &self.schema_version)
            .finish()
    }
}

impl Store {
    /// Open (creating if needed) the store at `path`. The parent directory
    /// is created owner-only on Unix.
    pub fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            create_private_dir(parent)?;
        }

        let conn = Connection::open(path)?;
        let store = Self::from_connection(conn, Some(path.to_path_buf()))?;
        debug!("Opened store {} (schema v{})", path.display(), store.schema_version);
        Ok(store)
    }

    /// Throwaway store for tests and dry experiments.
    pub fn open_in_memory() -> StorageResult<Self> {
        Self::from_connection(Connection::open_in_memory()?, None)
    }

    fn from_connection(conn: Connection, path: Option<PathBuf>) -> StorageResult<Self> {
        configure_pragmas(&conn)?;
        let schema_version = migrate(&conn)?;
        Ok(Self {
            conn,
            path,
            schema_version,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn schema_version(&self) -> i32 {
        self.schema_version
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Open a run in `running` state.
    pub fn begin_run(&self, hostname: &str, username: &str) -> StorageResult<CollectionRun> {
        let run = CollectionRun {
            id: Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            finished_at: None,
            status: RunStatus::Running,
            hostname: hostname.to_string(),
            username: username.to_string(),
            outcomes: Vec::new(),
            totals: UpsertStats::default(),
        };

        self.conn.execute(
            "INSERT INTO collection_runs (id, started_at, status, hostname, username)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                run.id,
                to_canonical(&run.started_at),
                run.status.as_str(),
                run.hostname,
                run.username
            ],
        )?;
        debug!("Began run {}", run.id);
        Ok(run)
    }

    /// Write one collector's batch in a single transaction.
    ///
    /// A natural key `(source, file_path, fingerprint)` already present is
    /// refreshed in place: `collected_at`, `run_id`, metadata and file facts
    /// are updated, identity columns are left alone. A new fingerprint for a
    /// `record_key` seen before is stored as the next version.
    pub fn upsert_artifacts(&mut self, run_id: &str, artifacts: &[Artifact]) -> StorageResult<UpsertStats> {
        let tx = self.conn.transaction()?;
        let mut stats = UpsertStats::default();

        for artifact in artifacts {
            match upsert_one(&tx, run_id, artifact)? {
                UpsertKind::Inserted => stats.inserted += 1,
                UpsertKind::Versioned => stats.versioned += 1,
                UpsertKind::Unchanged => stats.unchanged += 1,
            }
        }

        tx.commit()?;
        Ok(stats)
    }

    /// Finalize a run: status, totals and the per-collector outcome list.
    pub fn finish_run(&mut self, run: &CollectionRun) -> StorageResult<()> {
        let tx = self.conn.transaction()?;
        let finished_at = run.finished_at.unwrap_or_else(Utc::now);

        let updated = tx.execute(
            "UPDATE collection_runs
             SET finished_at = ?2, status = ?3, total_records = ?4,
                 inserted = ?5, unchanged = ?6, versioned = ?7
             WHERE id = ?1",
            params![
                run.id,
                to_canonical(&finished_at),
                run.status.as_str(),
                run.total_records() as i64,
                run.totals.inserted as i64,
                run.totals.unchanged as i64,
                run.totals.versioned as i64,
            ],
        )?;
        if updated == 0 {
            return Err(StorageError::UnknownRun(run.id.clone()));
        }

        tx.execute("DELETE FROM collector_outcomes WHERE run_id = ?1", [&run.id])?;
        for (position, outcome) in run.outcomes.iter().enumerate() {
            tx.execute(
                "INSERT INTO collector_outcomes (
                    run_id, position, collector, status, detail, records,
                    inserted, unchanged, versioned, skips, size_skipped, duration_ms
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    run.id,
                    position as i64,
                    outcome.collector,
                    outcome.status.as_str(),
                    outcome.detail,
                    outcome.records as i64,
                    outcome.stats.inserted as i64,
                    outcome.stats.unchanged as i64,
                    outcome.stats.versioned as i64,
                    serde_json::to_string(&outcome.skips)?,
                    serde_json::to_string(&outcome.size_skipped)?,
                    outcome.duration_ms as i64,
                ],
            )?;
        }

        tx.commit()?;
        debug!("Finished run {} as {}", run.id, run.status);
        Ok(())
    }
}

enum UpsertKind {
    Inserted,
    Versioned,
    Unchanged,
}

fn upsert_one(tx: &Transaction<'_>, run_id: &str, artifact: &Artifact) -> StorageResult<UpsertKind> {
    let metadata = serde_json::to_string(&artifact.metadata)?;
    let collected_at = to_canonical(&artifact.collected_at);
    let file_modified = artifact.file_modified.as_ref().map(to_canonical);
    let file_size = artifact.file_size.map(|s| s as i64);

    let existing: Option<i64> = tx
        .prepare_cached(
            "SELECT seq FROM artifacts WHERE source = ?1 AND file_path = ?2 AND fingerprint = ?3",
        )?
        .query_row(params![artifact.source, artifact.file_path, artifact.fingerprint], |row| {
            row.get(0)
        })
        .optional()?;

    if let Some(seq) = existing {
        tx.prepare_cached(
            "UPDATE artifacts
             SET collected_at = ?2, run_id = ?3, metadata = ?4,
                 file_hash = ?5, file_size = ?6, file_modified = ?7
             WHERE seq = ?1",
        )?
        .execute(params![
            seq,
            collected_at,
            run_id,
            metadata,
            artifact.file_hash,
            file_size,
            file_modified
        ])?;
        return Ok(UpsertKind::Unchanged);
    }

    let previous: Option<i64> = match &artifact.record_key {
        Some(key) => tx
            .prepare_cached(
                "SELECT MAX(version) FROM artifacts
                 WHERE source = ?1 AND file_path = ?2 AND record_key = ?3",
            )?
            .query_row(params![artifact.source, artifact.file_path, key], |row| row.get(0))?,
        None => None,
    };
    let version = previous.map(|v| v + 1).unwrap_or(1);
    let timestamp = artifact.timestamp.as_ref().map(to_canonical);
    let sort_time = timestamp.clone().unwrap_or_else(|| collected_at.clone());

    tx.prepare_cached(
        "INSERT INTO artifacts (
            id, source, artifact_type, timestamp, sort_time, title, content_preview,
            file_path, file_hash, file_size, file_modified, fingerprint, record_key,
            version, credential_detected, metadata, first_seen_run, first_collected_at,
            collected_at, run_id
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?18, ?17)",
    )?
    .execute(params![
        artifact.id,
        artifact.source,
        artifact.artifact_type.as_str(),
        timestamp,
        sort_time,
        artifact.title,
        artifact.content_preview,
        artifact.file_path,
        artifact.file_hash,
        file_size,
        file_modified,
        artifact.fingerprint,
        artifact.record_key,
        version,
        artifact.credential_detected,
        metadata,
        run_id,
        collected_at,
    ])?;

    Ok(if previous.is_some() {
        UpsertKind::Versioned
    } else {
        UpsertKind::Inserted
    })
}

#[cfg(unix)]
fn create_private_dir(dir: &Path) -> StorageResult<()> {
    use std::os::unix::fs::{DirBuilderExt, PermissionsExt};

    use crate::constants::STORE_DIR_MODE;

    let io_err = |source| StorageError::Io {
        path: dir.to_path_buf(),
        source,
    };
    if !dir.exists() {
        fs::DirBuilder::new()
            .recursive(true)
            .mode(STORE_DIR_MODE)
            .create(dir)
            .map_err(io_err)?;
        fs::set_permissions(dir, fs::Permissions::from_mode(STORE_DIR_MODE)).map_err(io_err)?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn create_private_dir(dir: &Path) -> StorageResult<()> {
    fs::create_dir_all(dir).map_err(|source| StorageError::Io {
        path: dir.to_path_buf(),
        source,
    })
}

/// Parse a canonical timestamp column.
pub(crate) fn parse_time(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.with_timezone(&Utc))
}
