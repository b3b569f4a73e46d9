//! Read-only access to embedded SQLite databases owned by other applications.
//!
//! Databases are opened through a `mode=ro&immutable=1` URI. A plain
//! read-only open of a WAL database still creates `-wal` and `-shm` files
//! beside it; an immutable open takes no locks and creates nothing. Pages
//! still sitting in a live application's `-wal` file are not visible.

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use log::debug;
use rusqlite::{Connection, ErrorCode, OpenFlags, Row, ToSql};

use crate::adapters::files::file_facts;
use crate::adapters::ReadPolicy;
use crate::constants::DB_LOCK_RETRY_DELAY_MS;
use crate::error::SourceError;
use crate::models::FileFacts;
use crate::security::inspect_candidate;
use crate::utils::hash::calculate_sha256;

/// Rows returned by [`SourceDb::query`]. Rows that failed to map are counted.
#[derive(Debug, Clone)]
pub struct QueryRows<T> {
    pub rows: Vec<T>,
    pub malformed: usize,
}

/// A source database opened read-only.
pub struct SourceDb {
    conn: Connection,
    path: PathBuf,
    retries: u32,
    facts: FileFacts,
}

impl std::fmt::Debug for SourceDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceDb").field("path", &self.path).finish()
    }
}

impl SourceDb {
    /// Open `path` read-only with a busy timeout.
    pub fn open(path: &Path, policy: &ReadPolicy) -> Result<Self, SourceError> {
        let metadata = inspect_candidate(path, &policy.credentials, policy.max_file_bytes())?;

        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        let conn = Connection::open_with_flags(source_uri(path), flags)
            .map_err(|e| classify(path, e))?;
        conn.busy_timeout(Duration::from_millis(policy.limits.db_busy_timeout_ms))
            .map_err(|e| classify(path, e))?;

        let sha256 = calculate_sha256(path, policy.max_file_bytes()).ok().flatten();
        let db = Self {
            conn,
            path: path.to_path_buf(),
            retries: policy.limits.db_lock_retries,
            facts: file_facts(&metadata, sha256),
        };

        // Touch the header so corrupt files and lock waits surface here.
        db.with_retry(|conn| conn.query_row("SELECT count(*) FROM sqlite_master", [], |r| r.get::<_, i64>(0)))?;
        Ok(db)
    }

    /// Open and check that every table in `required` exists.
    ///
    /// A database without the expected tables is "no data", not an error.
    pub fn open_with_tables(
        path: &Path,
        policy: &ReadPolicy,
        required: &[&str],
    ) -> Result<Option<Self>, SourceError> {
        let db = Self::open(path, policy)?;
        if db.has_tables(required)? {
            Ok(Some(db))
        } else {
            debug!("{} lacks tables {:?}, skipping", path.display(), required);
            Ok(None)
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn facts(&self) -> &FileFacts {
        &self.facts
    }

    pub fn has_tables(&self, required: &[&str]) -> Result<bool, SourceError> {
        let names: HashSet<String> = self
            .query(
                "SELECT name FROM sqlite_master WHERE type IN ('table', 'view')",
                &[],
                |row| row.get::<_, String>(0),
            )?
            .rows
            .into_iter()
            .collect();

        Ok(required.iter().all(|t| names.contains(*t)))
    }

    /// Run a query and map each row. A row whose mapping fails is counted and
    /// skipped; a failure of the statement itself is an error.
    pub fn query<T, F>(&self, sql: &str, params: &[&dyn ToSql], mut map: F) -> Result<QueryRows<T>, SourceError>
    where
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        self.with_retry(|conn| {
            let mut stmt = conn.prepare(sql)?;
            let mut rows = stmt.query(params)?;
            let mut out = QueryRows { rows: Vec::new(), malformed: 0 };
            while let Some(row) = rows.next()? {
                match map(row) {
                    Ok(value) => out.rows.push(value),
                    Err(_) => out.malformed += 1,
                }
            }
            Ok(out)
        })
    }

    fn with_retry<T>(&self, mut op: impl FnMut(&Connection) -> rusqlite::Result<T>) -> Result<T, SourceError> {
        let mut attempt = 0;
        loop {
            match op(&self.conn) {
                Ok(value) => return Ok(value),
                Err(e) if is_busy(&e) && attempt < self.retries => {
                    attempt += 1;
                    debug!(
                        "{} is locked, retry {}/{}",
                        self.path.display(),
                        attempt,
                        self.retries
                    );
                    thread::sleep(Duration::from_millis(DB_LOCK_RETRY_DELAY_MS));
                }
                Err(e) => return Err(classify(&self.path, e)),
            }
        }
    }
}

fn source_uri(path: &Path) -> String {
    let raw = path.to_string_lossy();
    let mut encoded = String::with_capacity(raw.len() + 16);
    for c in raw.chars() {
        match c {
            '%' => encoded.push_str("%25"),
            '?' => encoded.push_str("%3F"),
            '#' => encoded.push_str("%23"),
            ' ' => encoded.push_str("%20"),
            other => encoded.push(other),
        }
    }
    format!("file:{encoded}?mode=ro&immutable=1")
}

fn error_code(error: &rusqlite::Error) -> Option<ErrorCode> {
    match error {
        rusqlite::Error::SqliteFailure(failure, _) => Some(failure.code),
        _ => None,
    }
}

fn is_busy(error: &rusqlite::Error) -> bool {
    matches!(
        error_code(error),
        Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked)
    )
}

fn classify(path: &Path, error: rusqlite::Error) -> SourceError {
    match error_code(&error) {
        Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked) => SourceError::Locked {
            path: path.to_path_buf(),
        },
        Some(ErrorCode::DatabaseCorrupt) | Some(ErrorCode::NotADatabase) => {
            SourceError::corrupt(path, error.to_string())
        }
        Some(ErrorCode::PermissionDenied) | Some(ErrorCode::AuthorizationForStatementDenied) => {
            SourceError::read(path, io::Error::new(io::ErrorKind::PermissionDenied, error.to_string()))
        }
        Some(ErrorCode::CannotOpen) | Some(ErrorCode::SystemIoFailure) => {
            SourceError::read(path, io::Error::new(io::ErrorKind::Other, error.to_string()))
        }
        _ => SourceError::format(path, error.to_string()),
    }
}
