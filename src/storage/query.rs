//! Read side of the store: filtered browsing, search, timeline, stats and
//! run history.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Row};
use serde::Serialize;

use crate::constants::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use crate::error::{StorageError, StorageResult};
use crate::models::{
    meta_keys, Artifact, ArtifactType, CollectionRun, CollectorOutcome, Metadata, OutcomeStatus, RunStatus,
    UpsertStats,
};
use crate::normalize::to_canonical;
use crate::storage::store::{parse_time, Store};

const ARTIFACT_COLUMNS: &str = "seq, id, source, artifact_type, timestamp, sort_time, title, content_preview, \
     file_path, file_hash, file_size, file_modified, fingerprint, record_key, version, \
     credential_detected, metadata, collected_at, run_id";

/// Filters for browsing and searching. Unset fields do not constrain.
#[derive(Debug, Clone, Default)]
pub struct ArtifactQuery {
    pub source: Option<String>,
    pub artifact_type: Option<ArtifactType>,
    /// Inclusive lower bound on the artifact timestamp.
    pub since: Option<DateTime<Utc>>,
    /// Exclusive upper bound on the artifact timestamp.
    pub until: Option<DateTime<Utc>>,
    /// Case-insensitive substring over preview, title and path.
    pub text: Option<String>,
    pub run_id: Option<String>,
    pub credential_only: bool,
    /// Opaque cursor from a previous [`Page`].
    pub cursor: Option<String>,
    pub limit: Option<usize>,
}

impl ArtifactQuery {
    pub fn search(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    fn page_size(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
    }
}

/// One page of results, newest first.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Page {
    pub artifacts: Vec<Artifact>,
    /// Present when more rows follow.
    pub next_cursor: Option<String>,
}

/// Aggregate view of the store.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreStats {
    pub total_artifacts: u64,
    pub by_source: BTreeMap<String, u64>,
    pub by_type: BTreeMap<String, u64>,
    pub by_model: BTreeMap<String, u64>,
    pub earliest: Option<DateTime<Utc>>,
    pub latest: Option<DateTime<Utc>>,
    pub token_estimate_total: u64,
    pub credential_flagged: u64,
    pub runs: u64,
}

/// Keyset position: the last row's `(sort_time, seq)`.
fn encode_cursor(sort_time: &str, seq: i64) -> String {
    format!("{sort_time}|{seq}")
}

fn decode_cursor(cursor: &str) -> StorageResult<(String, i64)> {
    let (time, seq) = cursor.rsplit_once('|').ok_or(StorageError::InvalidCursor)?;
    let seq = seq.parse::<i64>().map_err(|_| StorageError::InvalidCursor)?;
    if parse_time(time).is_none() {
        return Err(StorageError::InvalidCursor);
    }
    Ok((time.to_string(), seq))
}

/// Escape `%`, `_` and the escape char itself for `LIKE ... ESCAPE '\'`.
fn like_pattern(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('%');
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('%');
    out
}

/// WHERE clause and bound values for the non-cursor filters.
fn filter_clause(query: &ArtifactQuery) -> (Vec<String>, Vec<SqlValue>) {
    let mut clauses = Vec::new();
    let mut values = Vec::new();

    if let Some(source) = &query.source {
        clauses.push("source = ?".to_string());
        values.push(SqlValue::Text(source.clone()));
    }
    if let Some(kind) = query.artifact_type {
        clauses.push("artifact_type = ?".to_string());
        values.push(SqlValue::Text(kind.as_str().to_string()));
    }
    if let Some(since) = &query.since {
        clauses.push("timestamp >= ?".to_string());
        values.push(SqlValue::Text(to_canonical(since)));
    }
    if let Some(until) = &query.until {
        clauses.push("timestamp < ?".to_string());
        values.push(SqlValue::Text(to_canonical(until)));
    }
    if let Some(run_id) = &query.run_id {
        clauses.push("run_id = ?".to_string());
        values.push(SqlValue::Text(run_id.clone()));
    }
    if query.credential_only {
        clauses.push("credential_detected = 1".to_string());
    }
    if let Some(text) = query.text.as_deref().filter(|t| !t.is_empty()) {
        clauses.push(
            "(content_preview LIKE ? ESCAPE '\\' OR title LIKE ? ESCAPE '\\' OR file_path LIKE ? ESCAPE '\\')"
                .to_string(),
        );
        let pattern = like_pattern(text);
        for _ in 0..3 {
            values.push(SqlValue::Text(pattern.clone()));
        }
    }

    (clauses, values)
}

fn artifact_from_row(row: &Row<'_>) -> rusqlite::Result<(Artifact, String, i64)> {
    let seq: i64 = row.get("seq")?;
    let sort_time: String = row.get("sort_time")?;
    let artifact_type: String = row.get("artifact_type")?;
    let metadata: String = row.get("metadata")?;
    let timestamp: Option<String> = row.get("timestamp")?;
    let file_modified: Option<String> = row.get("file_modified")?;
    let collected_at: String = row.get("collected_at")?;
    let file_size: Option<i64> = row.get("file_size")?;
    let version: i64 = row.get("version")?;

    let artifact = Artifact {
        id: row.get("id")?,
        source: row.get("source")?,
        artifact_type: artifact_type.parse().map_err(|e: String| {
            rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, e.into())
        })?,
        timestamp: timestamp.as_deref().and_then(parse_time),
        title: row.get("title")?,
        content_preview: row.get("content_preview")?,
        file_path: row.get("file_path")?,
        file_hash: row.get("file_hash")?,
        file_size: file_size.map(|s| s.max(0) as u64),
        file_modified: file_modified.as_deref().and_then(parse_time),
        fingerprint: row.get("fingerprint")?,
        record_key: row.get("record_key")?,
        version: version.max(1) as u32,
        credential_detected: row.get("credential_detected")?,
        metadata: serde_json::from_str::<Metadata>(&metadata).unwrap_or_default(),
        collected_at: parse_time(&collected_at).unwrap_or_default(),
        run_id: row.get("run_id")?,
    };
    Ok((artifact, sort_time, seq))
}

fn outcome_from_row(row: &Row<'_>) -> rusqlite::Result<CollectorOutcome> {
    let status: String = row.get("status")?;
    let skips: String = row.get("skips")?;
    let size_skipped: String = row.get("size_skipped")?;
    let records: i64 = row.get("records")?;
    let duration_ms: i64 = row.get("duration_ms")?;

    Ok(CollectorOutcome {
        collector: row.get("collector")?,
        status: OutcomeStatus::parse(&status).unwrap_or(OutcomeStatus::Error),
        detail: row.get("detail")?,
        records: records.max(0) as usize,
        stats: UpsertStats {
            inserted: row.get::<_, i64>("inserted")?.max(0) as usize,
            unchanged: row.get::<_, i64>("unchanged")?.max(0) as usize,
            versioned: row.get::<_, i64>("versioned")?.max(0) as usize,
        },
        skips: serde_json::from_str(&skips).unwrap_or_default(),
        size_skipped: serde_json::from_str(&size_skipped).unwrap_or_default(),
        duration_ms: duration_ms.max(0) as u64,
    })
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<CollectionRun> {
    let started_at: String = row.get("started_at")?;
    let finished_at: Option<String> = row.get("finished_at")?;
    let status: String = row.get("status")?;

    Ok(CollectionRun {
        id: row.get("id")?,
        started_at: parse_time(&started_at).unwrap_or_default(),
        finished_at: finished_at.as_deref().and_then(parse_time),
        status: RunStatus::parse(&status).unwrap_or(RunStatus::Failed),
        hostname: row.get("hostname")?,
        username: row.get("username")?,
        outcomes: Vec::new(),
        totals: UpsertStats {
            inserted: row.get::<_, i64>("inserted")?.max(0) as usize,
            unchanged: row.get::<_, i64>("unchanged")?.max(0) as usize,
            versioned: row.get::<_, i64>("versioned")?.max(0) as usize,
        },
    })
}

impl Store {
    /// Browse or search, newest first, with keyset pagination.
    pub fn query(&self, query: &ArtifactQuery) -> StorageResult<Page> {
        let (mut clauses, mut values) = filter_clause(query);
        if let Some(cursor) = &query.cursor {
            let (time, seq) = decode_cursor(cursor)?;
            clauses.push("(sort_time < ? OR (sort_time = ? AND seq < ?))".to_string());
            values.push(SqlValue::Text(time.clone()));
            values.push(SqlValue::Text(time));
            values.push(SqlValue::Integer(seq));
        }

        let limit = query.page_size();
        let sql = format!(
            "SELECT {ARTIFACT_COLUMNS} FROM artifacts {} ORDER BY sort_time DESC, seq DESC LIMIT {}",
            where_sql(&clauses),
            limit + 1
        );

        let mut stmt = self.conn().prepare(&sql)?;
        let mut rows = stmt
            .query_map(params_from_iter(values), artifact_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let next_cursor = if rows.len() > limit {
            rows.truncate(limit);
            rows.last().map(|(_, time, seq)| encode_cursor(time, *seq))
        } else {
            None
        };

        Ok(Page {
            artifacts: rows.into_iter().map(|(artifact, _, _)| artifact).collect(),
            next_cursor,
        })
    }

    /// Free-text search shorthand.
    pub fn search(&self, text: &str, limit: Option<usize>) -> StorageResult<Page> {
        self.query(&ArtifactQuery {
            limit,
            ..ArtifactQuery::search(text)
        })
    }

    /// Timestamped artifacts in ascending time order, paged with a
    /// `(timestamp, seq)` cursor.
    pub fn timeline(&self, query: &ArtifactQuery) -> StorageResult<Page> {
        let (mut clauses, mut values) = filter_clause(query);
        clauses.push("timestamp IS NOT NULL".to_string());
        if let Some(cursor) = &query.cursor {
            let (time, seq) = decode_cursor(cursor)?;
            clauses.push("(timestamp > ? OR (timestamp = ? AND seq > ?))".to_string());
            values.push(SqlValue::Text(time.clone()));
            values.push(SqlValue::Text(time));
            values.push(SqlValue::Integer(seq));
        }

        let limit = query.page_size();
        let sql = format!(
            "SELECT {ARTIFACT_COLUMNS} FROM artifacts {} ORDER BY timestamp ASC, seq ASC LIMIT {}",
            where_sql(&clauses),
            limit + 1
        );
        let mut stmt = self.conn().prepare(&sql)?;
        let mut rows = stmt
            .query_map(params_from_iter(values), |row| {
                let timestamp: String = row.get("timestamp")?;
                artifact_from_row(row).map(|(artifact, _, seq)| (artifact, timestamp, seq))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let next_cursor = if rows.len() > limit {
            rows.truncate(limit);
            rows.last().map(|(_, time, seq)| encode_cursor(time, *seq))
        } else {
            None
        };

        Ok(Page {
            artifacts: rows.into_iter().map(|(artifact, _, _)| artifact).collect(),
            next_cursor,
        })
    }

    /// Every version stored for one record key, oldest first.
    pub fn versions(&self, source: &str, file_path: &str, record_key: &str) -> StorageResult<Vec<Artifact>> {
        let sql = format!(
            "SELECT {ARTIFACT_COLUMNS} FROM artifacts
             WHERE source = ?1 AND file_path = ?2 AND record_key = ?3 ORDER BY version ASC"
        );
        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt
            .query_map(params![source, file_path, record_key], artifact_from_row)?
            .map(|row| row.map(|(artifact, _, _)| artifact))
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn stats(&self) -> StorageResult<StoreStats> {
        let conn = self.conn();
        let mut stats = StoreStats {
            total_artifacts: count(conn, "SELECT count(*) FROM artifacts")?,
            credential_flagged: count(conn, "SELECT count(*) FROM artifacts WHERE credential_detected = 1")?,
            runs: count(conn, "SELECT count(*) FROM collection_runs")?,
            ..Default::default()
        };

        stats.by_source = grouped(conn, "SELECT source, count(*) FROM artifacts GROUP BY source")?;
        stats.by_type = grouped(conn, "SELECT artifact_type, count(*) FROM artifacts GROUP BY artifact_type")?;
        stats.by_model = grouped(
            conn,
            &format!(
                "SELECT json_extract(metadata, '$.{model}') AS m, count(*) FROM artifacts
                 WHERE json_extract(metadata, '$.{model}') IS NOT NULL GROUP BY m",
                model = meta_keys::MODEL
            ),
        )?;

        let (earliest, latest): (Option<String>, Option<String>) = conn.query_row(
            "SELECT MIN(timestamp), MAX(timestamp) FROM artifacts WHERE timestamp IS NOT NULL",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        stats.earliest = earliest.as_deref().and_then(parse_time);
        stats.latest = latest.as_deref().and_then(parse_time);

        let tokens: Option<i64> = conn.query_row(
            &format!(
                "SELECT CAST(SUM(json_extract(metadata, '$.{key}')) AS INTEGER) FROM artifacts",
                key = meta_keys::TOKEN_ESTIMATE
            ),
            [],
            |row| row.get(0),
        )?;
        stats.token_estimate_total = tokens.unwrap_or(0).max(0) as u64;

        Ok(stats)
    }

    /// Most recent runs first, each with its collector outcomes.
    pub fn recent_runs(&self, limit: usize) -> StorageResult<Vec<CollectionRun>> {
        let mut stmt = self
            .conn()
            .prepare("SELECT * FROM collection_runs ORDER BY started_at DESC LIMIT ?1")?;
        let mut runs = stmt
            .query_map([limit.clamp(1, MAX_PAGE_SIZE) as i64], run_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        for run in &mut runs {
            run.outcomes = self.run_outcomes(&run.id)?;
        }
        Ok(runs)
    }

    pub fn run(&self, run_id: &str) -> StorageResult<CollectionRun> {
        let mut stmt = self.conn().prepare("SELECT * FROM collection_runs WHERE id = ?1")?;
        let mut run = stmt
            .query_map([run_id], run_from_row)?
            .next()
            .transpose()?
            .ok_or_else(|| StorageError::UnknownRun(run_id.to_string()))?;
        run.outcomes = self.run_outcomes(run_id)?;
        Ok(run)
    }

    /// Outcomes in registry order.
    pub fn run_outcomes(&self, run_id: &str) -> StorageResult<Vec<CollectorOutcome>> {
        let mut stmt = self
            .conn()
            .prepare("SELECT * FROM collector_outcomes WHERE run_id = ?1 ORDER BY position ASC")?;
        let outcomes = stmt
            .query_map([run_id], outcome_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(outcomes)
    }
}

fn where_sql(clauses: &[String]) -> String {
    if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    }
}

fn count(conn: &rusqlite::Connection, sql: &str) -> StorageResult<u64> {
    let n: i64 = conn.query_row(sql, [], |row| row.get(0))?;
    Ok(n.max(0) as u64)
}

fn grouped(conn: &rusqlite::Connection, sql: &str) -> StorageResult<BTreeMap<String, u64>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map([], |row| {
        let key: SqlValue = row.get(0)?;
        let n: i64 = row.get(1)?;
        Ok((key, n))
    })?;

    let mut out = BTreeMap::new();
    for row in rows {
        let (key, n) = row?;
        let key = match key {
            SqlValue::Text(s) => s,
            SqlValue::Integer(i) => i.to_string(),
            SqlValue::Real(f) => f.to_string(),
            _ => continue,
        };
        *out.entry(key).or_insert(0) += n.max(0) as u64;
    }
    Ok(out)
}
