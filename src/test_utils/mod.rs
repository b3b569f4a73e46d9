//! Test utilities for aift-collector
//!
//! Fixture builders shared by the unit test modules.

#![cfg(test)]

use anyhow::Result;
use chrono::{Duration, TimeZone, Utc};
use serde_json::Value;
use std::fs;
use std::path::Path;
use uuid::Uuid;

use crate::adapters::ReadPolicy;
use crate::collectors::collector::CollectContext;
use crate::collectors::permission_tracker::PermissionTracker;
use crate::config::Limits;
use crate::models::{ArtifactType, Artifact, Metadata};
use crate::security::CredentialClassifier;
use crate::storage::Store;

/// Writes one JSON value per line, creating parent directories.
pub fn write_jsonl(path: &Path, lines: &[Value]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let body: Vec<String> = lines.iter().map(Value::to_string).collect();
    fs::write(path, body.join("\n") + "\n")?;
    Ok(())
}

/// Collect context with a custom per-file size cap.
pub fn context_with_cap(max_file_bytes: u64) -> CollectContext {
    let limits = Limits {
        max_file_bytes,
        ..Limits::default()
    };
    CollectContext::new(
        ReadPolicy::new(limits, CredentialClassifier::default()),
        PermissionTracker::new(),
    )
}

/// A distinct, already-normalized artifact. `n` orders the timestamps.
pub fn sample_artifact(source: &str, n: usize) -> Artifact {
    let base = Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap();
    Artifact {
        id: Uuid::new_v4().to_string(),
        source: source.to_string(),
        artifact_type: ArtifactType::HistoryEntry,
        timestamp: Some(base + Duration::seconds(n as i64)),
        title: Some(format!("entry {n}")),
        content_preview: format!("prompt number {n}"),
        file_path: format!("/fixtures/{source}/history.jsonl"),
        file_hash: None,
        file_size: Some(128),
        file_modified: None,
        fingerprint: format!("{source}-fp-{n}"),
        record_key: Some(format!("line:{}", n + 1)),
        version: 1,
        credential_detected: false,
        metadata: Metadata::new(),
        collected_at: Utc::now(),
        run_id: String::new(),
    }
}

/// In-memory store holding `artifacts` from a single run.
pub fn seeded_store(artifacts: Vec<Artifact>) -> Store {
    let mut store = Store::open_in_memory().unwrap();
    let run = store.begin_run("test-host", "tester").unwrap();
    store.upsert_artifacts(&run.id, &artifacts).unwrap();
    store
}
