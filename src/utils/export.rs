//! JSON and JSON Lines export of stored artifacts.
//!
//! Exports read through the store's paginated query path, so they contain
//! only already-redacted values.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use log::info;

use crate::constants::{DEFAULT_BUFFER_SIZE, MAX_PAGE_SIZE};
use crate::storage::{ArtifactQuery, Store};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// One JSON array.
    Json,
    /// One artifact per line.
    JsonLines,
}

impl FromStr for ExportFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "jsonl" | "ndjson" => Ok(ExportFormat::JsonLines),
            other => bail!("unsupported export format: {other}"),
        }
    }
}

/// Stream every artifact matching `query` into `writer`. Returns the count.
pub fn export_artifacts<W: Write>(
    store: &Store,
    query: &ArtifactQuery,
    format: ExportFormat,
    writer: &mut W,
) -> Result<usize> {
    let mut page_query = ArtifactQuery {
        cursor: None,
        limit: Some(MAX_PAGE_SIZE),
        ..query.clone()
    };
    let mut written = 0;

    if format == ExportFormat::Json {
        writer.write_all(b"[")?;
    }
    loop {
        let page = store.query(&page_query).context("Failed to read artifacts for export")?;
        for artifact in &page.artifacts {
            match format {
                ExportFormat::Json => {
                    if written > 0 {
                        writer.write_all(b",")?;
                    }
                    writer.write_all(b"\n  ")?;
                    serde_json::to_writer(&mut *writer, artifact)?;
                }
                ExportFormat::JsonLines => {
                    serde_json::to_writer(&mut *writer, artifact)?;
                    writer.write_all(b"\n")?;
                }
            }
            written += 1;
        }
        match page.next_cursor {
            Some(cursor) => page_query.cursor = Some(cursor),
            None => break,
        }
    }
    if format == ExportFormat::Json {
        let close: &[u8] = if written > 0 { b"\n]\n" } else { b"]\n" };
        writer.write_all(close)?;
    }
    writer.flush()?;
    Ok(written)
}

/// Export to a file, creating or truncating it.
pub fn export_to_file(store: &Store, query: &ArtifactQuery, format: ExportFormat, path: &Path) -> Result<usize> {
    let file = File::create(path).with_context(|| format!("Failed to create export file {}", path.display()))?;
    let mut writer = BufWriter::with_capacity(DEFAULT_BUFFER_SIZE, file);
    let count = export_artifacts(store, query, format, &mut writer)?;
    info!("Exported {} artifacts to {}", count, path.display());
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{sample_artifact, seeded_store};
    use serde_json::Value;
    use tempfile::TempDir;

    #[test]
    fn test_format_parsing() {
        assert_eq!("JSONL".parse::<ExportFormat>().unwrap(), ExportFormat::JsonLines);
        assert_eq!("json".parse::<ExportFormat>().unwrap(), ExportFormat::Json);
        assert!("csv".parse::<ExportFormat>().is_err());
    }

    #[test]
    fn test_jsonl_export_one_line_per_artifact() {
        let store = seeded_store((0..3).map(|n| sample_artifact("codex", n)).collect());
        let mut out = Vec::new();
        let count = export_artifacts(&store, &ArtifactQuery::default(), ExportFormat::JsonLines, &mut out).unwrap();
        assert_eq!(count, 3);

        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().count(), 3);
        for line in text.lines() {
            let value: Value = serde_json::from_str(line).unwrap();
            assert_eq!(value["source"], "codex");
        }
    }

    #[test]
    fn test_json_export_is_an_array() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.json");
        let store = seeded_store((0..2).map(|n| sample_artifact("cursor", n)).collect());
        export_to_file(&store, &ArtifactQuery::default(), ExportFormat::Json, &path).unwrap();

        let value: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value.as_array().unwrap().len(), 2);

        let empty = seeded_store(vec![]);
        let mut out = Vec::new();
        export_artifacts(&empty, &ArtifactQuery::default(), ExportFormat::Json, &mut out).unwrap();
        let value: Value = serde_json::from_slice(&out).unwrap();
        assert!(value.as_array().unwrap().is_empty());
    }
}
