//! Properties that must hold for any input: symlinks, previews, redaction.

use std::fs;
use std::path::Path;

use anyhow::Result;
use chrono::Utc;
use proptest::prelude::*;
use serde_json::json;
use tempfile::TempDir;

use aift_collector::collectors::tools::{ClaudeCodeCollector, GenericLogsCollector};
use aift_collector::collectors::{CollectContext, Collector, Registry, RunOptions, Runner};
use aift_collector::constants::CONTENT_PREVIEW_MAX_CHARS;
use aift_collector::models::{ArtifactType, RawRecord};
use aift_collector::normalize::Normalizer;
use aift_collector::storage::{ArtifactQuery, Store};

const SECRET_MARKER: &str = "outside-the-evidence-root";

fn collect_into_memory(collector: impl Collector + 'static) -> Result<(Store, aift_collector::models::CollectionRun)> {
    let runner = Runner::new(
        Registry::new(vec![Box::new(collector)]),
        Normalizer::default(),
        CollectContext::default(),
        RunOptions::default(),
    );
    let mut store = Store::open_in_memory()?;
    let run = runner.run(&mut store, "host", "analyst")?;
    Ok((store, run))
}

fn write_secret(dir: &Path) -> Result<std::path::PathBuf> {
    let secret = dir.join("private.jsonl");
    fs::write(
        &secret,
        format!("{}\n", json!({"display": SECRET_MARKER, "timestamp": 1_717_000_000_000i64})),
    )?;
    Ok(secret)
}

#[cfg(unix)]
#[test]
fn test_symlinked_history_is_never_read() -> Result<()> {
    let outside = TempDir::new()?;
    let secret = write_secret(outside.path())?;

    let sources = TempDir::new()?;
    let root = sources.path().join(".claude");
    fs::create_dir_all(&root)?;
    std::os::unix::fs::symlink(&secret, root.join("history.jsonl"))?;

    let (store, run) = collect_into_memory(ClaudeCodeCollector::new(root))?;

    assert!(run.outcome("claude_code").map_or(false, |o| o.skips.symlinks >= 1));
    assert!(store.search(SECRET_MARKER, None)?.artifacts.is_empty());
    let all = store.query(&ArtifactQuery::default())?;
    assert!(all
        .artifacts
        .iter()
        .all(|a| a.file_path != secret.to_string_lossy()));
    Ok(())
}

#[cfg(unix)]
#[test]
fn test_symlinked_log_is_never_scanned() -> Result<()> {
    let outside = TempDir::new()?;
    let secret = outside.path().join("session.log");
    fs::write(&secret, format!("claude {SECRET_MARKER}\n"))?;

    let sources = TempDir::new()?;
    let ai_dir = sources.path().join("claude");
    fs::create_dir_all(&ai_dir)?;
    std::os::unix::fs::symlink(&secret, ai_dir.join("session.log"))?;

    let collector = GenericLogsCollector::new(
        vec![sources.path().to_path_buf()],
        vec!["claude".into()],
        vec!["claude".into()],
    );
    let (store, _) = collect_into_memory(collector)?;

    assert!(store.search(SECRET_MARKER, None)?.artifacts.is_empty());
    let all = store.query(&ArtifactQuery::default())?;
    assert!(all.artifacts.iter().all(|a| a.artifact_type != ArtifactType::LogMatch));
    Ok(())
}

#[cfg(unix)]
#[test]
fn test_symlinked_root_is_not_followed() -> Result<()> {
    let outside = TempDir::new()?;
    write_secret(outside.path())?;
    fs::rename(outside.path().join("private.jsonl"), outside.path().join("history.jsonl"))?;

    let sources = TempDir::new()?;
    let root = sources.path().join(".claude");
    std::os::unix::fs::symlink(outside.path(), &root)?;

    let (store, _) = collect_into_memory(ClaudeCodeCollector::new(root))?;
    assert!(store.search(SECRET_MARKER, None)?.artifacts.is_empty());
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_preview_is_bounded(text in "\\PC{0,1200}") {
        let record = RawRecord::new(ArtifactType::ConversationMessage, Path::new("/p/session.jsonl"))
            .text(text);
        let artifact = Normalizer::default().build(record, "run", Utc::now());

        prop_assert!(artifact.content_preview.chars().count() <= CONTENT_PREVIEW_MAX_CHARS);
    }

    #[test]
    fn prop_multibyte_preview_never_splits_chars(repeat in 1usize..400, glyph in prop::sample::select(vec!["é", "中", "🦀", "ß"])) {
        let text = glyph.repeat(repeat * 3);
        let record = RawRecord::new(ArtifactType::HistoryEntry, Path::new("/p/history.jsonl")).text(text);
        let artifact = Normalizer::default().build(record, "run", Utc::now());

        prop_assert!(artifact.content_preview.chars().count() <= CONTENT_PREVIEW_MAX_CHARS);
        let body = artifact.content_preview.trim_end_matches("...");
        prop_assert!(body.chars().all(|c| c.to_string() == glyph));
    }
}
