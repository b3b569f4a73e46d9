//! Re-collection against an on-disk store: persistence, growth, versioning and export.

use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use anyhow::Result;
use serde_json::{json, Value};
use tempfile::TempDir;

use aift_collector::collectors::tools::ClaudeCodeCollector;
use aift_collector::collectors::{CollectContext, Registry, RunOptions, Runner};
use aift_collector::models::ArtifactType;
use aift_collector::normalize::Normalizer;
use aift_collector::storage::{ArtifactQuery, Store};
use aift_collector::utils::export::{export_to_file, ExportFormat};

fn claude_runner(root: &Path) -> Runner {
    Runner::new(
        Registry::new(vec![Box::new(ClaudeCodeCollector::new(root.to_path_buf()))]),
        Normalizer::default(),
        CollectContext::default(),
        RunOptions::default(),
    )
}

fn append_history(root: &Path, prompts: &[&str]) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(root.join("history.jsonl"))?;
    for (i, prompt) in prompts.iter().enumerate() {
        writeln!(file, "{}", json!({"display": prompt, "timestamp": 1_717_000_000_000i64 + i as i64}))?;
    }
    Ok(())
}

#[test]
fn test_store_survives_reopen() -> Result<()> {
    let sources = TempDir::new()?;
    let root = sources.path().join(".claude");
    fs::create_dir_all(&root)?;
    append_history(&root, &["first prompt", "second prompt", "third prompt"])?;

    let work = TempDir::new()?;
    let db = work.path().join("aift.db");
    let run_id = {
        let mut store = Store::open(&db)?;
        claude_runner(&root).run(&mut store, "host", "analyst")?.id
    };

    let store = Store::open(&db)?;
    let stats = store.stats()?;
    assert_eq!(stats.total_artifacts, 3);
    assert_eq!(stats.runs, 1);
    assert_eq!(store.recent_runs(5)?[0].id, run_id);
    assert_eq!(store.search("second", None)?.artifacts.len(), 1);
    Ok(())
}

#[test]
fn test_grown_history_adds_only_new_lines() -> Result<()> {
    let sources = TempDir::new()?;
    let root = sources.path().join(".claude");
    fs::create_dir_all(&root)?;
    append_history(&root, &["alpha", "beta", "gamma"])?;

    let mut store = Store::open_in_memory()?;
    let runner = claude_runner(&root);
    runner.run(&mut store, "host", "analyst")?;

    fs::write(
        root.join("history.jsonl"),
        format!(
            "{}{}\n",
            fs::read_to_string(root.join("history.jsonl"))?,
            json!({"display": "delta", "timestamp": 1_717_000_100_000i64})
        ),
    )?;
    let second = runner.run(&mut store, "host", "analyst")?;

    assert_eq!(second.totals.inserted, 1);
    assert_eq!(second.totals.unchanged, 3);
    assert_eq!(store.stats()?.total_artifacts, 4);
    Ok(())
}

#[test]
fn test_changed_config_is_versioned() -> Result<()> {
    let sources = TempDir::new()?;
    let root = sources.path().join(".claude");
    fs::create_dir_all(&root)?;
    let settings = root.join("settings.json");
    fs::write(&settings, json!({"model": "claude-sonnet-4"}).to_string())?;

    let mut store = Store::open_in_memory()?;
    let runner = claude_runner(&root);
    runner.run(&mut store, "host", "analyst")?;

    fs::write(&settings, json!({"model": "claude-opus-4"}).to_string())?;
    let second = runner.run(&mut store, "host", "analyst")?;
    assert_eq!(second.totals.versioned, 1);
    assert_eq!(second.totals.inserted, 0);

    let versions = store.versions("claude_code", &settings.to_string_lossy(), "settings.json")?;
    assert_eq!(versions.iter().map(|a| a.version).collect::<Vec<_>>(), vec![1, 2]);
    assert!(versions.iter().all(|a| a.artifact_type == ArtifactType::Config));
    assert_ne!(versions[0].fingerprint, versions[1].fingerprint);
    Ok(())
}

#[test]
fn test_export_lines_match_store() -> Result<()> {
    let sources = TempDir::new()?;
    let root = sources.path().join(".claude");
    fs::create_dir_all(&root)?;
    append_history(&root, &["one", "two", "three", "four"])?;

    let work = TempDir::new()?;
    let mut store = Store::open(&work.path().join("aift.db"))?;
    claude_runner(&root).run(&mut store, "host", "analyst")?;

    let out = work.path().join("export.jsonl");
    let count = export_to_file(&store, &ArtifactQuery::default(), ExportFormat::JsonLines, &out)?;
    assert_eq!(count, 4);

    let lines: Vec<Value> = BufReader::new(fs::File::open(&out)?)
        .lines()
        .map(|line| Ok(serde_json::from_str(&line?)?))
        .collect::<Result<_>>()?;
    assert_eq!(lines.len(), 4);
    assert!(lines.iter().all(|v| v["source"] == "claude_code"));
    Ok(())
}
