use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use log::info;
use serde_json::json;

use crate::models::{CollectionRun, OutcomeStatus, PresenceReport};

/// Create a JSON summary of a collection run.
///
/// The summary is the run's chain-of-custody record: who collected, where,
/// when, what each collector did, and which files were skipped for size.
///
/// # Example Output
///
/// ```json
/// {
///   "run_id": "550e8400-e29b-41d4-a716-446655440000",
///   "hostname": "workstation-01",
///   "status": "partial",
///   "totals": {"records": 42, "inserted": 40, "unchanged": 2, "versioned": 0},
///   "collectors": [...],
///   "size_skipped": ["/Users/a/Library/Logs/huge.log"]
/// }
/// ```
pub fn create_run_summary(run: &CollectionRun) -> Result<String> {
    let collectors: Vec<_> = run
        .outcomes
        .iter()
        .map(|o| {
            json!({
                "collector": o.collector,
                "status": o.status.as_str(),
                "detail": o.detail,
                "records": o.records,
                "inserted": o.stats.inserted,
                "unchanged": o.stats.unchanged,
                "versioned": o.stats.versioned,
                "skips": o.skips,
                "duration_ms": o.duration_ms,
            })
        })
        .collect();

    let errors = run.outcomes.iter().filter(|o| o.status == OutcomeStatus::Error).count();
    let summary = json!({
        "run_id": run.id,
        "hostname": run.hostname,
        "username": run.username,
        "started_at": run.started_at.to_rfc3339(),
        "finished_at": run.finished_at.map(|t| t.to_rfc3339()),
        "status": run.status.as_str(),
        "os": std::env::consts::OS,
        "collector_version": env!("CARGO_PKG_VERSION"),
        "totals": {
            "records": run.total_records(),
            "inserted": run.totals.inserted,
            "unchanged": run.totals.unchanged,
            "versioned": run.totals.versioned,
            "collector_errors": errors,
        },
        "collectors": collectors,
        "size_skipped": run.size_skipped().collect::<Vec<_>>(),
    });

    serde_json::to_string_pretty(&summary).context("Failed to serialize run summary to JSON")
}

/// Write the run summary next to wherever the operator asked.
pub fn write_run_summary(run: &CollectionRun, path: &Path) -> Result<()> {
    let body = create_run_summary(run)?;
    fs::write(path, body).with_context(|| format!("Failed to write run summary to {}", path.display()))?;
    info!("Run summary written to {}", path.display());
    Ok(())
}

/// Human-readable end-of-run report.
pub fn render_run_report(run: &CollectionRun) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Run {} on {} ({}): {}\n",
        run.id, run.hostname, run.username, run.status
    ));
    out.push_str(&format!(
        "  {} records: {} new, {} unchanged, {} versioned\n",
        run.total_records(),
        run.totals.inserted,
        run.totals.unchanged,
        run.totals.versioned
    ));

    for o in &run.outcomes {
        let detail = o.detail.as_deref().map(|d| format!(" ({d})")).unwrap_or_default();
        out.push_str(&format!(
            "  {:<16} {:<8} {:>6} records {:>6} new {:>5} skipped{}\n",
            o.collector,
            o.status.as_str(),
            o.records,
            o.stats.new_rows(),
            o.skips.total(),
            detail
        ));
    }

    let oversized: Vec<&str> = run.size_skipped().collect();
    if !oversized.is_empty() {
        out.push_str("  Skipped for size:\n");
        for path in oversized {
            out.push_str(&format!("    {path}\n"));
        }
    }
    out
}

/// Human-readable dry-run report.
pub fn render_presence_report(report: &PresenceReport) -> String {
    let mut out = format!(
        "{} of {} sources present\n",
        report.present_count(),
        report.entries.len()
    );
    for entry in &report.entries {
        let mark = if entry.present { "present" } else { "absent" };
        let targets: Vec<String> = entry.targets.iter().map(|t| t.display().to_string()).collect();
        out.push_str(&format!("  {:<16} {:<8} {}\n", entry.name, mark, targets.join(", ")));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CollectorOutcome, PresenceEntry, RunStatus, SkipCounts, UpsertStats};
    use chrono::Utc;
    use serde_json::Value;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn run() -> CollectionRun {
        CollectionRun {
            id: "run-1".into(),
            started_at: Utc::now(),
            finished_at: Some(Utc::now()),
            status: RunStatus::Partial,
            hostname: "test-host".into(),
            username: "analyst".into(),
            outcomes: vec![
                CollectorOutcome {
                    collector: "generic_logs".into(),
                    status: OutcomeStatus::Ok,
                    detail: None,
                    records: 3,
                    stats: UpsertStats { inserted: 3, unchanged: 0, versioned: 0 },
                    skips: SkipCounts { size_limited: 1, ..Default::default() },
                    size_skipped: vec!["/logs/huge.log".into()],
                    duration_ms: 12,
                },
                CollectorOutcome::skipped("safari", "not detected"),
            ],
            totals: UpsertStats { inserted: 3, unchanged: 0, versioned: 0 },
        }
    }

    #[test]
    fn test_run_summary_fields() {
        let json: Value = serde_json::from_str(&create_run_summary(&run()).unwrap()).unwrap();
        assert_eq!(json["hostname"], "test-host");
        assert_eq!(json["status"], "partial");
        assert_eq!(json["totals"]["records"], 3);
        assert_eq!(json["collectors"].as_array().unwrap().len(), 2);
        assert_eq!(json["collectors"][1]["detail"], "not detected");
        assert_eq!(json["size_skipped"][0], "/logs/huge.log");
    }

    #[test]
    fn test_write_run_summary() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("summary.json");
        write_run_summary(&run(), &path).unwrap();
        assert!(fs::read_to_string(&path).unwrap().contains("run-1"));
    }

    #[test]
    fn test_reports_render() {
        let report = render_run_report(&run());
        assert!(report.contains("Skipped for size"));
        assert!(report.contains("/logs/huge.log"));

        let presence = PresenceReport {
            entries: vec![PresenceEntry {
                name: "ollama".into(),
                present: true,
                targets: vec![PathBuf::from("/home/u/.ollama")],
            }],
        };
        assert!(render_presence_report(&presence).starts_with("1 of 1 sources present"));
    }
}
