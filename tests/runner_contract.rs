//! Runner guarantees, exercised through the public API with hand-written collectors.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{bail, Result};
use rusqlite::Connection;
use tempfile::TempDir;

use aift_collector::collectors::{CollectContext, Collection, Collector, Registry, RunOptions, Runner};
use aift_collector::error::RunError;
use aift_collector::models::{
    ArtifactType, Capability, CollectorDescriptor, OutcomeStatus, RawRecord, RawTimestamp, RunStatus,
};
use aift_collector::normalize::Normalizer;
use aift_collector::storage::{ArtifactQuery, Store};

#[derive(Clone, Copy)]
enum Behavior {
    Absent,
    Records(usize),
    Fails,
    Panics,
}

struct Scripted {
    name: &'static str,
    behavior: Behavior,
    collect_calls: Arc<AtomicUsize>,
}

impl Scripted {
    fn new(name: &'static str, behavior: Behavior) -> Self {
        Self {
            name,
            behavior,
            collect_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.collect_calls)
    }
}

impl Collector for Scripted {
    fn name(&self) -> &'static str {
        self.name
    }

    fn descriptor(&self) -> CollectorDescriptor {
        CollectorDescriptor::new(self.name, &[Capability::JsonLines], vec![PathBuf::from("/scripted")])
    }

    fn detect(&self) -> bool {
        !matches!(self.behavior, Behavior::Absent)
    }

    fn collect(&self, _ctx: &CollectContext) -> Result<Collection> {
        self.collect_calls.fetch_add(1, Ordering::SeqCst);
        match self.behavior {
            Behavior::Absent => bail!("collect on an absent source"),
            Behavior::Fails => bail!("database is locked"),
            Behavior::Panics => panic!("malformed source"),
            Behavior::Records(n) => {
                let mut collection = Collection::new(self.name);
                for i in 0..n {
                    collection.push(
                        RawRecord::new(ArtifactType::HistoryEntry, Path::new("/scripted/history.jsonl"))
                            .text(format!("{} prompt {i}", self.name))
                            .timestamp(RawTimestamp::UnixSeconds((1_700_000_000 + i) as f64))
                            .record_key(format!("entry:{i}")),
                    );
                }
                Ok(collection)
            }
        }
    }
}

fn runner(collectors: Vec<Box<dyn Collector>>, workers: usize) -> Runner {
    Runner::new(
        Registry::new(collectors),
        Normalizer::default(),
        CollectContext::default(),
        RunOptions {
            workers,
            ..Default::default()
        },
    )
}

#[test]
fn test_undetected_collector_is_never_collected() -> Result<()> {
    let absent = Scripted::new("absent", Behavior::Absent);
    let calls = absent.calls();
    let mut store = Store::open_in_memory()?;

    let run = runner(vec![Box::new(absent)], 1).run(&mut store, "host", "analyst")?;

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    let outcome = run.outcome("absent").expect("outcome recorded");
    assert_eq!(outcome.status, OutcomeStatus::Skipped);
    assert_eq!(run.status, RunStatus::Success);

    let report = runner(vec![Box::new(Scripted::new("absent", Behavior::Absent))], 1).dry_run();
    assert_eq!(report.present_count(), 0);
    Ok(())
}

#[test]
fn test_failing_collectors_do_not_block_the_rest() -> Result<()> {
    for workers in [1, 4] {
        let mut store = Store::open_in_memory()?;
        let run = runner(
            vec![
                Box::new(Scripted::new("first", Behavior::Records(3))),
                Box::new(Scripted::new("locked", Behavior::Fails)),
                Box::new(Scripted::new("broken", Behavior::Panics)),
                Box::new(Scripted::new("last", Behavior::Records(2))),
            ],
            workers,
        )
        .run(&mut store, "host", "analyst")?;

        assert_eq!(run.status, RunStatus::Partial);
        let statuses: Vec<_> = run.outcomes.iter().map(|o| (o.collector.as_str(), o.status)).collect();
        assert_eq!(
            statuses,
            vec![
                ("first", OutcomeStatus::Ok),
                ("locked", OutcomeStatus::Error),
                ("broken", OutcomeStatus::Error),
                ("last", OutcomeStatus::Ok),
            ]
        );
        assert!(run.outcome("locked").and_then(|o| o.detail.as_deref()).is_some());
        assert_eq!(run.totals.inserted, 5);

        let stored = store.query(&ArtifactQuery::default())?;
        assert_eq!(stored.artifacts.len(), 5);
    }
    Ok(())
}

#[test]
fn test_runs_are_recorded_with_outcomes() -> Result<()> {
    let mut store = Store::open_in_memory()?;
    let run = runner(
        vec![
            Box::new(Scripted::new("alpha", Behavior::Records(1))),
            Box::new(Scripted::new("beta", Behavior::Absent)),
        ],
        1,
    )
    .run(&mut store, "host", "analyst")?;

    let stored = store.run(&run.id)?;
    assert_eq!(stored.status, RunStatus::Success);
    assert_eq!(stored.outcomes.len(), 2);
    assert_eq!(stored.outcomes[0].collector, "alpha");
    assert_eq!(stored.outcomes[1].status, OutcomeStatus::Skipped);
    Ok(())
}

#[test]
fn test_cancelled_run_collects_nothing_and_is_partial() -> Result<()> {
    let present = Scripted::new("present", Behavior::Records(4));
    let calls = present.calls();
    let runner = runner(vec![Box::new(present)], 1);
    runner.cancel_token().cancel();

    let mut store = Store::open_in_memory()?;
    let run = runner.run(&mut store, "host", "analyst")?;

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(run.status, RunStatus::Partial);
    assert_eq!(run.totals.new_rows(), 0);
    Ok(())
}

#[test]
fn test_storage_write_failure_is_fatal() -> Result<()> {
    let dir = TempDir::new()?;
    let db = dir.path().join("aift.db");
    let mut store = Store::open(&db)?;
    Connection::open(&db)?.execute_batch("DROP TABLE artifacts;")?;

    let result = runner(
        vec![
            Box::new(Scripted::new("first", Behavior::Records(2))),
            Box::new(Scripted::new("second", Behavior::Records(2))),
        ],
        1,
    )
    .run(&mut store, "host", "analyst");

    match result {
        Err(RunError::StorageWrite { summary, .. }) => {
            assert_eq!(summary.status, RunStatus::Failed);
            assert!(summary.outcomes.iter().all(|o| o.status == OutcomeStatus::Skipped));
            assert_eq!(summary.totals.new_rows(), 0);
        }
        Ok(run) => panic!("expected a storage failure, got {:?}", run.status),
    }
    Ok(())
}
