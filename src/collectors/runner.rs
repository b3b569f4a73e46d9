//! Drives the registry through one collection run.
//!
//! Each collector is an isolated unit: a detect or collect failure, even a
//! panic, becomes an outcome and the run moves on. Collection may fan out
//! over a bounded worker pool, but every store commit happens on the calling
//! thread, one transaction per collector. A storage failure is the only
//! thing that ends a run early.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use crossbeam::channel::unbounded;
use log::{debug, info, warn};

use crate::adapters::ReadPolicy;
use crate::collectors::collector::{CollectContext, Collector};
use crate::collectors::permission_tracker::PermissionTracker;
use crate::collectors::registry::Registry;
use crate::config::CollectionConfig;
use crate::constants::MAX_WORKER_THREADS;
use crate::error::{RunError, StorageError};
use crate::models::{
    Artifact, CollectionRun, CollectorOutcome, OutcomeStatus, PresenceEntry, PresenceReport, RunStatus, SkipCounts,
    UpsertStats,
};
use crate::normalize::Normalizer;
use crate::security::safe_error_message;
use crate::storage::Store;

const NOT_DETECTED: &str = "not detected";
const CANCELLED: &str = "cancelled";
const ABORTED: &str = "aborted after storage failure";

/// Cooperative cancellation flag, checked between collectors.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// 0 or 1 collects sequentially.
    pub workers: usize,
    pub cancel: CancelToken,
}

impl RunOptions {
    /// Worker threads actually used, capped by the machine.
    pub fn effective_workers(&self) -> usize {
        let cap = std::cmp::min(num_cpus::get() * 2, MAX_WORKER_THREADS);
        self.workers.clamp(1, cap.max(1))
    }
}

/// What a worker hands back for one collector.
enum Unit {
    Skipped(&'static str),
    Failed { detail: String, duration_ms: u64 },
    Collected {
        artifacts: Vec<Artifact>,
        skips: SkipCounts,
        size_skipped: Vec<String>,
        duration_ms: u64,
    },
}

pub struct Runner {
    registry: Registry,
    normalizer: Normalizer,
    context: CollectContext,
    options: RunOptions,
}

impl Runner {
    pub fn new(registry: Registry, normalizer: Normalizer, context: CollectContext, options: RunOptions) -> Self {
        Self {
            registry,
            normalizer,
            context,
            options,
        }
    }

    /// Registry, read policy and worker count taken from the configuration.
    pub fn from_config(config: &CollectionConfig) -> Self {
        Self::new(
            Registry::from_config(config),
            Normalizer::default(),
            CollectContext::new(ReadPolicy::from_config(config), PermissionTracker::new()),
            RunOptions {
                workers: config.workers,
                cancel: CancelToken::new(),
            },
        )
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.options.workers = workers;
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.options.cancel.clone()
    }

    pub fn permissions(&self) -> &PermissionTracker {
        &self.context.permissions
    }

    /// Detect-only pass. Nothing is opened and nothing is written.
    pub fn dry_run(&self) -> PresenceReport {
        let entries = self
            .registry
            .collectors()
            .iter()
            .map(|collector| PresenceEntry {
                name: collector.name().to_string(),
                present: guarded_detect(collector.as_ref()),
                targets: collector.descriptor().targets,
            })
            .collect();
        PresenceReport { entries }
    }

    /// Execute every registered collector and persist what they find.
    pub fn run(&self, store: &mut Store, hostname: &str, username: &str) -> Result<CollectionRun, RunError> {
        let mut run = match store.begin_run(hostname, username) {
            Ok(run) => run,
            Err(source) => {
                let summary = CollectionRun {
                    id: String::new(),
                    started_at: Utc::now(),
                    finished_at: Some(Utc::now()),
                    status: RunStatus::Failed,
                    hostname: hostname.to_string(),
                    username: username.to_string(),
                    outcomes: Vec::new(),
                    totals: UpsertStats::default(),
                };
                return Err(RunError::StorageWrite {
                    summary: Box::new(summary),
                    source,
                });
            }
        };
        info!("Starting collection run {} ({} collectors)", run.id, self.registry.len());

        let workers = self.options.effective_workers();
        let (outcomes, failure) = if workers > 1 && self.registry.len() > 1 {
            self.run_parallel(store, &run.id, workers)
        } else {
            self.run_sequential(store, &run.id)
        };

        for outcome in &outcomes {
            run.totals.absorb(&outcome.stats);
        }
        run.outcomes = outcomes;
        run.finished_at = Some(Utc::now());
        run.status = if failure.is_some() {
            RunStatus::Failed
        } else if run
            .outcomes
            .iter()
            .any(|o| o.status == OutcomeStatus::Error || o.skips.failures() > 0)
            || self.options.cancel.is_cancelled()
        {
            RunStatus::Partial
        } else {
            RunStatus::Success
        };

        self.context.permissions.report_failures();

        if let Some(source) = failure {
            if let Err(e) = store.finish_run(&run) {
                warn!("Could not record failed run {}: {}", run.id, e);
            }
            return Err(RunError::StorageWrite {
                summary: Box::new(run),
                source,
            });
        }
        if let Err(source) = store.finish_run(&run) {
            run.status = RunStatus::Failed;
            return Err(RunError::StorageWrite {
                summary: Box::new(run),
                source,
            });
        }

        info!(
            "Run {} finished as {}: {} new, {} unchanged, {} versioned",
            run.id, run.status, run.totals.inserted, run.totals.unchanged, run.totals.versioned
        );
        Ok(run)
    }

    fn run_sequential(&self, store: &mut Store, run_id: &str) -> (Vec<CollectorOutcome>, Option<StorageError>) {
        let stop = AtomicBool::new(false);
        let mut outcomes = Vec::with_capacity(self.registry.len());
        let mut failure = None;

        for collector in self.registry.collectors() {
            let name = collector.name();
            if failure.is_some() {
                outcomes.push(CollectorOutcome::skipped(name, ABORTED));
                continue;
            }
            let unit = self.execute(collector.as_ref(), run_id, &stop);
            match commit(store, run_id, name, unit) {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    warn!("Storage write failed for {}: {}", name, e);
                    outcomes.push(CollectorOutcome::skipped(name, ABORTED));
                    failure = Some(e);
                }
            }
        }
        (outcomes, failure)
    }

    fn run_parallel(
        &self,
        store: &mut Store,
        run_id: &str,
        workers: usize,
    ) -> (Vec<CollectorOutcome>, Option<StorageError>) {
        let pool = match rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("aift-collector-{i}"))
            .build()
        {
            Ok(pool) => pool,
            Err(e) => {
                warn!("Worker pool unavailable ({}), collecting sequentially", e);
                return self.run_sequential(store, run_id);
            }
        };
        debug!("Collecting with {} workers", workers);

        let stop = AtomicBool::new(false);
        let mut slots: Vec<Option<CollectorOutcome>> = vec![None; self.registry.len()];
        let mut failure = None;
        let (tx, rx) = unbounded::<(usize, Unit)>();

        pool.in_place_scope(|scope| {
            for (idx, collector) in self.registry.collectors().iter().enumerate() {
                let tx = tx.clone();
                let stop = &stop;
                scope.spawn(move |_| {
                    let unit = self.execute(collector.as_ref(), run_id, stop);
                    let _ = tx.send((idx, unit));
                });
            }
            drop(tx);

            // Commits are serialized here, in arrival order.
            for (idx, unit) in rx.iter() {
                let name = self.registry.collectors()[idx].name();
                if failure.is_some() {
                    slots[idx] = Some(CollectorOutcome::skipped(name, ABORTED));
                    continue;
                }
                match commit(store, run_id, name, unit) {
                    Ok(outcome) => slots[idx] = Some(outcome),
                    Err(e) => {
                        warn!("Storage write failed for {}: {}", name, e);
                        stop.store(true, Ordering::SeqCst);
                        slots[idx] = Some(CollectorOutcome::skipped(name, ABORTED));
                        failure = Some(e);
                    }
                }
            }
        });

        let outcomes = slots
            .into_iter()
            .zip(self.registry.names())
            .map(|(slot, name)| slot.unwrap_or_else(|| CollectorOutcome::skipped(name, ABORTED)))
            .collect();
        (outcomes, failure)
    }

    /// Detect, collect and normalize one collector. Never panics.
    fn execute(&self, collector: &dyn Collector, run_id: &str, stop: &AtomicBool) -> Unit {
        let name = collector.name();
        if stop.load(Ordering::SeqCst) {
            return Unit::Skipped(ABORTED);
        }
        if self.options.cancel.is_cancelled() {
            return Unit::Skipped(CANCELLED);
        }
        if !guarded_detect(collector) {
            debug!("[{}] not detected", name);
            return Unit::Skipped(NOT_DETECTED);
        }

        info!("Collecting: {}", name);
        let started = Instant::now();
        let result = panic::catch_unwind(AssertUnwindSafe(|| collector.collect(&self.context)));
        let duration_ms = started.elapsed().as_millis() as u64;

        let collection = match result {
            Ok(Ok(collection)) => collection,
            Ok(Err(e)) => {
                let detail = safe_error_message(name, &format!("{e:#}"));
                warn!("{}", detail);
                return Unit::Failed { detail, duration_ms };
            }
            Err(_) => {
                warn!("Collector {} panicked", name);
                return Unit::Failed {
                    detail: format!("{name}: collector panicked"),
                    duration_ms,
                };
            }
        };

        let (records, skips, size_skipped) = collection.into_parts();
        let collected_at = Utc::now();
        let artifacts = records
            .into_iter()
            .map(|record| self.normalizer.build(record, run_id, collected_at))
            .collect();

        Unit::Collected {
            artifacts,
            skips,
            size_skipped,
            duration_ms,
        }
    }
}

/// A panicking `detect` counts as not present.
fn guarded_detect(collector: &dyn Collector) -> bool {
    panic::catch_unwind(AssertUnwindSafe(|| collector.detect())).unwrap_or_else(|_| {
        warn!("Collector {} panicked during detection", collector.name());
        false
    })
}

fn commit(store: &mut Store, run_id: &str, name: &str, unit: Unit) -> Result<CollectorOutcome, StorageError> {
    match unit {
        Unit::Skipped(detail) => Ok(CollectorOutcome::skipped(name, detail)),
        Unit::Failed { detail, duration_ms } => Ok(CollectorOutcome {
            collector: name.to_string(),
            status: OutcomeStatus::Error,
            detail: Some(detail),
            records: 0,
            stats: UpsertStats::default(),
            skips: SkipCounts::default(),
            size_skipped: Vec::new(),
            duration_ms,
        }),
        Unit::Collected {
            artifacts,
            skips,
            size_skipped,
            duration_ms,
        } => {
            let stats = store.upsert_artifacts(run_id, &artifacts)?;
            for path in &size_skipped {
                warn!("[{}] skipped oversized file: {}", name, path);
            }
            info!(
                "Collected {}: {} records ({} new, {} unchanged, {} skipped)",
                name,
                artifacts.len(),
                stats.new_rows(),
                stats.unchanged,
                skips.total()
            );
            Ok(CollectorOutcome {
                collector: name.to_string(),
                status: OutcomeStatus::Ok,
                detail: None,
                records: artifacts.len(),
                stats,
                skips,
                size_skipped,
                duration_ms,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::collector::{Collection, MockCollector};
    use crate::models::{ArtifactType, CollectorDescriptor, RawRecord};
    use std::path::Path;

    fn mock(name: &'static str, detected: bool) -> MockCollector {
        let mut collector = MockCollector::new();
        collector.expect_name().return_const(name);
        collector
            .expect_descriptor()
            .returning(move || CollectorDescriptor::new(name, &[], vec![]));
        collector.expect_detect().return_const(detected);
        collector
    }

    fn runner(collectors: Vec<Box<dyn Collector>>, workers: usize) -> Runner {
        Runner::new(
            Registry::new(collectors),
            Normalizer::default(),
            CollectContext::default(),
            RunOptions { workers, cancel: CancelToken::new() },
        )
    }

    struct Panicking;

    impl Collector for Panicking {
        fn name(&self) -> &'static str {
            "panics"
        }

        fn descriptor(&self) -> CollectorDescriptor {
            CollectorDescriptor::new("panics", &[], vec![])
        }

        fn detect(&self) -> bool {
            true
        }

        fn collect(&self, _ctx: &CollectContext) -> anyhow::Result<Collection> {
            panic!("bad state")
        }
    }

    fn one_record(name: &str) -> Collection {
        let mut collection = Collection::new(name);
        collection.push(RawRecord::new(ArtifactType::HistoryEntry, Path::new("/h")).text(format!("{name} entry")));
        collection
    }

    #[test]
    fn test_undetected_collector_is_never_collected() {
        let mut absent = mock("absent", false);
        absent.expect_collect().never();

        let mut store = Store::open_in_memory().unwrap();
        let run = runner(vec![Box::new(absent)], 1).run(&mut store, "h", "u").unwrap();
        assert_eq!(run.outcomes[0].status, OutcomeStatus::Skipped);
        assert_eq!(run.outcomes[0].detail.as_deref(), Some(NOT_DETECTED));
        assert_eq!(run.status, RunStatus::Success);
    }

    #[test]
    fn test_failures_are_isolated() {
        let mut broken = mock("broken", true);
        broken.expect_collect().returning(|_| Err(anyhow::anyhow!("boom")));
        let mut healthy = mock("healthy", true);
        healthy.expect_collect().times(1).returning(|_| Ok(one_record("healthy")));

        let mut store = Store::open_in_memory().unwrap();
        let run = runner(vec![Box::new(broken), Box::new(Panicking), Box::new(healthy)], 1)
            .run(&mut store, "h", "u")
            .unwrap();

        assert_eq!(run.status, RunStatus::Partial);
        assert_eq!(run.outcome("broken").unwrap().status, OutcomeStatus::Error);
        assert_eq!(run.outcome("panics").unwrap().status, OutcomeStatus::Error);
        let healthy = run.outcome("healthy").unwrap();
        assert_eq!(healthy.status, OutcomeStatus::Ok);
        assert_eq!(healthy.stats.inserted, 1);
    }

    #[test]
    fn test_parallel_keeps_registry_order() {
        let collectors: Vec<Box<dyn Collector>> = ["a", "b", "c", "d"]
            .into_iter()
            .map(|name| {
                let mut c = mock(name, true);
                c.expect_collect().returning(move |_| Ok(one_record(name)));
                Box::new(c) as Box<dyn Collector>
            })
            .collect();

        let mut store = Store::open_in_memory().unwrap();
        let run = runner(collectors, 4).run(&mut store, "h", "u").unwrap();
        let names: Vec<_> = run.outcomes.iter().map(|o| o.collector.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c", "d"]);
        assert_eq!(run.totals.inserted, 4);
    }

    #[test]
    fn test_cancelled_before_start() {
        let mut present = mock("present", true);
        present.expect_collect().never();

        let runner = runner(vec![Box::new(present)], 1);
        runner.cancel_token().cancel();
        let mut store = Store::open_in_memory().unwrap();
        let run = runner.run(&mut store, "h", "u").unwrap();
        assert_eq!(run.outcomes[0].detail.as_deref(), Some(CANCELLED));
        assert_eq!(run.status, RunStatus::Partial);
    }

    #[test]
    fn test_dry_run_only_detects() {
        let mut present = mock("present", true);
        present.expect_collect().never();
        let mut absent = mock("absent", false);
        absent.expect_collect().never();

        let report = runner(vec![Box::new(present), Box::new(absent)], 1).dry_run();
        assert_eq!(report.present_count(), 1);
        assert_eq!(report.as_map()["absent"], false);
    }
}
