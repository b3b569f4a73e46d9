//! Evidence collectors and the run orchestration around them.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │                 Runner                  │
//! │   detect → collect → normalize → store  │
//! ├─────────────────────────────────────────┤
//! │            Registry (ordered)           │
//! ├─────────────────────────────────────────┤
//! │             Tool Collectors             │
//! │  ┌─────────┬──────────┬──────────┐      │
//! │  │ Coding  │ Browsers │ Desktop  │      │
//! │  │ agents  │          │ apps     │      │
//! │  └─────────┴──────────┴──────────┘      │
//! ├─────────────────────────────────────────┤
//! │     Format adapters (JSON, SQLite,      │
//! │     plist, LevelDB, log scan)           │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Usage Example
//!
//! ```no_run
//! use aift_collector::collectors::runner::Runner;
//! use aift_collector::config::CollectionConfig;
//! use aift_collector::storage::Store;
//! use std::path::Path;
//!
//! # fn example() -> anyhow::Result<()> {
//! let config = CollectionConfig::default();
//! let mut store = Store::open(Path::new("/tmp/aift.db"))?;
//!
//! let run = Runner::from_config(&config).run(&mut store, "host", "analyst")?;
//! println!("Collected {} records", run.total_records());
//! # Ok(())
//! # }
//! ```

/// Collector trait and per-collector result bookkeeping
pub mod collector;

/// Permission error tracking and reporting
pub mod permission_tracker;

/// Ordered set of built-in collectors
pub mod registry;

/// Run orchestration: isolation, commits, dry runs
pub mod runner;

/// One collector per AI tool or source family
pub mod tools;

pub use collector::{CollectContext, Collection, Collector};
pub use registry::Registry;
pub use runner::{CancelToken, RunOptions, Runner};
