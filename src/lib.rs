//! # aift-collector
//!
//! A forensic evidence collector for AI tool usage on a single host.
//!
//! ## Overview
//!
//! AI coding agents, desktop chat clients, browsers and local model runners
//! each leave evidence in their own undocumented formats. aift-collector
//! reads those sources strictly read-only, normalizes every record into one
//! [`models::Artifact`] shape, strips credential material, and stores the
//! result in a single SQLite evidence store that can be re-collected
//! incrementally.
//!
//! ## Features
//!
//! - **Read-only extraction**: bounded reads, read-only SQLite, symlinks never followed
//! - **Redaction**: no credential value ever reaches the store, logs or exports
//! - **Idempotent re-collection**: unchanged records add no rows, changed ones are versioned
//! - **Failure isolation**: one broken source never aborts a run
//! - **Run tracking**: every run records per-collector outcomes and skipped files
//!
//! ## Usage
//!
//! ```no_run
//! use aift_collector::collectors::Runner;
//! use aift_collector::config::load_or_create_config;
//! use aift_collector::storage::{ArtifactQuery, Store};
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = load_or_create_config(None)?;
//! let mut store = Store::open(&config.store_path())?;
//!
//! let run = Runner::from_config(&config).run(&mut store, "workstation-01", "analyst")?;
//! println!("{} new records", run.totals.new_rows());
//!
//! let page = store.query(&ArtifactQuery::search("kubernetes"))?;
//! for artifact in page.artifacts {
//!     println!("{} {}", artifact.source, artifact.content_preview);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Organization
//!
//! - [`cli`]: Command-line interface definitions and argument parsing
//! - [`models`]: Core data models and structures
//! - [`adapters`]: Bounded, read-only format readers
//! - [`collectors`]: Collector contract, registry, runner and per-tool collectors
//! - [`normalize`]: Timestamp, text and artifact normalization
//! - [`storage`]: SQLite evidence store
//! - [`config`]: Configuration management
//! - [`security`]: Redaction engine, credential-file classification, path checks
//! - [`utils`]: Hashing, run summaries and exports
//! - [`constants`]: Application-wide constants
//! - [`error`]: Error taxonomy

/// Command-line interface definitions and argument parsing
pub mod cli;

/// Core data models and structures used throughout the application
pub mod models;

/// Error taxonomy
pub mod error;

/// Bounded, read-only readers for source formats
pub mod adapters;

/// Collector contract, registry, runner and per-tool collectors
pub mod collectors;

/// Timestamp, text and artifact normalization
pub mod normalize;

/// SQLite evidence store
pub mod storage;

/// Utility functions for hashing, summaries and export
pub mod utils;

/// Configuration management
pub mod config;

/// Application constants and configuration values
pub mod constants;

/// Security utilities for redaction and credential protection
pub mod security;

/// Test utilities and helpers
#[cfg(test)]
pub mod test_utils;
