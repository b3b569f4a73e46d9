//! Global constants for the aift collector.
//!
//! This module centralizes all hardcoded values to improve maintainability
//! and make configuration changes easier. Values that users may want to tune
//! are mirrored as defaults in [`crate::config::Limits`].

// File size and read bounds
/// Default per-file size cap (50MB). Files above it are skipped wholesale.
pub const DEFAULT_MAX_FILE_BYTES: u64 = 50 * 1024 * 1024;

/// Default maximum length of a single log line considered by the keyword scanner (64KB)
pub const DEFAULT_MAX_LINE_BYTES: usize = 64 * 1024;

/// Default buffer size for hashing and streaming reads (1MB)
pub const DEFAULT_BUFFER_SIZE: usize = 1024 * 1024;

/// Default directory depth for generic log walks
pub const DEFAULT_MAX_WALK_DEPTH: usize = 3;

/// Default number of candidate files a single collector will examine
pub const DEFAULT_MAX_FILES_PER_COLLECTOR: usize = 5000;

// Embedded database constants
/// Default busy timeout for read-only source databases (milliseconds)
pub const DEFAULT_DB_BUSY_TIMEOUT_MS: u64 = 2000;

/// Default retry attempts for a locked source database
pub const DEFAULT_DB_LOCK_RETRIES: u32 = 3;

/// Delay between retries of a locked source database (milliseconds)
pub const DB_LOCK_RETRY_DELAY_MS: u64 = 250;

/// Busy timeout for the evidence store itself (milliseconds)
pub const STORE_BUSY_TIMEOUT_MS: u64 = 5000;

// Preview and normalization constants
/// Maximum characters kept in `content_preview`
pub const CONTENT_PREVIEW_MAX_CHARS: usize = 500;

/// Maximum characters kept in an artifact title
pub const TITLE_MAX_CHARS: usize = 200;

/// Suffix appended to a truncated preview
pub const TRUNCATION_SUFFIX: &str = "...";

/// Fixed marker that replaces every redacted value
pub const REDACTION_MARKER: &str = "[REDACTED]";

/// Rough characters-per-token ratio for token estimates
pub const CHARS_PER_TOKEN: usize = 4;

/// Minimum printable run extracted from LevelDB files
pub const LEVELDB_MIN_STRING_LEN: usize = 20;

/// Maximum sample strings retained per LevelDB summary
pub const LEVELDB_MAX_SAMPLES: usize = 25;

/// Maximum keyword matches kept from a single log file
pub const LOG_MAX_MATCHES_PER_FILE: usize = 200;

// Epoch offsets (seconds between the foreign epoch and the Unix epoch)
/// Browser (WebKit/Chromium) epoch: 1601-01-01T00:00:00Z
pub const CHROME_EPOCH_OFFSET_SECS: i64 = 11_644_473_600;

/// Cocoa/Core Data epoch: 2001-01-01T00:00:00Z
pub const COCOA_EPOCH_OFFSET_SECS: i64 = 978_307_200;

// Store location
/// Store directory created under the user's home
pub const DEFAULT_STORE_DIR: &str = ".ai-forensics";

/// Store file name
pub const DEFAULT_STORE_FILE: &str = "aift.db";

/// Permissions applied to the store directory on Unix
pub const STORE_DIR_MODE: u32 = 0o700;

/// Default page size for read-path queries
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Hard upper bound for a read-path page
pub const MAX_PAGE_SIZE: usize = 1000;

// Common file extensions
pub const LOG_FILE_EXTENSIONS: &[&str] = &["log", "txt", "jsonl", "json"];
pub const LEVELDB_FILE_EXTENSIONS: &[&str] = &["log", "ldb"];

// Default file names
pub const DEFAULT_CONFIG_NAME: &str = "aift.yaml";
pub const DEFAULT_EXPORT_NAME: &str = "aift_export.jsonl";

// Runner
/// Upper bound on collector worker threads
pub const MAX_WORKER_THREADS: usize = 32;
