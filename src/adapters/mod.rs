//! Format adapters shared by collectors.
//!
//! Every adapter takes the path and a [`ReadPolicy`] explicitly and keeps no
//! state between calls. All of them run [`crate::security::inspect_candidate`]
//! before touching file contents, so the size cap, credential classification
//! and symlink refusal apply uniformly.

pub mod files;
pub mod leveldb;
pub mod logscan;
pub mod plist;
pub mod sqlite;

use crate::config::{CollectionConfig, Limits};
use crate::security::CredentialClassifier;

pub use files::{file_facts, parse_json_prefix, read_bounded, read_json, read_jsonl, read_text, BoundedRead, JsonLines};
pub use leveldb::{leveldb_samples, printable_strings};
pub use logscan::{scan_log, LogLine, LogScan};
pub use self::plist::{plist_to_json, read_plist};
pub use sqlite::SourceDb;

/// Read bounds and credential policy handed to every adapter call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadPolicy {
    pub limits: Limits,
    pub credentials: CredentialClassifier,
}

impl ReadPolicy {
    pub fn new(limits: Limits, credentials: CredentialClassifier) -> Self {
        Self { limits, credentials }
    }

    pub fn from_config(config: &CollectionConfig) -> Self {
        Self {
            limits: config.limits.clone(),
            credentials: CredentialClassifier::from_config(config),
        }
    }

    pub fn max_file_bytes(&self) -> u64 {
        self.limits.max_file_bytes
    }
}
