//! The collector contract.
//!
//! A collector answers two questions about one AI tool: is it present
//! ([`Collector::detect`]) and what evidence does it hold
//! ([`Collector::collect`]). Item-level failures never escape `collect`;
//! they are recorded on the returned [`Collection`] and the collector moves
//! on to the next candidate.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::debug;

use crate::adapters::ReadPolicy;
use crate::collectors::permission_tracker::PermissionTracker;
use crate::error::SourceError;
use crate::models::{ArtifactType, CollectorDescriptor, FileFacts, RawRecord, SkipCounts};
use crate::security::scrub;

/// Shared, read-only inputs handed to every `collect` call.
#[derive(Debug, Clone, Default)]
pub struct CollectContext {
    pub policy: ReadPolicy,
    pub permissions: PermissionTracker,
}

impl CollectContext {
    pub fn new(policy: ReadPolicy, permissions: PermissionTracker) -> Self {
        Self { policy, permissions }
    }
}

/// One AI tool, browser or runtime that leaves evidence on disk.
///
/// `detect` must be cheap and must not open file contents. The runner never
/// calls `collect` when `detect` returned false.
#[cfg_attr(test, mockall::automock)]
pub trait Collector: Send + Sync {
    fn name(&self) -> &'static str;

    fn descriptor(&self) -> CollectorDescriptor;

    fn detect(&self) -> bool;

    fn collect(&self, ctx: &CollectContext) -> anyhow::Result<Collection>;
}

/// Raw records plus the bookkeeping of everything that was skipped.
#[derive(Debug, Clone, Default)]
pub struct Collection {
    source: String,
    records: Vec<RawRecord>,
    skips: SkipCounts,
    size_skipped: Vec<String>,
    flagged: HashSet<PathBuf>,
}

impl Collection {
    pub fn new(source: &str) -> Self {
        Self {
            source: source.to_string(),
            ..Default::default()
        }
    }

    /// Tag a record with this collection's source and keep it.
    pub fn push(&mut self, mut record: RawRecord) {
        record.source = self.source.clone();
        self.records.push(record);
    }

    /// Unwrap an item result, recording the error when there is one.
    pub fn absorb<T>(&mut self, ctx: &CollectContext, result: Result<T, SourceError>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                self.skip(ctx, err);
                None
            }
        }
    }

    /// Classify and count an item-level error.
    ///
    /// Credential files become an existence-only record.
    pub fn skip(&mut self, ctx: &CollectContext, err: SourceError) {
        if err.is_permission_denied() {
            ctx.permissions
                .record_permission_failure(&err.path().to_string_lossy());
        }
        debug!("[{}] skipped: {}", self.source, scrub(&err.to_string()));

        match err {
            SourceError::Read { .. } | SourceError::Locked { .. } | SourceError::Corrupt { .. } => {
                self.skips.read_errors += 1
            }
            SourceError::Format { .. } => self.skips.format_errors += 1,
            SourceError::SizeLimitExceeded { path, .. } => {
                self.skips.size_limited += 1;
                self.size_skipped.push(path.to_string_lossy().into_owned());
            }
            SourceError::SymlinkSkipped { .. } => self.skips.symlinks += 1,
            SourceError::CredentialFileSkipped { path } => self.flag_credential_file(ctx, &path),
        }
    }

    /// Count records that failed to parse inside an otherwise readable source.
    pub fn count_format_errors(&mut self, count: usize) {
        self.skips.format_errors += count;
    }

    /// Record that a credential file exists without reading any of it.
    pub fn flag_credential_file(&mut self, ctx: &CollectContext, path: &Path) {
        if !self.flagged.insert(path.to_path_buf()) {
            return;
        }
        self.skips.credential_files += 1;

        let kind = ctx.policy.credentials.classify(path).map(|k| k.as_str());
        let facts = fs::symlink_metadata(path).ok().map(|m| FileFacts {
            size: m.len(),
            modified: m.modified().ok().map(DateTime::<Utc>::from),
            created: m.created().ok().map(DateTime::<Utc>::from),
            sha256: None,
        });
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());

        self.push(
            RawRecord::new(ArtifactType::CredentialFile, path)
                .title(format!("Credential file present: {name}"))
                .meta("file_kind", kind.unwrap_or("known_name"))
                .record_key(path.to_string_lossy())
                .facts(facts),
        );
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn records(&self) -> &[RawRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn skips(&self) -> &SkipCounts {
        &self.skips
    }

    pub fn size_skipped(&self) -> &[String] {
        &self.size_skipped
    }

    pub fn into_parts(self) -> (Vec<RawRecord>, SkipCounts, Vec<String>) {
        (self.records, self.skips, self.size_skipped)
    }
}
