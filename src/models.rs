//! Core data models shared by collectors, the normalizer, storage and the runner.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Ordered auxiliary fields attached to an artifact.
pub type Metadata = BTreeMap<String, Value>;

/// Well-known metadata keys.
pub mod meta_keys {
    pub const MODEL: &str = "model";
    pub const SESSION_ID: &str = "session_id";
    pub const ROLE: &str = "role";
    pub const TOKEN_ESTIMATE: &str = "token_estimate";
    pub const RAW_TIMESTAMP: &str = "raw_timestamp";
    pub const REDACTION_LABELS: &str = "redaction_labels";
    pub const REDACTED_KEYS: &str = "redacted_keys";
}

/// Closed set of evidence kinds.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactType {
    Config,
    ConversationMessage,
    Conversation,
    HistoryEntry,
    BrowserHistory,
    FileReference,
    LogMatch,
    ModelManifest,
    ModelInventory,
    Preferences,
    EncryptedConversation,
    KeyValueStore,
    Plan,
    CredentialFile,
    AiDirectory,
}

impl ArtifactType {
    pub const ALL: [ArtifactType; 15] = [
        ArtifactType::Config,
        ArtifactType::ConversationMessage,
        ArtifactType::Conversation,
        ArtifactType::HistoryEntry,
        ArtifactType::BrowserHistory,
        ArtifactType::FileReference,
        ArtifactType::LogMatch,
        ArtifactType::ModelManifest,
        ArtifactType::ModelInventory,
        ArtifactType::Preferences,
        ArtifactType::EncryptedConversation,
        ArtifactType::KeyValueStore,
        ArtifactType::Plan,
        ArtifactType::CredentialFile,
        ArtifactType::AiDirectory,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactType::Config => "config",
            ArtifactType::ConversationMessage => "conversation_message",
            ArtifactType::Conversation => "conversation",
            ArtifactType::HistoryEntry => "history_entry",
            ArtifactType::BrowserHistory => "browser_history",
            ArtifactType::FileReference => "file_reference",
            ArtifactType::LogMatch => "log_match",
            ArtifactType::ModelManifest => "model_manifest",
            ArtifactType::ModelInventory => "model_inventory",
            ArtifactType::Preferences => "preferences",
            ArtifactType::EncryptedConversation => "encrypted_conversation",
            ArtifactType::KeyValueStore => "key_value_store",
            ArtifactType::Plan => "plan",
            ArtifactType::CredentialFile => "credential_file",
            ArtifactType::AiDirectory => "ai_directory",
        }
    }
}

impl fmt::Display for ArtifactType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArtifactType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ArtifactType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown artifact type: {s}"))
    }
}

/// A timestamp exactly as the source stored it.
///
/// Collectors declare the encoding when they know it. `Auto` is for bare
/// numbers of unknown unit and is resolved by magnitude only.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RawTimestamp {
    #[default]
    Absent,
    Auto(f64),
    UnixSeconds(f64),
    UnixMillis(f64),
    UnixMicros(i64),
    /// Microseconds since 1601-01-01 (Chromium/WebKit).
    Chrome(i64),
    /// Seconds since 2001-01-01 (Cocoa/Core Data).
    Cocoa(f64),
    Text(String),
}

impl RawTimestamp {
    /// Interpret a JSON field whose unit is not documented.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Number(n) => n.as_f64().map(RawTimestamp::Auto).unwrap_or_default(),
            Value::String(s) if !s.trim().is_empty() => RawTimestamp::Text(s.clone()),
            _ => RawTimestamp::Absent,
        }
    }

    /// The original value rendered for `metadata.raw_timestamp`.
    pub fn describe(&self) -> Option<String> {
        match self {
            RawTimestamp::Absent => None,
            RawTimestamp::Auto(v) => Some(format!("{v}")),
            RawTimestamp::UnixSeconds(v) => Some(format!("unix_s:{v}")),
            RawTimestamp::UnixMillis(v) => Some(format!("unix_ms:{v}")),
            RawTimestamp::UnixMicros(v) => Some(format!("unix_us:{v}")),
            RawTimestamp::Chrome(v) => Some(format!("chrome_us:{v}")),
            RawTimestamp::Cocoa(v) => Some(format!("cocoa_s:{v}")),
            RawTimestamp::Text(s) => Some(s.clone()),
        }
    }
}

/// Filesystem facts about the file a record came from.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct FileFacts {
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
    pub created: Option<DateTime<Utc>>,
    /// SHA-256 of the bytes that were read, when the file was read at all.
    pub sha256: Option<String>,
}

/// A candidate record as it leaves a collector, before normalization.
#[derive(Debug, Clone)]
pub struct RawRecord {
    pub source: String,
    pub origin: PathBuf,
    pub artifact_type: ArtifactType,
    pub timestamp: RawTimestamp,
    pub title: Option<String>,
    pub text: Option<String>,
    pub structured: Option<Value>,
    pub metadata: Metadata,
    pub record_key: Option<String>,
    pub facts: Option<FileFacts>,
}

impl RawRecord {
    pub fn new(artifact_type: ArtifactType, origin: &Path) -> Self {
        Self {
            source: String::new(),
            origin: origin.to_path_buf(),
            artifact_type,
            timestamp: RawTimestamp::Absent,
            title: None,
            text: None,
            structured: None,
            metadata: Metadata::new(),
            record_key: None,
            facts: None,
        }
    }

    pub fn timestamp(mut self, timestamp: RawTimestamp) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn structured(mut self, value: Value) -> Self {
        self.structured = Some(value);
        self
    }

    pub fn meta(mut self, key: &str, value: impl Into<Value>) -> Self {
        let value = value.into();
        if !value.is_null() {
            self.metadata.insert(key.to_string(), value);
        }
        self
    }

    pub fn record_key(mut self, key: impl Into<String>) -> Self {
        self.record_key = Some(key.into());
        self
    }

    pub fn facts(mut self, facts: Option<FileFacts>) -> Self {
        self.facts = facts;
        self
    }
}

/// One normalized, redacted unit of evidence.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Artifact {
    pub id: String,
    pub source: String,
    pub artifact_type: ArtifactType,
    pub timestamp: Option<DateTime<Utc>>,
    pub title: Option<String>,
    pub content_preview: String,
    pub file_path: String,
    pub file_hash: Option<String>,
    pub file_size: Option<u64>,
    pub file_modified: Option<DateTime<Utc>>,
    pub fingerprint: String,
    pub record_key: Option<String>,
    pub version: u32,
    pub credential_detected: bool,
    pub metadata: Metadata,
    pub collected_at: DateTime<Utc>,
    pub run_id: String,
}

/// Lifecycle state of a collection run.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Success,
    Partial,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Success => "success",
            RunStatus::Partial => "partial",
            RunStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(RunStatus::Running),
            "success" => Some(RunStatus::Success),
            "partial" => Some(RunStatus::Partial),
            "failed" => Some(RunStatus::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one collector within a run.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Ok,
    Error,
    Skipped,
}

impl OutcomeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeStatus::Ok => "ok",
            OutcomeStatus::Error => "error",
            OutcomeStatus::Skipped => "skipped",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ok" => Some(OutcomeStatus::Ok),
            "error" => Some(OutcomeStatus::Error),
            "skipped" => Some(OutcomeStatus::Skipped),
            _ => None,
        }
    }
}

/// Item-level skips inside one collector, by error class.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct SkipCounts {
    pub read_errors: usize,
    pub format_errors: usize,
    pub size_limited: usize,
    pub credential_files: usize,
    pub symlinks: usize,
}

impl SkipCounts {
    pub fn total(&self) -> usize {
        self.read_errors + self.format_errors + self.size_limited + self.credential_files + self.symlinks
    }

    /// Skips that indicate something went wrong, as opposed to policy skips.
    pub fn failures(&self) -> usize {
        self.read_errors + self.format_errors
    }
}

/// Counts returned by an upsert batch.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertStats {
    /// Rows whose natural key was not present before, first versions only.
    pub inserted: usize,
    /// Natural keys already present; refreshed in place.
    pub unchanged: usize,
    /// New rows that supersede an earlier version of the same record key.
    pub versioned: usize,
}

impl UpsertStats {
    pub fn new_rows(&self) -> usize {
        self.inserted + self.versioned
    }

    pub fn absorb(&mut self, other: &UpsertStats) {
        self.inserted += other.inserted;
        self.unchanged += other.unchanged;
        self.versioned += other.versioned;
    }
}

/// Per-collector entry of a [`CollectionRun`].
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CollectorOutcome {
    pub collector: String,
    pub status: OutcomeStatus,
    pub detail: Option<String>,
    pub records: usize,
    pub stats: UpsertStats,
    pub skips: SkipCounts,
    pub size_skipped: Vec<String>,
    pub duration_ms: u64,
}

impl CollectorOutcome {
    pub fn skipped(collector: &str, detail: &str) -> Self {
        Self {
            collector: collector.to_string(),
            status: OutcomeStatus::Skipped,
            detail: Some(detail.to_string()),
            records: 0,
            stats: UpsertStats::default(),
            skips: SkipCounts::default(),
            size_skipped: Vec::new(),
            duration_ms: 0,
        }
    }
}

/// One execution of the collector registry.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CollectionRun {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub hostname: String,
    pub username: String,
    pub outcomes: Vec<CollectorOutcome>,
    pub totals: UpsertStats,
}

impl CollectionRun {
    pub fn total_records(&self) -> usize {
        self.outcomes.iter().map(|o| o.records).sum()
    }

    pub fn outcome(&self, collector: &str) -> Option<&CollectorOutcome> {
        self.outcomes.iter().find(|o| o.collector == collector)
    }

    pub fn size_skipped(&self) -> impl Iterator<Item = &str> {
        self.outcomes
            .iter()
            .flat_map(|o| o.size_skipped.iter().map(String::as_str))
    }
}

/// The finalized record of a run as reported to callers.
pub type RunSummary = CollectionRun;

/// Kind of source storage a collector reads.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    JsonFiles,
    JsonLines,
    EmbeddedDatabase,
    KeyValueStore,
    PropertyList,
    LogScan,
    FileMetadata,
}

/// Static description of a registered collector.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CollectorDescriptor {
    pub name: String,
    pub capabilities: Vec<Capability>,
    pub targets: Vec<PathBuf>,
}

impl CollectorDescriptor {
    pub fn new(name: &str, capabilities: &[Capability], targets: Vec<PathBuf>) -> Self {
        Self {
            name: name.to_string(),
            capabilities: capabilities.to_vec(),
            targets,
        }
    }
}

/// One line of a dry-run presence report.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PresenceEntry {
    pub name: String,
    pub present: bool,
    pub targets: Vec<PathBuf>,
}

/// Result of a detect-only pass across the registry.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct PresenceReport {
    pub entries: Vec<PresenceEntry>,
}

impl PresenceReport {
    pub fn as_map(&self) -> BTreeMap<String, bool> {
        self.entries
            .iter()
            .map(|e| (e.name.clone(), e.present))
            .collect()
    }

    pub fn present_count(&self) -> usize {
        self.entries.iter().filter(|e| e.present).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_artifact_type_round_trip_names() {
        for t in ArtifactType::ALL {
            assert_eq!(t.as_str().parse::<ArtifactType>().unwrap(), t);
            let encoded = serde_json::to_value(t).unwrap();
            assert_eq!(encoded, json!(t.as_str()));
        }
        assert!("nonsense".parse::<ArtifactType>().is_err());
    }

    #[test]
    fn test_raw_timestamp_from_json() {
        assert_eq!(RawTimestamp::from_json(&json!(1700000000)), RawTimestamp::Auto(1700000000.0));
        assert_eq!(
            RawTimestamp::from_json(&json!("2024-01-01T00:00:00Z")),
            RawTimestamp::Text("2024-01-01T00:00:00Z".to_string())
        );
        assert_eq!(RawTimestamp::from_json(&json!(null)), RawTimestamp::Absent);
        assert_eq!(RawTimestamp::from_json(&json!("  ")), RawTimestamp::Absent);
    }

    #[test]
    fn test_raw_record_meta_skips_null() {
        let record = RawRecord::new(ArtifactType::Config, Path::new("/tmp/x"))
            .meta("model", "claude-3")
            .meta("missing", Value::Null);
        assert_eq!(record.metadata.len(), 1);
    }

    #[test]
    fn test_presence_report_map() {
        let report = PresenceReport {
            entries: vec![
                PresenceEntry { name: "a".into(), present: true, targets: vec![] },
                PresenceEntry { name: "b".into(), present: false, targets: vec![] },
            ],
        };
        assert_eq!(report.present_count(), 1);
        assert_eq!(report.as_map().get("b"), Some(&false));
    }
}
