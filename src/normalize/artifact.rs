//! The single constructor turning a [`RawRecord`] into an [`Artifact`].
//!
//! Nothing reaches the store without passing through [`Normalizer::build`],
//! which orders the steps so that redaction always happens before any value
//! is truncated, fingerprinted or copied into metadata.

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use uuid::Uuid;

use crate::constants::{CONTENT_PREVIEW_MAX_CHARS, TITLE_MAX_CHARS};
use crate::models::{meta_keys, Artifact, ArtifactType, Metadata, RawRecord};
use crate::normalize::text::{bounded_preview, estimate_tokens};
use crate::normalize::timestamp::{normalize_timestamp, to_canonical};
use crate::security::Redactor;
use crate::utils::hash::sha256_bytes;

lazy_static! {
    static ref MODEL_NAME: Regex = Regex::new(
        r"(?i)\b(claude-[a-z0-9][a-z0-9.\-]*|gpt-[a-z0-9][a-z0-9.\-]*|o[1-9](?:-(?:mini|preview|pro))?|gemini-[a-z0-9][a-z0-9.\-]*|llama-?[0-9][a-z0-9.\-]*|mistral-[a-z0-9][a-z0-9.\-]*|command-r[a-z0-9.\-+]*)\b"
    )
    .unwrap();
}

/// Field separator inside the fingerprint input.
const FINGERPRINT_SEP: char = '\u{1f}';

/// Builds artifacts for one run.
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    redactor: Redactor,
}

impl Normalizer {
    pub fn new(redactor: Redactor) -> Self {
        Self { redactor }
    }

    pub fn redactor(&self) -> &Redactor {
        &self.redactor
    }

    /// Normalize, redact and fingerprint a raw record.
    pub fn build(&self, record: RawRecord, run_id: &str, collected_at: DateTime<Utc>) -> Artifact {
        let RawRecord {
            source,
            origin,
            artifact_type,
            timestamp,
            title,
            text,
            structured,
            mut metadata,
            record_key,
            facts,
        } = record;

        let mut credential_detected = artifact_type == ArtifactType::CredentialFile;
        let mut labels = std::collections::BTreeSet::new();

        let canonical_ts = normalize_timestamp(&timestamp);
        if canonical_ts.is_none() {
            if let Some(raw) = timestamp.describe() {
                metadata.insert(meta_keys::RAW_TIMESTAMP.to_string(), Value::String(raw));
            }
        }

        let mut parts: Vec<String> = Vec::new();
        if let Some(text) = text.as_deref().filter(|t| !t.trim().is_empty()) {
            let scan = self.redactor.scan(text);
            labels.extend(scan.labels);
            parts.push(scan.text);
        }
        let mut dropped_keys: Vec<String> = Vec::new();
        if let Some(value) = structured.as_ref().filter(|v| !v.is_null()) {
            let redaction = self.redactor.redact_value(value);
            labels.extend(redaction.labels);
            dropped_keys.extend(redaction.dropped_keys);
            parts.push(flatten_value(&redaction.value));
        }
        let content = parts.join("\n");

        let meta_redaction = self.redactor.redact_value(&Value::Object(metadata.into_iter().collect()));
        labels.extend(meta_redaction.labels);
        dropped_keys.extend(meta_redaction.dropped_keys);
        let mut metadata: Metadata = match meta_redaction.value {
            Value::Object(map) => map.into_iter().collect(),
            _ => Metadata::new(),
        };

        let title = title.map(|t| {
            let scan = self.redactor.scan(&t);
            labels.extend(scan.labels);
            bounded_preview(&self.redactor, &scan.text, TITLE_MAX_CHARS)
        });

        if !labels.is_empty() || !dropped_keys.is_empty() {
            credential_detected = true;
        }
        if !labels.is_empty() {
            metadata.insert(
                meta_keys::REDACTION_LABELS.to_string(),
                Value::from(labels.iter().copied().collect::<Vec<_>>()),
            );
        }
        if !dropped_keys.is_empty() {
            dropped_keys.sort();
            dropped_keys.dedup();
            metadata.insert(meta_keys::REDACTED_KEYS.to_string(), Value::from(dropped_keys));
        }

        if !content.is_empty() && !metadata.contains_key(meta_keys::TOKEN_ESTIMATE) {
            metadata.insert(meta_keys::TOKEN_ESTIMATE.to_string(), Value::from(estimate_tokens(&content)));
        }
        if !metadata.contains_key(meta_keys::MODEL) {
            if let Some(model) = detect_model(&content) {
                metadata.insert(meta_keys::MODEL.to_string(), Value::String(model));
            }
        }

        let content_preview = if content.is_empty() {
            title.clone().unwrap_or_default()
        } else {
            bounded_preview(&self.redactor, &content, CONTENT_PREVIEW_MAX_CHARS)
        };

        let fingerprint = fingerprint(artifact_type, record_key.as_deref(), canonical_ts.as_ref(), &content);
        let facts = facts.unwrap_or_default();

        Artifact {
            id: Uuid::new_v4().to_string(),
            source,
            artifact_type,
            timestamp: canonical_ts,
            title,
            content_preview,
            file_path: origin.to_string_lossy().into_owned(),
            file_hash: facts.sha256,
            file_size: Some(facts.size).filter(|s| *s > 0),
            file_modified: facts.modified,
            fingerprint,
            record_key,
            version: 1,
            credential_detected,
            metadata,
            collected_at,
            run_id: run_id.to_string(),
        }
    }
}

/// Content fingerprint over already-redacted inputs.
pub fn fingerprint(
    artifact_type: ArtifactType,
    record_key: Option<&str>,
    timestamp: Option<&DateTime<Utc>>,
    redacted_content: &str,
) -> String {
    let mut input = String::with_capacity(redacted_content.len() + 96);
    input.push_str(artifact_type.as_str());
    input.push(FINGERPRINT_SEP);
    input.push_str(record_key.unwrap_or_default());
    input.push(FINGERPRINT_SEP);
    if let Some(ts) = timestamp {
        input.push_str(&to_canonical(ts));
    }
    input.push(FINGERPRINT_SEP);
    input.push_str(redacted_content);
    sha256_bytes(input.as_bytes())
}

/// First model identifier mentioned in `text`, lowercased.
pub fn detect_model(text: &str) -> Option<String> {
    MODEL_NAME
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim_end_matches(['.', '-']).to_lowercase())
}

/// Strings stay bare; everything else is compact JSON.
fn flatten_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
