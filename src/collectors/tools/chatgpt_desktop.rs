//! ChatGPT macOS app (`~/Library/Group Containers/group.com.openai.chat`).
//!
//! Conversation `.data` files are encrypted by the app, so only file facts
//! and a digest are recorded. Preferences come from the app's plist.

use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::{DateTime, Utc};
use log::debug;
use serde_json::{json, Value};

use crate::adapters::{file_facts, read_plist};
use crate::collectors::collector::{CollectContext, Collection, Collector};
use crate::collectors::tools::common::{has_extension, relative_to, root_present, usable_root, walk_files};
use crate::error::SourceError;
use crate::models::{ArtifactType, Capability, CollectorDescriptor, FileFacts, RawRecord};
use crate::security::inspect_candidate;
use crate::utils::hash::calculate_sha256;

const PLIST_NAME: &str = "com.openai.chat.plist";

/// `conversations-v3-<account>/<id>.data` plus a couple of wrapper levels.
const DATA_DEPTH: usize = 6;

pub struct ChatGptDesktopCollector {
    root: PathBuf,
}

impl ChatGptDesktopCollector {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn plist_candidates(&self) -> [PathBuf; 2] {
        [
            self.root.join(PLIST_NAME),
            self.root.join("Library").join("Preferences").join(PLIST_NAME),
        ]
    }

    fn collect_encrypted(&self, ctx: &CollectContext, collection: &mut Collection) {
        let files = walk_files(
            &self.root,
            DATA_DEPTH,
            ctx.policy.limits.max_files_per_collector,
            ctx,
            collection,
            |p| has_extension(p, "data"),
        );

        let mut seen: Vec<(String, FileFacts)> = Vec::new();
        for path in &files {
            let Some(facts) = collection.absorb(ctx, encrypted_facts(path, ctx)) else {
                continue;
            };
            let name = relative_to(path, &self.root);
            collection.push(
                RawRecord::new(ArtifactType::EncryptedConversation, path)
                    .title(format!("Encrypted conversation file {name} ({} bytes)", facts.size))
                    .meta("content_accessible", false)
                    .meta("size_bytes", facts.size)
                    .record_key(name.clone())
                    .facts(Some(facts.clone())),
            );
            seen.push((name, facts));
        }
        debug!("[chatgpt_desktop] {} encrypted data files", seen.len());

        if seen.is_empty() {
            return;
        }

        seen.sort_by_key(|(_, facts)| facts.modified);
        let total: u64 = seen.iter().map(|(_, f)| f.size).sum();
        let describe = |entry: Option<&(String, FileFacts)>| -> Value {
            entry
                .map(|(name, facts)| {
                    json!({
                        "name": name,
                        "size_bytes": facts.size,
                        "modified": facts.modified.map(|m: DateTime<Utc>| m.to_rfc3339()),
                    })
                })
                .unwrap_or(Value::Null)
        };

        collection.push(
            RawRecord::new(ArtifactType::EncryptedConversation, &self.root)
                .title(format!(
                    "ChatGPT: {} encrypted .data files, {:.1} MB total",
                    seen.len(),
                    total as f64 / (1024.0 * 1024.0)
                ))
                .meta("file_count", seen.len())
                .meta("total_size_bytes", total)
                .meta("content_accessible", false)
                .meta("oldest_file", describe(seen.first()))
                .meta("newest_file", describe(seen.last()))
                .record_key("encrypted_summary"),
        );
    }

    fn collect_preferences(&self, ctx: &CollectContext, collection: &mut Collection) {
        for path in self.plist_candidates() {
            if !root_present(&path) {
                continue;
            }
            let Some((value, facts)) = collection.absorb(ctx, read_plist(&path, &ctx.policy)) else {
                continue;
            };
            let keys: Vec<String> = value
                .as_object()
                .map(|o| o.keys().cloned().collect())
                .unwrap_or_default();

            collection.push(
                RawRecord::new(ArtifactType::Preferences, &path)
                    .title("ChatGPT app preferences")
                    .structured(value)
                    .meta("plist_key_count", keys.len())
                    .meta("plist_keys", keys)
                    .record_key(relative_to(&path, &self.root))
                    .facts(Some(facts)),
            );
        }
    }
}

/// Size-checked facts and digest for a file whose content is never parsed.
fn encrypted_facts(path: &Path, ctx: &CollectContext) -> Result<FileFacts, SourceError> {
    let metadata = inspect_candidate(path, &ctx.policy.credentials, ctx.policy.max_file_bytes())?;
    let sha256 = calculate_sha256(path, ctx.policy.max_file_bytes())
        .map_err(|e| SourceError::read(path, e))?;
    Ok(file_facts(&metadata, sha256))
}

impl Collector for ChatGptDesktopCollector {
    fn name(&self) -> &'static str {
        "chatgpt_desktop"
    }

    fn descriptor(&self) -> CollectorDescriptor {
        CollectorDescriptor::new(
            self.name(),
            &[Capability::FileMetadata, Capability::PropertyList],
            vec![self.root.clone()],
        )
    }

    fn detect(&self) -> bool {
        root_present(&self.root)
    }

    fn collect(&self, ctx: &CollectContext) -> Result<Collection> {
        let mut collection = Collection::new(self.name());
        if !usable_root(&self.root, ctx, &mut collection) {
            return Ok(collection);
        }

        self.collect_encrypted(ctx, &mut collection);
        self.collect_preferences(ctx, &mut collection);
        Ok(collection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_encrypted_files_and_preferences() {
        let dir = TempDir::new().unwrap();
        let conversations = dir.path().join("conversations-v3-abc");
        fs::create_dir_all(&conversations).unwrap();
        fs::write(conversations.join("one.data"), [0u8, 1, 2, 3]).unwrap();
        fs::write(conversations.join("two.data"), [9u8; 16]).unwrap();

        let mut prefs = plist::Dictionary::new();
        prefs.insert("lastModel".into(), plist::Value::String("gpt-4o".into()));
        plist::Value::Dictionary(prefs)
            .to_file_xml(dir.path().join(PLIST_NAME))
            .unwrap();

        let collector = ChatGptDesktopCollector::new(dir.path().to_path_buf());
        assert!(collector.detect());
        let collection = collector.collect(&CollectContext::default()).unwrap();

        let encrypted: Vec<&RawRecord> = collection
            .records()
            .iter()
            .filter(|r| r.artifact_type == ArtifactType::EncryptedConversation)
            .collect();
        assert_eq!(encrypted.len(), 3);
        assert!(encrypted
            .iter()
            .filter(|r| r.record_key.as_deref() != Some("encrypted_summary"))
            .all(|r| r.facts.as_ref().unwrap().sha256.is_some() && r.text.is_none()));

        let summary = encrypted
            .iter()
            .find(|r| r.record_key.as_deref() == Some("encrypted_summary"))
            .unwrap();
        assert_eq!(summary.metadata["file_count"], 2);
        assert_eq!(summary.metadata["total_size_bytes"], 20);

        let prefs = collection
            .records()
            .iter()
            .find(|r| r.artifact_type == ArtifactType::Preferences)
            .unwrap();
        assert_eq!(prefs.structured.as_ref().unwrap()["lastModel"], "gpt-4o");
    }
}
