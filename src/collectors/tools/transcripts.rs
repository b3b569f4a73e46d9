//! JSONL transcript parsing shared by the Claude Code and Codex CLIs.
//!
//! Both tools keep a flat `history.jsonl` of prompts and one JSONL file per
//! session. Field names differ slightly between tools and releases, so each
//! field is looked up under all known spellings.

use std::path::Path;

use serde_json::Value;

use crate::adapters::read_jsonl;
use crate::collectors::collector::{CollectContext, Collection};
use crate::collectors::tools::common::{field, message_text, str_field};
use crate::models::{meta_keys, ArtifactType, RawRecord, RawTimestamp};

const ROLES: &[&str] = &["user", "assistant", "system"];

/// Parse a prompt history file. Returns the number of records added.
pub fn collect_history(path: &Path, ctx: &CollectContext, collection: &mut Collection) -> usize {
    let Some(lines) = collection.absorb(ctx, read_jsonl(path, &ctx.policy)) else {
        return 0;
    };
    collection.count_format_errors(lines.malformed);

    let mut added = 0;
    for (line_no, entry) in lines.records {
        let Some(text) = str_field(&entry, &["display", "prompt", "text"]) else {
            collection.count_format_errors(1);
            continue;
        };
        let timestamp = field(&entry, &["timestamp", "ts"])
            .map(RawTimestamp::from_json)
            .unwrap_or_default();

        let mut record = RawRecord::new(ArtifactType::HistoryEntry, path)
            .timestamp(timestamp)
            .text(text)
            .meta(meta_keys::SESSION_ID, str_field(&entry, &["sessionId", "session_id"]))
            .meta("project", str_field(&entry, &["project", "cwd"]))
            .meta("line", line_no)
            .facts(Some(lines.facts.clone()));
        if let Some(session) = str_field(&entry, &["sessionId", "session_id"]) {
            record = record.title(format!("Prompt in session {session}"));
        }
        collection.push(record);
        added += 1;
    }
    added
}

/// Parse one session transcript. Returns the number of messages added.
pub fn collect_session(path: &Path, ctx: &CollectContext, collection: &mut Collection) -> usize {
    let Some(lines) = collection.absorb(ctx, read_jsonl(path, &ctx.policy)) else {
        return 0;
    };
    collection.count_format_errors(lines.malformed);

    let file_session = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut added = 0;
    for (line_no, entry) in lines.records {
        let message = field(&entry, &["message", "payload"])
            .filter(|m| m.is_object())
            .unwrap_or(&entry);
        let Some(role) = role_of(&entry, message) else {
            continue;
        };

        let text = message_text(message.get("content").unwrap_or(&Value::Null));
        if text.trim().is_empty() {
            continue;
        }

        let session = str_field(&entry, &["sessionId", "session_id"]).unwrap_or_else(|| file_session.clone());
        let timestamp = field(&entry, &["timestamp", "ts"])
            .or_else(|| message.get("timestamp"))
            .map(RawTimestamp::from_json)
            .unwrap_or_default();
        let key = str_field(&entry, &["uuid", "id"])
            .or_else(|| str_field(message, &["id"]))
            .unwrap_or_else(|| format!("{session}:{line_no}"));

        collection.push(
            RawRecord::new(ArtifactType::ConversationMessage, path)
                .timestamp(timestamp)
                .title(format!("{role} message"))
                .text(text)
                .meta(meta_keys::ROLE, role)
                .meta(meta_keys::SESSION_ID, session)
                .meta(meta_keys::MODEL, str_field(message, &["model"]))
                .meta("cwd", str_field(&entry, &["cwd"]))
                .meta("git_branch", str_field(&entry, &["gitBranch"]))
                .record_key(key)
                .facts(Some(lines.facts.clone())),
        );
        added += 1;
    }
    added
}

fn role_of(entry: &Value, message: &Value) -> Option<&'static str> {
    [entry.get("type"), entry.get("role"), message.get("role")]
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .find_map(|r| ROLES.iter().copied().find(|known| *known == r))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_claude_style_session() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("abc-123.jsonl");
        fs::write(
            &path,
            concat!(
                r#"{"type":"user","uuid":"u1","timestamp":"2025-01-02T03:04:05Z","message":{"role":"user","content":"hello"}}"#, "\n",
                r#"{"type":"assistant","uuid":"u2","message":{"role":"assistant","model":"claude-sonnet-4","content":[{"type":"text","text":"hi there"}]}}"#, "\n",
                r#"{"type":"summary","summary":"greeting"}"#, "\n",
                "garbage\n",
            ),
        )
        .unwrap();

        let ctx = CollectContext::default();
        let mut collection = Collection::new("claude_code");
        assert_eq!(collect_session(&path, &ctx, &mut collection), 2);
        assert_eq!(collection.skips().format_errors, 1);

        let records = collection.records();
        assert_eq!(records[0].record_key.as_deref(), Some("u1"));
        assert_eq!(records[0].metadata[meta_keys::SESSION_ID], "abc-123");
        assert_eq!(records[1].metadata[meta_keys::MODEL], "claude-sonnet-4");
        assert_eq!(records[1].text.as_deref(), Some("hi there"));
    }

    #[test]
    fn test_codex_style_session() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rollout-1.jsonl");
        fs::write(
            &path,
            r#"{"timestamp":"2025-05-01T10:00:00Z","type":"response_item","payload":{"type":"message","role":"user","content":[{"type":"input_text","text":"fix the bug"}]}}"#,
        )
        .unwrap();

        let ctx = CollectContext::default();
        let mut collection = Collection::new("codex");
        assert_eq!(collect_session(&path, &ctx, &mut collection), 1);
        let record = &collection.records()[0];
        assert_eq!(record.metadata[meta_keys::ROLE], "user");
        assert_eq!(record.record_key.as_deref(), Some("rollout-1:1"));
    }

    #[test]
    fn test_history_entries() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.jsonl");
        fs::write(
            &path,
            concat!(
                r#"{"display":"/init","timestamp":1736000000000,"project":"/src/app","sessionId":"s1"}"#, "\n",
                r#"{"session_id":"s2","ts":1736000000,"text":"explain lifetimes"}"#, "\n",
                r#"{"nothing":"useful"}"#, "\n",
            ),
        )
        .unwrap();

        let ctx = CollectContext::default();
        let mut collection = Collection::new("codex");
        assert_eq!(collect_history(&path, &ctx, &mut collection), 2);
        assert_eq!(collection.skips().format_errors, 1);
        assert_eq!(collection.records()[0].timestamp, RawTimestamp::Auto(1736000000000.0));
        assert_eq!(collection.records()[0].metadata["project"], "/src/app");
        assert!(!collection.records()[1].metadata.contains_key("project"));
    }
}
