//! GPT4All desktop runner (`~/Library/Application Support/nomic.ai/GPT4All`).
//!
//! Chats are saved either as JSON under `chats/` or in `chat.sqlite`, whose
//! schema has changed between releases. Rows are read generically from the
//! first known table that has any. Weights sit in `models/` or directly in
//! the root.

use std::path::PathBuf;

use anyhow::Result;
use log::debug;
use rusqlite::types::ValueRef;
use rusqlite::{Row, ToSql};
use serde_json::{json, Map, Value};

use crate::adapters::SourceDb;
use crate::collectors::collector::{CollectContext, Collection, Collector};
use crate::collectors::tools::common::{has_extension, root_present, str_field, usable_root, walk_files};
use crate::collectors::tools::local_runner::{collect_model_directory, collect_model_files, push_conversation_file};
use crate::models::{meta_keys, ArtifactType, Capability, CollectorDescriptor, RawRecord, RawTimestamp};
use crate::security::path_guard::is_real_dir;

const CHAT_DB: &str = "chat.sqlite";
const CHATS_DIR: &str = "chats";
const MODELS_DIR: &str = "models";
/// Tried in order; the first one holding rows wins.
const CHAT_TABLES: &[&str] = &["conversations", "chats", "messages"];
const WEIGHT_EXTENSIONS: &[&str] = &["gguf", "bin"];
/// `models2.json`, `models3.json`: the downloadable model catalogue.
const CATALOGUE_PREFIX: &str = "models";

pub struct Gpt4AllCollector {
    root: PathBuf,
}

impl Gpt4AllCollector {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn collect_chat_db(&self, ctx: &CollectContext, collection: &mut Collection) {
        let path = self.root.join(CHAT_DB);
        if !root_present(&path) {
            return;
        }
        let Some(db) = collection.absorb(ctx, SourceDb::open(&path, &ctx.policy)) else {
            return;
        };

        for table in CHAT_TABLES {
            if collection.absorb(ctx, db.has_tables(&[*table])) != Some(true) {
                continue;
            }
            let limit = ctx.policy.limits.max_files_per_collector as i64;
            let rows = db.query(
                &format!("SELECT rowid AS row_number, * FROM {table} ORDER BY rowid LIMIT ?"),
                &[&limit as &dyn ToSql],
                row_to_json,
            );
            let Some(rows) = collection.absorb(ctx, rows) else {
                continue;
            };
            collection.count_format_errors(rows.malformed);
            if rows.rows.is_empty() {
                continue;
            }
            debug!("[gpt4all] {} rows in {}", rows.rows.len(), table);

            for mut row in rows.rows {
                let row_number = row
                    .as_object_mut()
                    .and_then(|m| m.remove("row_number"))
                    .unwrap_or(Value::Null);
                let text = str_field(&row, &["content", "text", "message"]).unwrap_or_default();
                let role = str_field(&row, &["role", "type"]);
                let conversation = ["conversation_id", "chat_id", "id"]
                    .iter()
                    .filter_map(|k| row.get(*k))
                    .find(|v| !v.is_null())
                    .map(|v| match v {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    });
                let timestamp = ["created_at", "timestamp", "created", "updated_at"]
                    .iter()
                    .filter_map(|k| row.get(*k))
                    .find(|v| !v.is_null())
                    .map(RawTimestamp::from_json)
                    .unwrap_or_default();

                collection.push(
                    RawRecord::new(ArtifactType::ConversationMessage, db.path())
                        .timestamp(timestamp)
                        .title(format!("GPT4All {} message", role.as_deref().unwrap_or("unknown")))
                        .text(text)
                        .meta(meta_keys::ROLE, role)
                        .meta(meta_keys::MODEL, str_field(&row, &["model", "model_id"]))
                        .meta(meta_keys::SESSION_ID, conversation)
                        .meta("source_table", *table)
                        .record_key(format!("{table}:{row_number}"))
                        .structured(row)
                        .facts(Some(db.facts().clone())),
                );
            }
            return;
        }
        debug!("[gpt4all] {} has no chat rows", path.display());
    }

    fn collect_chat_files(&self, ctx: &CollectContext, collection: &mut Collection) {
        let dir = self.root.join(CHATS_DIR);
        let files = walk_files(
            &dir,
            ctx.policy.limits.max_walk_depth,
            ctx.policy.limits.max_files_per_collector,
            ctx,
            collection,
            |p| has_extension(p, "json"),
        );
        for path in files {
            let session = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            push_conversation_file(&path, &dir, "GPT4All", &session, ctx, collection);
        }
    }

    fn collect_models(&self, ctx: &CollectContext, collection: &mut Collection) {
        let models = self.root.join(MODELS_DIR);
        if is_real_dir(&models) {
            collect_model_directory(&models, "GPT4All", ctx, collection);
            return;
        }
        collect_model_files(
            &self.root,
            1,
            "GPT4All",
            |p| {
                WEIGHT_EXTENSIONS.iter().any(|ext| has_extension(p, ext))
                    || (has_extension(p, "json")
                        && p.file_name()
                            .map(|n| n.to_string_lossy().starts_with(CATALOGUE_PREFIX))
                            .unwrap_or(false))
            },
            ctx,
            collection,
        );
    }
}

/// Any row as a JSON object keyed by column name. Blobs are summarized by
/// length.
fn row_to_json(row: &Row<'_>) -> rusqlite::Result<Value> {
    let names: Vec<String> = row.as_ref().column_names().into_iter().map(str::to_string).collect();
    let mut object = Map::new();
    for (index, name) in names.into_iter().enumerate() {
        let value = match row.get_ref(index)? {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(n) => json!(n),
            ValueRef::Real(f) => json!(f),
            ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
            ValueRef::Blob(bytes) => json!({ "blob_bytes": bytes.len() }),
        };
        object.insert(name, value);
    }
    Ok(Value::Object(object))
}

impl Collector for Gpt4AllCollector {
    fn name(&self) -> &'static str {
        "gpt4all"
    }

    fn descriptor(&self) -> CollectorDescriptor {
        CollectorDescriptor::new(
            self.name(),
            &[Capability::EmbeddedDatabase, Capability::JsonFiles, Capability::FileMetadata],
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

        self.collect_chat_db(ctx, &mut collection);
        self.collect_chat_files(ctx, &mut collection);
        self.collect_models(ctx, &mut collection);
        Ok(collection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_chat_db_rows_from_first_populated_table() {
        let dir = TempDir::new().unwrap();
        let conn = Connection::open(dir.path().join(CHAT_DB)).unwrap();
        conn.execute_batch(
            "CREATE TABLE conversations (id INTEGER PRIMARY KEY, title TEXT);
             CREATE TABLE messages (id INTEGER PRIMARY KEY, chat_id INTEGER, role TEXT,
                                    content TEXT, model TEXT, created_at INTEGER, embedding BLOB);
             INSERT INTO messages (chat_id, role, content, model, created_at, embedding)
                 VALUES (7, 'user', 'summarize the quarterly report', 'Llama 3 8B Instruct', 1717000000, x'0102');
             INSERT INTO messages (chat_id, role, content, model, created_at)
                 VALUES (7, 'assistant', 'Revenue grew 4%', 'Llama 3 8B Instruct', 1717000005);",
        )
        .unwrap();
        drop(conn);

        let collection = Gpt4AllCollector::new(dir.path().to_path_buf())
            .collect(&CollectContext::default())
            .unwrap();
        let records = collection.records();
        assert_eq!(records.len(), 2);

        let first = &records[0];
        assert_eq!(first.artifact_type, ArtifactType::ConversationMessage);
        assert_eq!(first.text.as_deref(), Some("summarize the quarterly report"));
        assert_eq!(first.metadata[meta_keys::ROLE], "user");
        assert_eq!(first.metadata[meta_keys::SESSION_ID], "7");
        assert_eq!(first.metadata["source_table"], "messages");
        assert_eq!(first.record_key.as_deref(), Some("messages:1"));
        assert_eq!(first.timestamp, RawTimestamp::Auto(1717000000.0));
        assert_eq!(first.structured.as_ref().unwrap()["embedding"], json!({"blob_bytes": 2}));
        assert!(first.structured.as_ref().unwrap().get("row_number").is_none());
    }

    #[test]
    fn test_chat_files_and_root_models() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join(CHATS_DIR)).unwrap();
        fs::write(
            root.join(CHATS_DIR).join("gpt4all-3f2a.json"),
            json!({"name": "Trip plan", "messages": [{"role": "user", "content": "plan a trip"}]}).to_string(),
        )
        .unwrap();
        fs::write(root.join("Meta-Llama-3-8B-Instruct.Q4_0.gguf"), vec![0u8; 1024]).unwrap();
        fs::write(root.join("models3.json"), json!([{"name": "Llama 3"}]).to_string()).unwrap();
        fs::write(root.join("log.txt"), "startup").unwrap();

        let collector = Gpt4AllCollector::new(root.to_path_buf());
        assert!(collector.detect());
        let collection = collector.collect(&CollectContext::default()).unwrap();
        let records = collection.records();

        let chat = records.iter().find(|r| r.artifact_type == ArtifactType::Conversation).unwrap();
        assert_eq!(chat.title.as_deref(), Some("Trip plan"));
        assert_eq!(chat.metadata[meta_keys::SESSION_ID], "gpt4all-3f2a");

        let inventory = records.iter().find(|r| r.artifact_type == ArtifactType::ModelInventory).unwrap();
        assert_eq!(inventory.metadata["total_files"], 2);
        assert_eq!(inventory.metadata["binary_files"], 1);
        assert_eq!(
            records.iter().filter(|r| r.artifact_type == ArtifactType::ModelManifest).count(),
            1
        );
    }
}
