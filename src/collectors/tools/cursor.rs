//! Cursor IDE global state database (`User/globalStorage/state.vscdb`).
//!
//! Chat sessions and messages live as JSON values in the `cursorDiskKV`
//! key/value table. Usage statistics are in `ItemTable`. Sign-in keys are
//! only checked for existence; their values are never selected.
//!
//! Other VS Code forks that adopted the same table layout (Windsurf) reuse
//! this reader through a [`StateDbFlavor`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Result;
use log::debug;
use rusqlite::ToSql;
use serde_json::{json, Value};

use crate::adapters::SourceDb;
use crate::collectors::collector::{CollectContext, Collection, Collector};
use crate::collectors::tools::common::{field, message_text, root_present, str_field, usable_root};
use crate::models::{meta_keys, ArtifactType, Capability, CollectorDescriptor, RawRecord, RawTimestamp};

const KV_TABLE: &str = "cursorDiskKV";
const ITEM_TABLE: &str = "ItemTable";
const COMPOSER_PREFIX: &str = "composerData:";
const BUBBLE_PREFIX: &str = "bubbleId:";
const DAILY_STATS_PREFIX: &str = "aiCodeTracking.dailyStats.";

/// Names that differ between editors sharing the `state.vscdb` layout.
#[derive(Debug)]
pub struct StateDbFlavor {
    pub name: &'static str,
    pub label: &'static str,
    /// `cursorDiskKV` keys whose presence is flagged and whose values are never read.
    pub sign_in_keys: &'static [&'static str],
}

pub const CURSOR: StateDbFlavor = StateDbFlavor {
    name: "cursor",
    label: "Cursor",
    sign_in_keys: &["cursorAuth/accessToken", "cursorAuth/refreshToken"],
};

pub struct CursorCollector {
    state_db: PathBuf,
    flavor: &'static StateDbFlavor,
}

impl CursorCollector {
    pub fn new(state_db: PathBuf) -> Self {
        Self::with_flavor(state_db, &CURSOR)
    }

    pub fn with_flavor(state_db: PathBuf, flavor: &'static StateDbFlavor) -> Self {
        Self { state_db, flavor }
    }

    pub fn state_db(&self) -> &Path {
        &self.state_db
    }

    /// Read every known table of the state database into `collection`.
    pub fn collect_state_db(&self, ctx: &CollectContext, collection: &mut Collection) {
        let Some(db) = collection.absorb(ctx, SourceDb::open(&self.state_db, &ctx.policy)) else {
            return;
        };

        match collection.absorb(ctx, db.has_tables(&[KV_TABLE])) {
            Some(true) => {
                self.collect_composers(&db, ctx, collection);
                self.collect_bubbles(&db, ctx, collection);
                self.flag_sign_in_keys(&db, ctx, collection);
            }
            Some(false) => debug!("[{}] no {} table", self.flavor.name, KV_TABLE),
            None => {}
        }
        if collection.absorb(ctx, db.has_tables(&[ITEM_TABLE])) == Some(true) {
            self.collect_usage_stats(&db, ctx, collection);
        }
    }

    /// `(key, value)` pairs whose key starts with `prefix`. Values are cast
    /// to text so BLOB-stored JSON reads the same as TEXT.
    fn entries(
        &self,
        db: &SourceDb,
        table: &str,
        prefix: &str,
        ctx: &CollectContext,
        collection: &mut Collection,
    ) -> Vec<(String, Option<String>)> {
        let sql = format!("SELECT key, CAST(value AS TEXT) FROM {table} WHERE key LIKE ? ORDER BY key");
        let pattern = format!("{prefix}%");
        let rows = db.query(&sql, &[&pattern as &dyn ToSql], |row| Ok((row.get(0)?, row.get(1)?)));
        match collection.absorb(ctx, rows) {
            Some(rows) => {
                collection.count_format_errors(rows.malformed);
                rows.rows
            }
            None => Vec::new(),
        }
    }

    fn collect_composers(&self, db: &SourceDb, ctx: &CollectContext, collection: &mut Collection) {
        let entries = self.entries(db, KV_TABLE, COMPOSER_PREFIX, ctx, collection);
        debug!("[{}] {} composer sessions", self.flavor.name, entries.len());

        for (key, raw) in entries {
            let Some(value) = parse_object(raw.as_deref(), collection) else {
                continue;
            };
            let composer_id = key.trim_start_matches(COMPOSER_PREFIX).to_string();
            let messages = field(&value, &["conversation", "messages"])
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            let text = messages
                .iter()
                .map(|m| field(m, &["text", "content"]).map(message_text).unwrap_or_default())
                .filter(|t| !t.is_empty())
                .collect::<Vec<_>>()
                .join("\n");
            let name = str_field(&value, &["name", "title"]).filter(|n| !n.is_empty());

            collection.push(
                RawRecord::new(ArtifactType::Conversation, db.path())
                    .timestamp(
                        field(&value, &["createdAt", "lastUpdatedAt"])
                            .map(RawTimestamp::from_json)
                            .unwrap_or_default(),
                    )
                    .title(name.unwrap_or_else(|| format!("{} composer {composer_id}", self.flavor.label)))
                    .text(text)
                    .meta(meta_keys::SESSION_ID, composer_id.clone())
                    .meta(meta_keys::MODEL, str_field(&value, &["model", "modelId"]))
                    .meta("message_count", messages.len())
                    .meta("value_size_bytes", raw.as_ref().map(String::len).unwrap_or(0))
                    .record_key(key)
                    .facts(Some(db.facts().clone())),
            );
        }
    }

    fn collect_bubbles(&self, db: &SourceDb, ctx: &CollectContext, collection: &mut Collection) {
        let entries = self.entries(db, KV_TABLE, BUBBLE_PREFIX, ctx, collection);
        debug!("[{}] {} message bubbles", self.flavor.name, entries.len());

        for (key, raw) in entries {
            let Some(value) = parse_object(raw.as_deref(), collection) else {
                continue;
            };
            let text = field(&value, &["text", "content", "message"])
                .map(message_text)
                .unwrap_or_default();
            if text.is_empty() {
                continue;
            }
            let conversation = str_field(&value, &["composerId", "conversationId"]).or_else(|| {
                // bubbleId:<composer>:<bubble>
                key.trim_start_matches(BUBBLE_PREFIX)
                    .split_once(':')
                    .map(|(composer, _)| composer.to_string())
            });

            collection.push(
                RawRecord::new(ArtifactType::ConversationMessage, db.path())
                    .timestamp(
                        field(&value, &["createdAt", "timestamp"])
                            .map(RawTimestamp::from_json)
                            .unwrap_or_default(),
                    )
                    .title(format!("{} message {}", self.flavor.label, role_name(&value).unwrap_or("unknown")))
                    .text(text)
                    .meta(meta_keys::ROLE, role_name(&value))
                    .meta(meta_keys::SESSION_ID, conversation)
                    .meta(meta_keys::MODEL, str_field(&value, &["model", "modelId"]))
                    .record_key(key)
                    .facts(Some(db.facts().clone())),
            );
        }
    }

    fn collect_usage_stats(&self, db: &SourceDb, ctx: &CollectContext, collection: &mut Collection) {
        let entries = self.entries(db, ITEM_TABLE, DAILY_STATS_PREFIX, ctx, collection);
        if entries.is_empty() {
            return;
        }

        let daily: BTreeMap<String, Value> = entries
            .into_iter()
            .map(|(key, raw)| {
                let day = key.trim_start_matches(DAILY_STATS_PREFIX).to_string();
                let value = raw
                    .as_deref()
                    .and_then(|r| serde_json::from_str(r).ok())
                    .or_else(|| raw.map(Value::String))
                    .unwrap_or(Value::Null);
                (day, value)
            })
            .collect();
        let earliest = daily.keys().next().cloned();
        let latest = daily.keys().next_back().cloned();

        collection.push(
            RawRecord::new(ArtifactType::KeyValueStore, db.path())
                .title(format!("{} daily AI usage: {} days tracked", self.flavor.label, daily.len()))
                .structured(json!(daily))
                .meta("days_tracked", daily.len())
                .meta("earliest_day", earliest)
                .meta("latest_day", latest)
                .record_key("aiCodeTracking.dailyStats")
                .facts(Some(db.facts().clone())),
        );
    }

    fn flag_sign_in_keys(&self, db: &SourceDb, ctx: &CollectContext, collection: &mut Collection) {
        let mut present = Vec::new();
        for key in self.flavor.sign_in_keys {
            let rows = db.query(
                &format!("SELECT key FROM {KV_TABLE} WHERE key = ?"),
                &[key as &dyn ToSql],
                |row| row.get::<_, String>(0),
            );
            if let Some(rows) = collection.absorb(ctx, rows) {
                if !rows.rows.is_empty() {
                    present.push(key.to_string());
                }
            }
        }
        if present.is_empty() {
            return;
        }

        let label = self.flavor.label;
        collection.push(
            RawRecord::new(ArtifactType::CredentialFile, db.path())
                .title(format!("{label} sign-in keys present in state database"))
                .text(format!("Sign-in keys are stored in the {label} state database; values were not read"))
                .meta("keys_present", present)
                .meta("values_read", false)
                .record_key(format!("{}_sign_in_keys", self.flavor.name))
                .facts(Some(db.facts().clone())),
        );
    }
}

fn parse_object(raw: Option<&str>, collection: &mut Collection) -> Option<Value> {
    match raw.map(serde_json::from_str::<Value>) {
        Some(Ok(value @ Value::Object(_))) => Some(value),
        Some(_) => {
            collection.count_format_errors(1);
            None
        }
        None => None,
    }
}

/// Cursor stores the role either as a string or as `type` 1 (user) / 2 (assistant).
fn role_name(value: &Value) -> Option<&'static str> {
    match field(value, &["role", "type"])? {
        Value::String(s) => match s.as_str() {
            "user" => Some("user"),
            "assistant" | "ai" => Some("assistant"),
            "system" => Some("system"),
            _ => None,
        },
        Value::Number(n) => match n.as_i64() {
            Some(1) => Some("user"),
            Some(2) => Some("assistant"),
            _ => None,
        },
        _ => None,
    }
}

impl Collector for CursorCollector {
    fn name(&self) -> &'static str {
        self.flavor.name
    }

    fn descriptor(&self) -> CollectorDescriptor {
        CollectorDescriptor::new(
            self.name(),
            &[Capability::EmbeddedDatabase, Capability::KeyValueStore],
            vec![self.state_db.clone()],
        )
    }

    fn detect(&self) -> bool {
        root_present(&self.state_db)
    }

    fn collect(&self, ctx: &CollectContext) -> Result<Collection> {
        let mut collection = Collection::new(self.name());
        if !usable_root(&self.state_db, ctx, &mut collection) {
            return Ok(collection);
        }

        self.collect_state_db(ctx, &mut collection);
        Ok(collection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;
    use tempfile::TempDir;

    fn fixture(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("state.vscdb");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE cursorDiskKV (key TEXT UNIQUE, value BLOB);
             CREATE TABLE ItemTable (key TEXT UNIQUE, value BLOB);",
        )
        .unwrap();
        let rows = [
            (
                "composerData:c1",
                json!({"name": "Fix login", "createdAt": 1736000000000i64,
                       "conversation": [{"text": "why does login fail"}, {"text": "missing await"}]})
                .to_string(),
            ),
            (
                "bubbleId:c1:b1",
                json!({"type": 1, "text": "why does login fail"}).to_string(),
            ),
            ("bubbleId:c1:b2", "not json".to_string()),
            ("cursorAuth/accessToken", "eyJhbGciOiJIUzI1NiJ9.secret.value".to_string()),
        ];
        for (k, v) in rows {
            conn.execute("INSERT INTO cursorDiskKV VALUES (?1, ?2)", [k, v.as_str()]).unwrap();
        }
        conn.execute(
            "INSERT INTO ItemTable VALUES ('aiCodeTracking.dailyStats.2025-01-02', '{\"tabs\": 4}'), \
             ('aiCodeTracking.dailyStats.2025-01-01', '{\"tabs\": 2}')",
            [],
        )
        .unwrap();
        path
    }

    #[test]
    fn test_cursor_state_db() {
        let dir = TempDir::new().unwrap();
        let collector = CursorCollector::new(fixture(&dir));
        assert!(collector.detect());

        let collection = collector.collect(&CollectContext::default()).unwrap();
        let records = collection.records();

        let composer = records.iter().find(|r| r.artifact_type == ArtifactType::Conversation).unwrap();
        assert_eq!(composer.title.as_deref(), Some("Fix login"));
        assert_eq!(composer.metadata["message_count"], 2);

        let bubble = records
            .iter()
            .find(|r| r.artifact_type == ArtifactType::ConversationMessage)
            .unwrap();
        assert_eq!(bubble.metadata[meta_keys::ROLE], "user");
        assert_eq!(bubble.metadata[meta_keys::SESSION_ID], "c1");
        assert_eq!(collection.skips().format_errors, 1);

        let stats = records.iter().find(|r| r.artifact_type == ArtifactType::KeyValueStore).unwrap();
        assert_eq!(stats.metadata["earliest_day"], "2025-01-01");
        assert_eq!(stats.metadata["latest_day"], "2025-01-02");
    }

    #[test]
    fn test_sign_in_values_never_read() {
        let dir = TempDir::new().unwrap();
        let collection = CursorCollector::new(fixture(&dir))
            .collect(&CollectContext::default())
            .unwrap();
        let flag = collection
            .records()
            .iter()
            .find(|r| r.artifact_type == ArtifactType::CredentialFile)
            .unwrap();
        assert_eq!(flag.metadata["keys_present"], json!(["cursorAuth/accessToken"]));
        for record in collection.records() {
            let dump = format!("{:?}", record);
            assert!(!dump.contains("secret.value"));
        }
    }
}
