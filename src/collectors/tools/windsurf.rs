//! Windsurf editor (`~/Library/Application Support/Windsurf`) and the
//! Codeium data directory (`~/.codeium`).
//!
//! Windsurf is a VS Code fork with the same `state.vscdb` layout as Cursor,
//! so chats are read through [`CursorCollector`]. Its own extension state in
//! `ItemTable` is read here; keys that look like sign-in material are listed
//! but their values are never selected.

use std::path::{Path, PathBuf};

use anyhow::Result;
use log::debug;
use rusqlite::ToSql;
use serde_json::Value;

use crate::adapters::{leveldb_samples, SourceDb};
use crate::collectors::collector::{CollectContext, Collection, Collector};
use crate::collectors::tools::common::{
    has_extension, keywords, like_filter, push_config_file, relative_to, root_present, usable_root, walk_files,
};
use crate::collectors::tools::cursor::{CursorCollector, StateDbFlavor};
use crate::constants::{LEVELDB_FILE_EXTENSIONS, LEVELDB_MAX_SAMPLES, LEVELDB_MIN_STRING_LEN};
use crate::models::{ArtifactType, Capability, CollectorDescriptor, RawRecord};
use crate::security::is_sensitive_key;

pub const WINDSURF: StateDbFlavor = StateDbFlavor {
    name: "windsurf",
    label: "Windsurf",
    sign_in_keys: &[],
};

const ITEM_TABLE: &str = "ItemTable";
const EXTENSION_KEY_MARKERS: &[&str] = &["windsurf", "codeium", "cascade"];

/// Characters of an `ItemTable` value kept per key.
const ITEM_VALUE_MAX_CHARS: usize = 10_000;

const LOCAL_STORAGE: &str = "Local Storage/leveldb";
const LEVELDB_KEYWORDS: &[&str] = &["cascade", "windsurf", "codeium", "prompt", "model"];
const CONFIG_EXTENSIONS: &[&str] = &["json", "yaml", "yml", "toml"];

pub struct WindsurfCollector {
    app_root: PathBuf,
    codeium_root: PathBuf,
    state: CursorCollector,
}

impl WindsurfCollector {
    pub fn new(app_root: PathBuf, codeium_root: PathBuf) -> Self {
        Self {
            state: CursorCollector::with_flavor(state_db_path(&app_root), &WINDSURF),
            app_root,
            codeium_root,
        }
    }

    fn collect_extension_state(&self, ctx: &CollectContext, collection: &mut Collection) {
        let opened = SourceDb::open_with_tables(self.state.state_db(), &ctx.policy, &[ITEM_TABLE]);
        let Some(Some(db)) = collection.absorb(ctx, opened) else {
            return;
        };

        let (clause, patterns) = like_filter("key", &keywords(EXTENSION_KEY_MARKERS));
        let params: Vec<&dyn ToSql> = patterns.iter().map(|p| p as &dyn ToSql).collect();
        let keys = db.query(
            &format!("SELECT key FROM {ITEM_TABLE} WHERE {clause} ORDER BY key"),
            &params,
            |row| row.get::<_, String>(0),
        );
        let Some(keys) = collection.absorb(ctx, keys) else {
            return;
        };

        let mut withheld = Vec::new();
        for key in keys.rows {
            if is_sensitive_key(&key) || key.to_lowercase().contains("session") {
                withheld.push(key);
                continue;
            }
            let value = db.query(
                &format!("SELECT SUBSTR(CAST(value AS TEXT), 1, {ITEM_VALUE_MAX_CHARS}) FROM {ITEM_TABLE} WHERE key = ?"),
                &[&key as &dyn ToSql],
                |row| row.get::<_, Option<String>>(0),
            );
            let Some(raw) = collection.absorb(ctx, value).and_then(|v| v.rows.into_iter().next().flatten()) else {
                continue;
            };

            let record = RawRecord::new(ArtifactType::KeyValueStore, db.path())
                .title(format!("Windsurf state {key}"))
                .meta("db_key", key.clone())
                .meta("value_size_bytes", raw.len())
                .record_key(format!("{ITEM_TABLE}:{key}"))
                .facts(Some(db.facts().clone()));
            let record = match serde_json::from_str::<Value>(&raw) {
                Ok(value @ (Value::Object(_) | Value::Array(_))) => record.structured(value),
                _ => record.text(raw),
            };
            collection.push(record);
        }

        if !withheld.is_empty() {
            debug!("[windsurf] {} sign-in keys withheld", withheld.len());
            collection.push(
                RawRecord::new(ArtifactType::CredentialFile, db.path())
                    .title("Windsurf sign-in keys present in state database")
                    .text("Sign-in keys are stored in the Windsurf state database; values were not read")
                    .meta("keys_present", withheld)
                    .meta("values_read", false)
                    .record_key("windsurf_item_table_sign_in_keys")
                    .facts(Some(db.facts().clone())),
            );
        }
    }

    fn collect_local_storage(&self, ctx: &CollectContext, collection: &mut Collection) {
        let dir = self.app_root.join(LOCAL_STORAGE);
        let files = walk_files(&dir, 1, ctx.policy.limits.max_files_per_collector, ctx, collection, |p| {
            LEVELDB_FILE_EXTENSIONS.iter().any(|ext| has_extension(p, ext))
        });
        let words = keywords(LEVELDB_KEYWORDS);

        for path in files {
            let result = leveldb_samples(&path, &ctx.policy, &words, LEVELDB_MIN_STRING_LEN, LEVELDB_MAX_SAMPLES);
            let Some((samples, facts)) = collection.absorb(ctx, result) else {
                continue;
            };
            if samples.is_empty() {
                continue;
            }
            let name = relative_to(&path, &self.app_root);
            collection.push(
                RawRecord::new(ArtifactType::KeyValueStore, &path)
                    .title(format!("{LOCAL_STORAGE} strings from {name}"))
                    .text(samples.join("\n"))
                    .meta("store", LOCAL_STORAGE)
                    .meta("sample_count", samples.len())
                    .record_key(name)
                    .facts(Some(facts)),
            );
        }
    }

    fn collect_codeium(&self, ctx: &CollectContext, collection: &mut Collection) {
        let files = walk_files(
            &self.codeium_root,
            ctx.policy.limits.max_walk_depth,
            ctx.policy.limits.max_files_per_collector,
            ctx,
            collection,
            |p| CONFIG_EXTENSIONS.iter().any(|ext| has_extension(p, ext)),
        );
        for path in files {
            push_config_file(&path, &self.codeium_root, "Codeium", ctx, collection);
        }
    }
}

impl Collector for WindsurfCollector {
    fn name(&self) -> &'static str {
        WINDSURF.name
    }

    fn descriptor(&self) -> CollectorDescriptor {
        CollectorDescriptor::new(
            self.name(),
            &[Capability::EmbeddedDatabase, Capability::KeyValueStore, Capability::JsonFiles],
            vec![self.app_root.clone(), self.codeium_root.clone()],
        )
    }

    fn detect(&self) -> bool {
        root_present(&self.app_root) || root_present(&self.codeium_root)
    }

    fn collect(&self, ctx: &CollectContext) -> Result<Collection> {
        let mut collection = Collection::new(self.name());

        if usable_root(&self.app_root, ctx, &mut collection) {
            if root_present(self.state.state_db()) {
                self.state.collect_state_db(ctx, &mut collection);
                self.collect_extension_state(ctx, &mut collection);
            }
            self.collect_local_storage(ctx, &mut collection);
        }
        if usable_root(&self.codeium_root, ctx, &mut collection) {
            self.collect_codeium(ctx, &mut collection);
        }

        Ok(collection)
    }
}

/// `state.vscdb` path under a Windsurf application root.
pub fn state_db_path(app_root: &Path) -> PathBuf {
    app_root.join("User").join("globalStorage").join("state.vscdb")
}
