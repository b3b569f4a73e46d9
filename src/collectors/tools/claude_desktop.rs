//! Claude Desktop app (`~/Library/Application Support/Claude`).

use std::path::{Path, PathBuf};

use anyhow::Result;
use log::debug;
use serde_json::Value;

use crate::adapters::{leveldb_samples, read_json};
use crate::collectors::collector::{CollectContext, Collection, Collector};
use crate::collectors::tools::claude_code::mask_env_block;
use crate::collectors::tools::common::{has_extension, relative_to, root_present, usable_root, walk_files};
use crate::constants::{LEVELDB_FILE_EXTENSIONS, LEVELDB_MAX_SAMPLES, LEVELDB_MIN_STRING_LEN};
use crate::models::{ArtifactType, Capability, CollectorDescriptor, RawRecord};
use crate::security::path_guard::is_real_dir;

const MCP_CONFIG: &str = "claude_desktop_config.json";
const APP_CONFIG: &str = "config.json";

/// Electron storage directories holding LevelDB stores.
const LEVELDB_DIRS: &[&str] = &["Local Storage/leveldb", "Session Storage", "IndexedDB"];

/// `IndexedDB/<origin>.indexeddb.leveldb/*.ldb`
const LEVELDB_DEPTH: usize = 2;

const LEVELDB_KEYWORDS: &[&str] = &["conversation", "tipTapEditorState", "claude", "prompt", "model"];

pub struct ClaudeDesktopCollector {
    root: PathBuf,
}

impl ClaudeDesktopCollector {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn collect_mcp_config(&self, ctx: &CollectContext, collection: &mut Collection) {
        let path = self.root.join(MCP_CONFIG);
        if !root_present(&path) {
            return;
        }
        let Some((mut value, facts)) = collection.absorb(ctx, read_json(&path, &ctx.policy)) else {
            return;
        };

        let mut server_names = Vec::new();
        let mut servers_with_env = Vec::new();
        if let Some(Value::Object(servers)) = value.get_mut("mcpServers") {
            for (name, server) in servers.iter_mut() {
                server_names.push(name.clone());
                if mask_env_block(server) > 0 {
                    servers_with_env.push(name.clone());
                }
            }
        }
        let trusted = value
            .get("trustedFolders")
            .and_then(Value::as_array)
            .map(|a| a.len())
            .unwrap_or(0);

        collection.push(
            RawRecord::new(ArtifactType::Config, &path)
                .title(format!("Claude Desktop MCP config: {} servers", server_names.len()))
                .structured(value)
                .meta("mcp_server_count", server_names.len())
                .meta("mcp_server_names", server_names)
                .meta("servers_with_env", servers_with_env)
                .meta("trusted_folder_count", trusted)
                .record_key(MCP_CONFIG)
                .facts(Some(facts)),
        );
    }

    fn collect_app_config(&self, ctx: &CollectContext, collection: &mut Collection) {
        let path = self.root.join(APP_CONFIG);
        if !root_present(&path) {
            return;
        }
        let Some((mut value, facts)) = collection.absorb(ctx, read_json(&path, &ctx.policy)) else {
            return;
        };

        // Cached OAuth material is removed outright, not just masked.
        let mut removed = 0;
        if let Value::Object(map) = &mut value {
            let cached: Vec<String> = map
                .keys()
                .filter(|key| key.to_lowercase().contains("oauth"))
                .cloned()
                .collect();
            for key in &cached {
                map.remove(key);
            }
            removed = cached.len();
        }

        collection.push(
            RawRecord::new(ArtifactType::Config, &path)
                .title("Claude Desktop app config")
                .meta("key_count", value.as_object().map(|o| o.len()).unwrap_or(0))
                .meta("removed_key_count", removed)
                .structured(value)
                .record_key(APP_CONFIG)
                .facts(Some(facts)),
        );
    }

    fn collect_leveldb(&self, ctx: &CollectContext, collection: &mut Collection) {
        let keywords: Vec<String> = LEVELDB_KEYWORDS.iter().map(|k| k.to_string()).collect();

        for dir in LEVELDB_DIRS {
            let store = self.root.join(dir);
            if !is_real_dir(&store) {
                continue;
            }
            let files = walk_files(
                &store,
                LEVELDB_DEPTH,
                ctx.policy.limits.max_files_per_collector,
                ctx,
                collection,
                |p| LEVELDB_FILE_EXTENSIONS.iter().any(|ext| has_extension(p, ext)),
            );
            debug!("[claude_desktop] {} LevelDB files under {}", files.len(), dir);

            for path in files {
                self.collect_leveldb_file(&path, &keywords, dir, ctx, collection);
            }
        }
    }

    fn collect_leveldb_file(
        &self,
        path: &Path,
        keywords: &[String],
        store: &str,
        ctx: &CollectContext,
        collection: &mut Collection,
    ) {
        let result = leveldb_samples(path, &ctx.policy, keywords, LEVELDB_MIN_STRING_LEN, LEVELDB_MAX_SAMPLES);
        let Some((samples, facts)) = collection.absorb(ctx, result) else {
            return;
        };
        if samples.is_empty() {
            return;
        }

        let name = relative_to(path, &self.root);
        collection.push(
            RawRecord::new(ArtifactType::KeyValueStore, path)
                .title(format!("{store} strings from {name}"))
                .text(samples.join("\n"))
                .meta("store", store)
                .meta("sample_count", samples.len())
                .record_key(name)
                .facts(Some(facts)),
        );
    }
}

impl Collector for ClaudeDesktopCollector {
    fn name(&self) -> &'static str {
        "claude_desktop"
    }

    fn descriptor(&self) -> CollectorDescriptor {
        CollectorDescriptor::new(
            self.name(),
            &[Capability::JsonFiles, Capability::KeyValueStore],
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

        self.collect_mcp_config(ctx, &mut collection);
        self.collect_app_config(ctx, &mut collection);
        self.collect_leveldb(ctx, &mut collection);
        Ok(collection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::REDACTION_MARKER;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_configs_are_masked() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(MCP_CONFIG),
            json!({"mcpServers": {
                "github": {"command": "npx", "env": {"GITHUB_PERSONAL_ACCESS_TOKEN": "ghp_live"}},
                "files": {"command": "node"}
            }})
            .to_string(),
        )
        .unwrap();
        fs::write(
            dir.path().join(APP_CONFIG),
            json!({"oauth:tokenCache": "opaque", "locale": "en-US"}).to_string(),
        )
        .unwrap();

        let collection = ClaudeDesktopCollector::new(dir.path().to_path_buf())
            .collect(&CollectContext::default())
            .unwrap();
        assert_eq!(collection.len(), 2);

        let mcp = &collection.records()[0];
        let structured = mcp.structured.as_ref().unwrap();
        assert_eq!(structured["mcpServers"]["github"]["env"]["GITHUB_PERSONAL_ACCESS_TOKEN"], REDACTION_MARKER);
        assert_eq!(mcp.metadata["servers_with_env"], json!(["github"]));

        let app = &collection.records()[1];
        let structured = app.structured.as_ref().unwrap();
        assert!(structured.get("oauth:tokenCache").is_none());
        assert_eq!(app.metadata["removed_key_count"], 1);
    }

    #[test]
    fn test_leveldb_strings() {
        let dir = TempDir::new().unwrap();
        let store = dir.path().join("Local Storage").join("leveldb");
        fs::create_dir_all(&store).unwrap();
        let mut bytes = vec![0u8, 1, 2];
        bytes.extend_from_slice(b"tipTapEditorState draft about the quarterly report");
        bytes.extend_from_slice(&[0, 0xff]);
        fs::write(store.join("000003.log"), bytes).unwrap();
        fs::write(store.join("LOCK"), b"").unwrap();

        let collection = ClaudeDesktopCollector::new(dir.path().to_path_buf())
            .collect(&CollectContext::default())
            .unwrap();
        assert_eq!(collection.len(), 1);
        let record = &collection.records()[0];
        assert_eq!(record.artifact_type, ArtifactType::KeyValueStore);
        assert!(record.text.as_ref().unwrap().contains("quarterly report"));
        assert_eq!(record.metadata["store"], "Local Storage/leveldb");
        assert_eq!(record.metadata["sample_count"], 1);
        assert_eq!(record.record_key.as_deref(), Some("Local Storage/leveldb/000003.log"));
    }
}
