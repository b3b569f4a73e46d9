//! LM Studio local runner (`~/.lmstudio`).
//!
//! Settings, MCP servers, the model catalogue and download jobs are JSON
//! files; chats are one JSON document per conversation. `credentials/` and
//! `.internal/lms-key-2` hold keys and are only flagged.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use anyhow::Result;
use log::debug;
use serde_json::Value;

use crate::adapters::read_json;
use crate::collectors::collector::{CollectContext, Collection, Collector};
use crate::collectors::tools::claude_code::mask_env_block;
use crate::collectors::tools::common::{
    has_extension, keywords, push_config_file, push_log_matches, root_present, usable_root, walk_files,
};
use crate::collectors::tools::local_runner::{collect_model_directory, push_conversation_file};
use crate::models::{ArtifactType, Capability, CollectorDescriptor, RawRecord};
use crate::security::path_guard::{exists_no_follow, is_real_dir};

const SETTINGS: &str = "settings.json";
const MCP_CONFIG: &str = "mcp.json";
const SERVER_CONFIGS: &[&str] = &["http-server-config.json", "server-config.json", "api-config.json"];
const MODEL_DATA: &str = ".internal/model-data.json";
const DOWNLOAD_JOBS: &str = ".internal/download-jobs-info.json";
const CONVERSATIONS_DIR: &str = "conversations";
const MODELS_DIR: &str = "models";
const LOG_DIRS: &[&str] = &["server-logs", "logs", ".internal/logs"];
const LOG_KEYWORDS: &[&str] = &["model", "request", "completion", "load", "error"];

const CREDENTIALS_DIR: &str = "credentials";
const LMS_KEY: &str = ".internal/lms-key-2";

pub struct LmStudioCollector {
    root: PathBuf,
}

impl LmStudioCollector {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Existence-only records for the key store. Nothing under it is opened.
    fn flag_key_files(&self, ctx: &CollectContext, collection: &mut Collection) {
        let credentials = self.root.join(CREDENTIALS_DIR);
        if is_real_dir(&credentials) {
            for path in walk_files(
                &credentials,
                ctx.policy.limits.max_walk_depth,
                ctx.policy.limits.max_files_per_collector,
                ctx,
                collection,
                |_| true,
            ) {
                collection.flag_credential_file(ctx, &path);
            }
        }
        let lms_key = self.root.join(LMS_KEY);
        if exists_no_follow(&lms_key) {
            collection.flag_credential_file(ctx, &lms_key);
        }
    }

    fn collect_configs(&self, ctx: &CollectContext, collection: &mut Collection) {
        let settings = self.root.join(SETTINGS);
        if exists_no_follow(&settings) {
            push_config_file(&settings, &self.root, "LM Studio", ctx, collection);
        }

        let server_configs = walk_files(
            &self.root,
            ctx.policy.limits.max_walk_depth,
            ctx.policy.limits.max_files_per_collector,
            ctx,
            collection,
            |p| {
                p.file_name()
                    .map(|n| SERVER_CONFIGS.iter().any(|c| n == OsStr::new(c)))
                    .unwrap_or(false)
                    && !self.in_key_store(p)
            },
        );
        for path in server_configs {
            push_config_file(&path, &self.root, "LM Studio", ctx, collection);
        }
    }

    fn in_key_store(&self, path: &Path) -> bool {
        path.strip_prefix(&self.root)
            .map(|rel| rel.starts_with(CREDENTIALS_DIR))
            .unwrap_or(false)
    }

    fn collect_mcp_config(&self, ctx: &CollectContext, collection: &mut Collection) {
        let path = self.root.join(MCP_CONFIG);
        if !exists_no_follow(&path) {
            return;
        }
        let Some((mut value, facts)) = collection.absorb(ctx, read_json(&path, &ctx.policy)) else {
            return;
        };

        let mut server_names = Vec::new();
        let mut masked = 0;
        if let Some(Value::Object(servers)) = value.get_mut("mcpServers") {
            for (name, server) in servers.iter_mut() {
                server_names.push(name.clone());
                masked += mask_env_block(server);
            }
        }

        collection.push(
            RawRecord::new(ArtifactType::Config, &path)
                .title(format!("LM Studio MCP config: {} servers", server_names.len()))
                .structured(value)
                .meta("mcp_server_count", server_names.len())
                .meta("mcp_server_names", server_names)
                .meta("env_values_masked", masked)
                .record_key(MCP_CONFIG)
                .facts(Some(facts)),
        );
    }

    /// `.internal` catalogue files, summarized by entry count.
    fn collect_internal(&self, ctx: &CollectContext, collection: &mut Collection) {
        let files = [
            (MODEL_DATA, ArtifactType::ModelInventory, "model entries"),
            (DOWNLOAD_JOBS, ArtifactType::HistoryEntry, "download jobs"),
        ];
        for (name, artifact_type, noun) in files {
            let path = self.root.join(name);
            if !exists_no_follow(&path) {
                continue;
            }
            let Some((value, facts)) = collection.absorb(ctx, read_json(&path, &ctx.policy)) else {
                continue;
            };
            let count = match &value {
                Value::Array(items) => items.len(),
                Value::Object(map) => map.len(),
                _ => 0,
            };
            collection.push(
                RawRecord::new(artifact_type, &path)
                    .title(format!("LM Studio: {count} {noun}"))
                    .structured(value)
                    .meta("entry_count", count)
                    .record_key(name)
                    .facts(Some(facts)),
            );
        }
    }

    fn collect_conversations(&self, ctx: &CollectContext, collection: &mut Collection) {
        let dir = self.root.join(CONVERSATIONS_DIR);
        let files = walk_files(
            &dir,
            ctx.policy.limits.max_walk_depth,
            ctx.policy.limits.max_files_per_collector,
            ctx,
            collection,
            |p| has_extension(p, "json"),
        );
        debug!("[lm_studio] {} conversation files", files.len());
        for path in files {
            // `<id>.conversation.json`
            let session = path
                .file_name()
                .map(|n| n.to_string_lossy().split('.').next().unwrap_or_default().to_string())
                .unwrap_or_default();
            push_conversation_file(&path, &dir, "LM Studio", &session, ctx, collection);
        }
    }

    fn collect_logs(&self, ctx: &CollectContext, collection: &mut Collection) {
        let words = keywords(LOG_KEYWORDS);
        for dir in LOG_DIRS {
            let files = walk_files(
                &self.root.join(dir),
                2,
                ctx.policy.limits.max_files_per_collector,
                ctx,
                collection,
                |p| has_extension(p, "log") || has_extension(p, "txt"),
            );
            for path in files {
                push_log_matches(&path, &words, ctx, collection);
            }
        }
    }
}

impl Collector for LmStudioCollector {
    fn name(&self) -> &'static str {
        "lm_studio"
    }

    fn descriptor(&self) -> CollectorDescriptor {
        CollectorDescriptor::new(
            self.name(),
            &[Capability::JsonFiles, Capability::LogScan, Capability::FileMetadata],
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

        self.flag_key_files(ctx, &mut collection);
        self.collect_configs(ctx, &mut collection);
        self.collect_mcp_config(ctx, &mut collection);
        self.collect_internal(ctx, &mut collection);
        self.collect_conversations(ctx, &mut collection);
        collect_model_directory(&self.root.join(MODELS_DIR), "LM Studio", ctx, &mut collection);
        self.collect_logs(ctx, &mut collection);
        debug!("[lm_studio] {} records under {}", collection.len(), self.root.display());
        Ok(collection)
    }
}
