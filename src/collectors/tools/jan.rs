//! Jan desktop runner (`~/jan`, or `~/Library/Application Support/Jan`
//! on newer releases).
//!
//! Each thread is a directory under `threads/` holding `thread.json` and a
//! `messages.jsonl` with one message per line.

use std::path::{Path, PathBuf};

use anyhow::Result;
use log::debug;
use serde_json::Value;

use crate::adapters::read_jsonl;
use crate::collectors::collector::{CollectContext, Collection, Collector};
use crate::collectors::tools::common::{
    field, has_extension, keywords, push_config_file, push_log_matches, relative_to, root_present, str_field,
    usable_root, walk_files,
};
use crate::collectors::tools::local_runner::{
    collect_model_directory, message_body, message_role, push_conversation_file,
};
use crate::models::{meta_keys, ArtifactType, Capability, CollectorDescriptor, RawRecord, RawTimestamp};
use crate::security::path_guard::exists_no_follow;

const THREADS_DIR: &str = "threads";
const THREAD_FILE: &str = "thread.json";
const MESSAGES_FILE: &str = "messages.jsonl";
const MODELS_DIR: &str = "models";
const SETTINGS_DIR: &str = "settings";
const APP_LOG: &str = "logs/app.log";
const LOG_KEYWORDS: &[&str] = &["model", "thread", "inference", "engine", "error"];

pub struct JanCollector {
    candidates: Vec<PathBuf>,
}

impl JanCollector {
    /// `candidates` are tried in order; the first present one is the data root.
    pub fn new(candidates: Vec<PathBuf>) -> Self {
        Self { candidates }
    }

    fn root(&self) -> Option<&Path> {
        self.candidates.iter().map(PathBuf::as_path).find(|p| root_present(p))
    }

    fn collect_threads(&self, root: &Path, ctx: &CollectContext, collection: &mut Collection) {
        let threads = root.join(THREADS_DIR);
        let files = walk_files(
            &threads,
            2,
            ctx.policy.limits.max_files_per_collector,
            ctx,
            collection,
            |p| p.ends_with(THREAD_FILE) || p.ends_with(MESSAGES_FILE),
        );
        debug!("[jan] {} thread files", files.len());

        for path in files {
            let thread_id = path
                .parent()
                .and_then(Path::file_name)
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            if path.ends_with(THREAD_FILE) {
                push_conversation_file(&path, &threads, "Jan", &thread_id, ctx, collection);
            } else {
                self.collect_messages(&path, &threads, &thread_id, ctx, collection);
            }
        }
    }

    fn collect_messages(
        &self,
        path: &Path,
        threads: &Path,
        thread_id: &str,
        ctx: &CollectContext,
        collection: &mut Collection,
    ) {
        let Some(lines) = collection.absorb(ctx, read_jsonl(path, &ctx.policy)) else {
            return;
        };
        collection.count_format_errors(lines.malformed);
        let name = relative_to(path, threads);

        for (line_no, message) in lines.records {
            let text = message_body(&message);
            if text.trim().is_empty() {
                continue;
            }
            let role = message_role(&message);
            let timestamp = field(&message, &["created_at", "created", "updated_at"])
                .map(RawTimestamp::from_json)
                .unwrap_or_default();

            collection.push(
                RawRecord::new(ArtifactType::ConversationMessage, path)
                    .timestamp(timestamp)
                    .title(format!("Jan {} message", role.as_deref().unwrap_or("unknown")))
                    .text(text)
                    .meta(meta_keys::ROLE, role)
                    .meta(
                        meta_keys::SESSION_ID,
                        str_field(&message, &["thread_id"]).unwrap_or_else(|| thread_id.to_string()),
                    )
                    .meta(meta_keys::MODEL, model_of(&message))
                    .record_key(format!("{name}:{line_no}"))
                    .facts(Some(lines.facts.clone())),
            );
        }
    }

    fn collect_settings(&self, root: &Path, ctx: &CollectContext, collection: &mut Collection) {
        let settings = root.join(SETTINGS_DIR);
        let files = walk_files(
            &settings,
            ctx.policy.limits.max_walk_depth,
            ctx.policy.limits.max_files_per_collector,
            ctx,
            collection,
            |p| has_extension(p, "json"),
        );
        for path in files {
            push_config_file(&path, root, "Jan", ctx, collection);
        }
    }
}

/// Model named on a message, either directly or in its metadata block.
fn model_of(message: &Value) -> Option<String> {
    str_field(message, &["model", "model_id"])
        .or_else(|| message.get("metadata").and_then(|m| str_field(m, &["model", "model_id"])))
}

impl Collector for JanCollector {
    fn name(&self) -> &'static str {
        "jan"
    }

    fn descriptor(&self) -> CollectorDescriptor {
        CollectorDescriptor::new(
            self.name(),
            &[Capability::JsonFiles, Capability::JsonLines, Capability::LogScan, Capability::FileMetadata],
            self.candidates.clone(),
        )
    }

    fn detect(&self) -> bool {
        self.root().is_some()
    }

    fn collect(&self, ctx: &CollectContext) -> Result<Collection> {
        let mut collection = Collection::new(self.name());
        let Some(root) = self.root() else {
            return Ok(collection);
        };
        if !usable_root(root, ctx, &mut collection) {
            return Ok(collection);
        }

        self.collect_threads(root, ctx, &mut collection);
        collect_model_directory(&root.join(MODELS_DIR), "Jan", ctx, &mut collection);
        self.collect_settings(root, ctx, &mut collection);

        let app_log = root.join(APP_LOG);
        if exists_no_follow(&app_log) {
            push_log_matches(&app_log, &keywords(LOG_KEYWORDS), ctx, &mut collection);
        }
        Ok(collection)
    }
}
