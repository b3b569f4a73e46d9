//! OpenAI Codex CLI (`~/.codex`).

use std::path::PathBuf;

use anyhow::Result;
use log::debug;

use crate::adapters::read_text;
use crate::collectors::collector::{CollectContext, Collection, Collector};
use crate::collectors::tools::common::{flag_credential_files, has_extension, root_present, usable_root, walk_files};
use crate::collectors::tools::transcripts::{collect_history, collect_session};
use crate::models::{ArtifactType, Capability, CollectorDescriptor, RawRecord};

const SESSION_DIRS: &[&str] = &["sessions", "projects"];

/// `sessions/YYYY/MM/DD/rollout-*.jsonl`
const SESSION_DEPTH: usize = 5;

pub struct CodexCollector {
    root: PathBuf,
}

impl CodexCollector {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

impl Collector for CodexCollector {
    fn name(&self) -> &'static str {
        "codex"
    }

    fn descriptor(&self) -> CollectorDescriptor {
        CollectorDescriptor::new(
            self.name(),
            &[Capability::JsonLines, Capability::FileMetadata],
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

        flag_credential_files(&self.root, ctx, &mut collection);

        let history = self.root.join("history.jsonl");
        if history.exists() {
            collect_history(&history, ctx, &mut collection);
        }

        let mut session_files = 0;
        for dir in SESSION_DIRS {
            let files = walk_files(
                &self.root.join(dir),
                SESSION_DEPTH,
                ctx.policy.limits.max_files_per_collector,
                ctx,
                &mut collection,
                |p| has_extension(p, "jsonl"),
            );
            session_files += files.len();
            for path in &files {
                collect_session(path, ctx, &mut collection);
            }
        }
        debug!("[codex] parsed {} session files", session_files);

        let config = self.root.join("config.toml");
        if config.exists() {
            if let Some((text, facts)) = collection.absorb(ctx, read_text(&config, &ctx.policy)) {
                collection.push(
                    RawRecord::new(ArtifactType::Config, &config)
                        .title("Codex config.toml")
                        .text(text)
                        .record_key("config.toml")
                        .facts(Some(facts)),
                );
            }
        }

        Ok(collection)
    }
}
