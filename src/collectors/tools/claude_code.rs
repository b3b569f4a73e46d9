//! Claude Code CLI (`~/.claude`).

use std::path::PathBuf;

use anyhow::Result;
use log::debug;
use serde_json::Value;

use crate::adapters::{read_json, read_text};
use crate::collectors::collector::{CollectContext, Collection, Collector};
use crate::collectors::tools::common::{flag_credential_files, has_extension, root_present, usable_root, walk_files};
use crate::collectors::tools::transcripts::{collect_history, collect_session};
use crate::constants::REDACTION_MARKER;
use crate::models::{ArtifactType, Capability, CollectorDescriptor, RawRecord};

const SETTINGS_FILES: &[&str] = &["settings.json", "settings.local.json"];

/// Session transcripts live at `projects/<project>/<session>.jsonl`, with
/// sub-agent transcripts one or two levels deeper.
const SESSION_DEPTH: usize = 4;

pub struct ClaudeCodeCollector {
    root: PathBuf,
}

impl ClaudeCodeCollector {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn collect_settings(&self, ctx: &CollectContext, collection: &mut Collection) {
        for name in SETTINGS_FILES {
            let path = self.root.join(name);
            if !path.exists() {
                continue;
            }
            let Some((mut value, facts)) = collection.absorb(ctx, read_json(&path, &ctx.policy)) else {
                continue;
            };

            let env_names = mask_env_block(&mut value);
            collection.push(
                RawRecord::new(ArtifactType::Config, &path)
                    .title(format!("Claude Code {name}"))
                    .structured(value)
                    .meta("env_variable_count", env_names)
                    .record_key(*name)
                    .facts(Some(facts)),
            );
        }
    }

    fn collect_plans(&self, ctx: &CollectContext, collection: &mut Collection) {
        let plans = self.root.join("plans");
        let files = walk_files(&plans, 1, ctx.policy.limits.max_files_per_collector, ctx, collection, |p| {
            has_extension(p, "md")
        });
        for path in files {
            let Some((text, facts)) = collection.absorb(ctx, read_text(&path, &ctx.policy)) else {
                continue;
            };
            let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
            collection.push(
                RawRecord::new(ArtifactType::Plan, &path)
                    .title(format!("Plan {name}"))
                    .text(text)
                    .record_key(name)
                    .facts(Some(facts)),
            );
        }
    }
}

/// Replace every value of the `env` block with the marker. Returns the
/// number of variables found.
pub(crate) fn mask_env_block(value: &mut Value) -> usize {
    match value.get_mut("env") {
        Some(Value::Object(env)) => {
            for v in env.values_mut() {
                *v = Value::String(REDACTION_MARKER.to_string());
            }
            env.len()
        }
        _ => 0,
    }
}

impl Collector for ClaudeCodeCollector {
    fn name(&self) -> &'static str {
        "claude_code"
    }

    fn descriptor(&self) -> CollectorDescriptor {
        CollectorDescriptor::new(
            self.name(),
            &[Capability::JsonLines, Capability::JsonFiles],
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
            let added = collect_history(&history, ctx, &mut collection);
            debug!("[claude_code] {} history entries", added);
        }

        let sessions = walk_files(
            &self.root.join("projects"),
            SESSION_DEPTH,
            ctx.policy.limits.max_files_per_collector,
            ctx,
            &mut collection,
            |p| has_extension(p, "jsonl"),
        );
        for path in &sessions {
            collect_session(path, ctx, &mut collection);
        }
        debug!("[claude_code] parsed {} session files", sessions.len());

        self.collect_settings(ctx, &mut collection);
        self.collect_plans(ctx, &mut collection);

        Ok(collection)
    }
}
