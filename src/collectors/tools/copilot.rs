//! GitHub Copilot: the desktop data directory, the shared editor config
//! in `~/.config/github-copilot` and the VS Code extension host logs.
//!
//! `hosts.json` and `apps.json` carry OAuth tokens for every editor plugin
//! and are only flagged.

use std::path::{Component, Path, PathBuf};

use anyhow::Result;
use log::debug;
use serde_json::json;

use crate::adapters::read_jsonl;
use crate::collectors::collector::{CollectContext, Collection, Collector};
use crate::collectors::tools::common::{
    has_extension, keywords, push_config_file, push_log_matches, relative_to, root_present, usable_root, walk_files,
};
use crate::models::{ArtifactType, Capability, CollectorDescriptor, RawRecord};
use crate::security::path_guard::exists_no_follow;

const TOKEN_FILES: &[&str] = &["hosts.json", "apps.json"];
const CONFIG_EXTENSIONS: &[&str] = &["json", "yaml", "yml"];

/// `logs/<session>/window1/exthost/GitHub.copilot-chat/<file>.log`
const VSCODE_LOG_DEPTH: usize = 5;
const EXTENSION_DIR_PREFIX: &str = "github.copilot";
const LOG_KEYWORDS: &[&str] = &["copilot", "model", "completion", "chat", "request"];

pub struct CopilotCollector {
    root: PathBuf,
    config_dir: PathBuf,
    vscode_logs: PathBuf,
}

impl CopilotCollector {
    pub fn new(root: PathBuf, config_dir: PathBuf, vscode_logs: PathBuf) -> Self {
        Self {
            root,
            config_dir,
            vscode_logs,
        }
    }

    fn flag_token_files(&self, dir: &Path, ctx: &CollectContext, collection: &mut Collection) {
        for name in TOKEN_FILES {
            let path = dir.join(name);
            if exists_no_follow(&path) {
                collection.flag_credential_file(ctx, &path);
            }
        }
    }

    fn is_token_file(path: &Path) -> bool {
        path.file_name()
            .map(|n| TOKEN_FILES.iter().any(|t| n.to_string_lossy().eq_ignore_ascii_case(t)))
            .unwrap_or(false)
    }

    /// Root-level JSON is configuration; JSON and JSON Lines below it are
    /// usage data.
    fn collect_data_dir(&self, ctx: &CollectContext, collection: &mut Collection) {
        self.flag_token_files(&self.root, ctx, collection);
        let files = walk_files(
            &self.root,
            ctx.policy.limits.max_walk_depth,
            ctx.policy.limits.max_files_per_collector,
            ctx,
            collection,
            |p| (has_extension(p, "json") || has_extension(p, "jsonl")) && !Self::is_token_file(p),
        );

        for path in files {
            if has_extension(&path, "jsonl") {
                self.push_usage_lines(&path, ctx, collection);
            } else {
                let label = if path.parent() == Some(self.root.as_path()) {
                    "GitHub Copilot"
                } else {
                    "GitHub Copilot usage"
                };
                push_config_file(&path, &self.root, label, ctx, collection);
            }
        }
    }

    fn push_usage_lines(&self, path: &Path, ctx: &CollectContext, collection: &mut Collection) {
        let Some(lines) = collection.absorb(ctx, read_jsonl(path, &ctx.policy)) else {
            return;
        };
        collection.count_format_errors(lines.malformed);
        let name = relative_to(path, &self.root);
        let first = lines.records.first().map(|(_, v)| v.clone());

        collection.push(
            RawRecord::new(ArtifactType::HistoryEntry, path)
                .title(format!("GitHub Copilot usage {name}: {} entries", lines.records.len()))
                .structured(json!({ "first_entry": first }))
                .meta("entry_count", lines.records.len())
                .meta("relative_path", name.clone())
                .record_key(name)
                .facts(Some(lines.facts.clone())),
        );
    }

    fn collect_config_dir(&self, ctx: &CollectContext, collection: &mut Collection) {
        self.flag_token_files(&self.config_dir, ctx, collection);
        let files = walk_files(
            &self.config_dir,
            ctx.policy.limits.max_walk_depth,
            ctx.policy.limits.max_files_per_collector,
            ctx,
            collection,
            |p| CONFIG_EXTENSIONS.iter().any(|ext| has_extension(p, ext)) && !Self::is_token_file(p),
        );
        for path in files {
            push_config_file(&path, &self.config_dir, "Copilot config", ctx, collection);
        }
    }

    fn collect_extension_logs(&self, ctx: &CollectContext, collection: &mut Collection) {
        let logs = &self.vscode_logs;
        let files = walk_files(
            logs,
            VSCODE_LOG_DEPTH,
            ctx.policy.limits.max_files_per_collector,
            ctx,
            collection,
            |p| has_extension(p, "log") && in_copilot_extension_dir(p, logs),
        );
        debug!("[copilot] {} extension log files", files.len());

        let words = keywords(LOG_KEYWORDS);
        for path in files {
            push_log_matches(&path, &words, ctx, collection);
        }
    }
}

/// True when a directory between `base` and `path` is a Copilot extension
/// log directory (`GitHub.copilot`, `GitHub.copilot-chat`).
fn in_copilot_extension_dir(path: &Path, base: &Path) -> bool {
    let Ok(relative) = path.strip_prefix(base) else {
        return false;
    };
    let Some(parent) = relative.parent() else {
        return false;
    };
    parent.components().any(|c| match c {
        Component::Normal(part) => part.to_string_lossy().to_lowercase().starts_with(EXTENSION_DIR_PREFIX),
        _ => false,
    })
}

impl Collector for CopilotCollector {
    fn name(&self) -> &'static str {
        "copilot"
    }

    fn descriptor(&self) -> CollectorDescriptor {
        CollectorDescriptor::new(
            self.name(),
            &[Capability::JsonFiles, Capability::JsonLines, Capability::LogScan],
            vec![self.root.clone(), self.config_dir.clone(), self.vscode_logs.clone()],
        )
    }

    fn detect(&self) -> bool {
        root_present(&self.root) || root_present(&self.config_dir)
    }

    fn collect(&self, ctx: &CollectContext) -> Result<Collection> {
        let mut collection = Collection::new(self.name());

        if usable_root(&self.root, ctx, &mut collection) {
            self.collect_data_dir(ctx, &mut collection);
        }
        if usable_root(&self.config_dir, ctx, &mut collection) {
            self.collect_config_dir(ctx, &mut collection);
        }
        if usable_root(&self.vscode_logs, ctx, &mut collection) {
            self.collect_extension_logs(ctx, &mut collection);
        }
        Ok(collection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        root: PathBuf,
        config_dir: PathBuf,
        logs: PathBuf,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("GitHub Copilot");
        let config_dir = dir.path().join("github-copilot");
        let logs = dir.path().join("Code").join("logs");

        fs::create_dir_all(root.join("telemetry")).unwrap();
        fs::write(root.join("settings.json"), json!({"enableAutoCompletions": true}).to_string()).unwrap();
        fs::write(
            root.join("telemetry").join("events.jsonl"),
            format!("{}\n{}\n", json!({"event": "accepted"}), json!({"event": "shown"})),
        )
        .unwrap();

        fs::create_dir_all(&config_dir).unwrap();
        fs::write(
            config_dir.join("hosts.json"),
            json!({"github.com": {"user": "octo", "oauth_token": "gho_never_read"}}).to_string(),
        )
        .unwrap();
        fs::write(config_dir.join("versions.json"), json!({"vscode": "1.250.0"}).to_string()).unwrap();

        let exthost = logs.join("20250104T101500").join("window1").join("exthost");
        fs::create_dir_all(exthost.join("GitHub.copilot-chat")).unwrap();
        fs::create_dir_all(exthost.join("vscode.git")).unwrap();
        fs::write(
            exthost.join("GitHub.copilot-chat").join("GitHub Copilot Chat.log"),
            "2025-01-04 10:15:00 [info] Logged in as octo\n2025-01-04 10:16:02 [info] request done: model gpt-4o\n",
        )
        .unwrap();
        fs::write(exthost.join("vscode.git").join("Git.log"), "chat about git\n").unwrap();

        Fixture {
            _dir: dir,
            root,
            config_dir,
            logs,
        }
    }

    #[test]
    fn test_copilot_sources() {
        let f = fixture();
        let collector = CopilotCollector::new(f.root.clone(), f.config_dir.clone(), f.logs.clone());
        assert!(collector.detect());
        let collection = collector.collect(&CollectContext::default()).unwrap();
        let records = collection.records();

        let configs: Vec<_> = records
            .iter()
            .filter(|r| r.artifact_type == ArtifactType::Config)
            .map(|r| r.title.clone().unwrap_or_default())
            .collect();
        assert_eq!(configs, vec!["GitHub Copilot settings.json", "Copilot config versions.json"]);

        let usage = records.iter().find(|r| r.artifact_type == ArtifactType::HistoryEntry).unwrap();
        assert_eq!(usage.metadata["entry_count"], 2);
        assert_eq!(usage.record_key.as_deref(), Some("telemetry/events.jsonl"));

        let logs: Vec<_> = records
            .iter()
            .filter(|r| r.artifact_type == ArtifactType::LogMatch)
            .collect();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].metadata["line"], 2);
        assert!(logs[0].origin.ends_with("GitHub Copilot Chat.log"));
    }

    #[test]
    fn test_token_files_flagged_not_read() {
        let f = fixture();
        let collection = CopilotCollector::new(f.root.clone(), f.config_dir.clone(), f.logs.clone())
            .collect(&CollectContext::default())
            .unwrap();

        let flagged: Vec<_> = collection
            .records()
            .iter()
            .filter(|r| r.artifact_type == ArtifactType::CredentialFile)
            .collect();
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].origin, f.config_dir.join("hosts.json"));
        assert_eq!(collection.skips().credential_files, 1);
        for record in collection.records() {
            assert!(!format!("{:?}", record).contains("gho_never_read"));
        }
    }

    #[test]
    fn test_extension_dir_match() {
        let base = Path::new("/logs");
        assert!(in_copilot_extension_dir(
            Path::new("/logs/s/window1/exthost/GitHub.copilot/GitHub Copilot.log"),
            base
        ));
        assert!(!in_copilot_extension_dir(Path::new("/logs/s/window1/renderer.log"), base));
        assert!(!in_copilot_extension_dir(Path::new("/elsewhere/GitHub.copilot/a.log"), base));
    }
}
