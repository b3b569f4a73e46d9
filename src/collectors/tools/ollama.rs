//! Ollama local model runner (`~/.ollama`).
//!
//! Manifests name the installed models and their layer digests. Model blobs
//! are never opened.

use std::path::{Path, PathBuf};

use anyhow::Result;
use log::debug;
use serde_json::{json, Value};

use crate::adapters::{read_json, read_text};
use crate::collectors::collector::{CollectContext, Collection, Collector};
use crate::collectors::tools::common::{root_present, usable_root, walk_files};
use crate::models::{meta_keys, ArtifactType, Capability, CollectorDescriptor, RawRecord};

/// `models/manifests/<registry>/<namespace>/<model>/<tag>`
const MANIFEST_DEPTH: usize = 4;

pub struct OllamaCollector {
    root: PathBuf,
}

/// Summary of one manifest kept for the inventory record.
struct ModelEntry {
    name: String,
    layers: usize,
    size: u64,
    config_digest: Option<String>,
}

impl OllamaCollector {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn manifests_dir(&self) -> PathBuf {
        self.root.join("models").join("manifests")
    }

    fn collect_manifests(&self, ctx: &CollectContext, collection: &mut Collection) {
        let dir = self.manifests_dir();
        let files = walk_files(
            &dir,
            MANIFEST_DEPTH,
            ctx.policy.limits.max_files_per_collector,
            ctx,
            collection,
            |_| true,
        );

        let mut inventory = Vec::new();
        for path in files {
            let Some((manifest, facts)) = collection.absorb(ctx, read_json(&path, &ctx.policy)) else {
                continue;
            };
            let entry = summarize(&path, &dir, &manifest);

            collection.push(
                RawRecord::new(ArtifactType::ModelManifest, &path)
                    .title(format!("Ollama model {} ({} layers)", entry.name, entry.layers))
                    .structured(manifest)
                    .meta(meta_keys::MODEL, entry.name.clone())
                    .meta("layer_count", entry.layers)
                    .meta("total_size_bytes", entry.size)
                    .meta("config_digest", entry.config_digest.clone())
                    .record_key(entry.name.clone())
                    .facts(Some(facts)),
            );
            inventory.push(entry);
        }
        debug!("[ollama] {} model manifests", inventory.len());

        if inventory.is_empty() {
            return;
        }
        let models: Vec<Value> = inventory
            .iter()
            .map(|e| json!({"name": e.name, "layers": e.layers, "size_bytes": e.size}))
            .collect();
        collection.push(
            RawRecord::new(ArtifactType::ModelInventory, &dir)
                .title(format!("Ollama: {} models installed", inventory.len()))
                .structured(json!({ "models": models }))
                .meta("model_count", inventory.len())
                .meta("total_size_bytes", inventory.iter().map(|e| e.size).sum::<u64>())
                .record_key("model_inventory"),
        );
    }

    fn collect_history(&self, ctx: &CollectContext, collection: &mut Collection) {
        let path = self.root.join("history");
        if !root_present(&path) {
            return;
        }
        let Some((text, facts)) = collection.absorb(ctx, read_text(&path, &ctx.policy)) else {
            return;
        };

        for (idx, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            collection.push(
                RawRecord::new(ArtifactType::HistoryEntry, &path)
                    .title("Ollama REPL prompt")
                    .text(line)
                    .meta("line", idx + 1)
                    .record_key(format!("line:{}", idx + 1))
                    .facts(Some(facts.clone())),
            );
        }
    }
}

fn summarize(path: &Path, manifests_dir: &Path, manifest: &Value) -> ModelEntry {
    let layers = manifest
        .get("layers")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    let size = layers
        .iter()
        .filter_map(|l| l.get("size").and_then(Value::as_u64))
        .sum();

    ModelEntry {
        name: model_name(path, manifests_dir),
        layers: layers.len(),
        size,
        config_digest: manifest
            .pointer("/config/digest")
            .and_then(Value::as_str)
            .map(str::to_string),
    }
}

/// `registry.ollama.ai/library/llama3/latest` becomes `llama3:latest`;
/// models outside the default namespace keep it (`user/model:tag`).
fn model_name(path: &Path, manifests_dir: &Path) -> String {
    let parts: Vec<String> = path
        .strip_prefix(manifests_dir)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();

    match parts.as_slice() {
        [_, namespace, model, tag] if namespace == "library" => format!("{model}:{tag}"),
        [_, namespace, model, tag] => format!("{namespace}/{model}:{tag}"),
        _ => parts.join("/"),
    }
}

impl Collector for OllamaCollector {
    fn name(&self) -> &'static str {
        "ollama"
    }

    fn descriptor(&self) -> CollectorDescriptor {
        CollectorDescriptor::new(
            self.name(),
            &[Capability::JsonFiles, Capability::FileMetadata],
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

        self.collect_manifests(ctx, &mut collection);
        self.collect_history(ctx, &mut collection);
        Ok(collection)
    }
}
