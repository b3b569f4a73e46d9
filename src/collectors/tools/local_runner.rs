//! Pieces shared by the desktop model runners (LM Studio, GPT4All, Jan).
//!
//! Runners keep downloaded weights next to small JSON/YAML manifests and
//! store chats as one JSON document per conversation. Weights are only
//! sized, never opened.

use std::fs;
use std::path::Path;

use log::debug;
use serde_json::{json, Value};

use crate::adapters::{read_json, read_text};
use crate::collectors::collector::{CollectContext, Collection};
use crate::collectors::tools::common::{field, has_extension, message_text, relative_to, str_field, walk_files};
use crate::models::{meta_keys, ArtifactType, RawRecord, RawTimestamp};

const MANIFEST_EXTENSIONS: &[&str] = &["json", "yaml", "yml"];

/// Weight files listed individually in the inventory record.
const INVENTORY_LISTED_FILES: usize = 100;

const BYTES_PER_GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Inventory a model directory: one `ModelManifest` per manifest file and
/// one `ModelInventory` summarizing every file found.
pub fn collect_model_directory(models_dir: &Path, label: &str, ctx: &CollectContext, collection: &mut Collection) {
    collect_model_files(models_dir, ctx.policy.limits.max_walk_depth, label, |_| true, ctx, collection);
}

/// [`collect_model_directory`] restricted to files accepted by `keep`, for
/// runners that mix weights with their other data.
pub fn collect_model_files<F>(
    models_dir: &Path,
    max_depth: usize,
    label: &str,
    keep: F,
    ctx: &CollectContext,
    collection: &mut Collection,
) where
    F: FnMut(&Path) -> bool,
{
    let files = walk_files(
        models_dir,
        max_depth,
        ctx.policy.limits.max_files_per_collector,
        ctx,
        collection,
        keep,
    );
    if files.is_empty() {
        return;
    }

    let mut total_size = 0u64;
    let mut manifests = 0usize;
    let mut weights = Vec::new();
    for path in &files {
        let size = fs::symlink_metadata(path).map(|m| m.len()).unwrap_or(0);
        total_size += size;

        if MANIFEST_EXTENSIONS.iter().any(|ext| has_extension(path, ext)) {
            if push_manifest(path, models_dir, label, ctx, collection) {
                manifests += 1;
            }
        } else {
            weights.push(json!({"path": relative_to(path, models_dir), "size_bytes": size}));
        }
    }
    debug!("[{}] {} model files, {} manifests", collection.source(), files.len(), manifests);

    let weight_count = weights.len();
    weights.truncate(INVENTORY_LISTED_FILES);
    collection.push(
        RawRecord::new(ArtifactType::ModelInventory, models_dir)
            .title(format!(
                "{label}: {} model files, {:.1} GB total",
                files.len(),
                total_size as f64 / BYTES_PER_GIB
            ))
            .structured(json!({ "files": weights }))
            .meta("total_files", files.len())
            .meta("metadata_files", manifests)
            .meta("binary_files", weight_count)
            .meta("total_size_bytes", total_size)
            .record_key("model_inventory"),
    );
}

fn push_manifest(path: &Path, models_dir: &Path, label: &str, ctx: &CollectContext, collection: &mut Collection) -> bool {
    let name = relative_to(path, models_dir);
    let record = RawRecord::new(ArtifactType::ModelManifest, path)
        .title(format!("{label} model manifest {name}"))
        .record_key(name.clone());

    let record = if has_extension(path, "json") {
        let Some((value, facts)) = collection.absorb(ctx, read_json(path, &ctx.policy)) else {
            return false;
        };
        record
            .meta(meta_keys::MODEL, str_field(&value, &["name", "model", "modelName", "id"]))
            .structured(value)
            .facts(Some(facts))
    } else {
        let Some((text, facts)) = collection.absorb(ctx, read_text(path, &ctx.policy)) else {
            return false;
        };
        record.text(text).facts(Some(facts))
    };
    collection.push(record.meta("relative_path", name));
    true
}

/// Text of one chat message. LM Studio keeps alternative replies under
/// `versions`, with `currentlySelected` naming the one shown.
pub fn message_body(message: &Value) -> String {
    if let Some(versions) = message.get("versions").and_then(Value::as_array) {
        let selected = message
            .get("currentlySelected")
            .and_then(Value::as_u64)
            .unwrap_or(0) as usize;
        if let Some(version) = versions.get(selected).or_else(|| versions.first()) {
            return message_body(version);
        }
    }
    match field(message, &["content", "text", "message", "value"]) {
        Some(Value::Array(blocks)) => blocks
            .iter()
            .map(|block| match block.pointer("/text/value").and_then(Value::as_str) {
                Some(text) => text.to_string(),
                None => message_text(&Value::Array(vec![block.clone()])),
            })
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n"),
        Some(other) => message_text(other),
        None => String::new(),
    }
}

/// Role of a chat message, following `versions` like [`message_body`].
pub fn message_role(message: &Value) -> Option<String> {
    str_field(message, &["role", "type", "sender"]).or_else(|| {
        message
            .get("versions")
            .and_then(Value::as_array)
            .and_then(|v| v.first())
            .and_then(|v| str_field(v, &["role", "type", "sender"]))
    })
}

/// One conversation stored as a JSON document: an object carrying a title
/// and a message list, or a bare message array. `session` names the
/// conversation when the document does not.
pub fn push_conversation_file(
    path: &Path,
    base: &Path,
    label: &str,
    session: &str,
    ctx: &CollectContext,
    collection: &mut Collection,
) {
    let Some((value, facts)) = collection.absorb(ctx, read_json(path, &ctx.policy)) else {
        return;
    };

    let (messages, title, model) = match &value {
        Value::Object(_) => (
            field(&value, &["messages", "conversation", "chats"])
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default(),
            str_field(&value, &["title", "name"]).filter(|t| !t.is_empty()),
            str_field(&value, &["model", "model_id", "modelId"])
                .or_else(|| str_field(value.pointer("/assistants/0/model").unwrap_or(&Value::Null), &["id"])),
        ),
        Value::Array(items) => (items.clone(), None, None),
        _ => {
            collection.count_format_errors(1);
            return;
        }
    };
    let model = model.or_else(|| messages.iter().find_map(|m| str_field(m, &["model"])));
    let text = messages
        .iter()
        .map(message_body)
        .filter(|t| !t.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    let timestamp = field(&value, &["updatedAt", "updated_at", "updated", "createdAt", "created_at", "created"])
        .map(RawTimestamp::from_json)
        .unwrap_or_default();
    let session = str_field(&value, &["id", "conversation_id", "chat_id"]).unwrap_or_else(|| session.to_string());
    let name = relative_to(path, base);

    collection.push(
        RawRecord::new(ArtifactType::Conversation, path)
            .timestamp(timestamp)
            .title(title.unwrap_or_else(|| format!("{label} conversation {session}")))
            .text(text)
            .meta(meta_keys::SESSION_ID, session)
            .meta(meta_keys::MODEL, model)
            .meta("message_count", messages.len())
            .meta("relative_path", name.clone())
            .record_key(name)
            .facts(Some(facts)),
    );
}
