//! Helpers shared by the per-tool collectors.

use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use serde_json::Value;
use walkdir::WalkDir;

use crate::adapters::{read_json, read_text, scan_log};
use crate::collectors::collector::{CollectContext, Collection};
use crate::constants::LOG_MAX_MATCHES_PER_FILE;
use crate::error::SourceError;
use crate::models::{ArtifactType, RawRecord};
use crate::security::path_guard::{exists_no_follow, is_real_dir};

/// Detection helper: the root exists and is not a symlink.
pub fn root_present(root: &Path) -> bool {
    exists_no_follow(root) && !crate::security::path_guard::is_symlink(root)
}

/// Gate used at the top of `collect`: a symlinked root is recorded and
/// nothing beneath it is visited.
pub fn usable_root(root: &Path, ctx: &CollectContext, collection: &mut Collection) -> bool {
    if crate::security::path_guard::is_symlink(root) {
        collection.skip(ctx, SourceError::SymlinkSkipped { path: root.to_path_buf() });
        return false;
    }
    exists_no_follow(root)
}

/// Regular files under `root` accepted by `keep`, without following links.
///
/// Symlinks met on the way are counted as skipped; unreadable directories
/// are counted as read errors. At most `max_files` paths are returned.
pub fn walk_files<F>(
    root: &Path,
    max_depth: usize,
    max_files: usize,
    ctx: &CollectContext,
    collection: &mut Collection,
    mut keep: F,
) -> Vec<PathBuf>
where
    F: FnMut(&Path) -> bool,
{
    let mut files = Vec::new();
    if !is_real_dir(root) {
        return files;
    }

    for entry in WalkDir::new(root).max_depth(max_depth).follow_links(false).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                let path = err.path().unwrap_or(root).to_path_buf();
                let io_err = err
                    .into_io_error()
                    .unwrap_or_else(|| std::io::Error::new(std::io::ErrorKind::Other, "walk error"));
                collection.skip(ctx, SourceError::read(&path, io_err));
                continue;
            }
        };

        let file_type = entry.file_type();
        if file_type.is_symlink() {
            if keep(entry.path()) {
                collection.skip(ctx, SourceError::SymlinkSkipped { path: entry.path().to_path_buf() });
            }
            continue;
        }
        if !file_type.is_file() || !keep(entry.path()) {
            continue;
        }
        if files.len() >= max_files {
            debug!("[{}] file limit {} reached under {}", collection.source(), max_files, root.display());
            break;
        }
        files.push(entry.into_path());
    }

    files
}

/// Flag every credential file directly inside `dir` without opening any.
pub fn flag_credential_files(dir: &Path, ctx: &CollectContext, collection: &mut Collection) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    let mut paths: Vec<PathBuf> = entries.filter_map(|e| e.ok().map(|e| e.path())).collect();
    paths.sort();
    for path in paths {
        if ctx.policy.credentials.is_credential_file(&path) && exists_no_follow(&path) {
            collection.flag_credential_file(ctx, &path);
        }
    }
}

/// Push one configuration file as a `Config` record keyed by its path under
/// `base`. JSON is kept structured; YAML, TOML and INI stay text.
pub fn push_config_file(path: &Path, base: &Path, label: &str, ctx: &CollectContext, collection: &mut Collection) {
    let name = relative_to(path, base);
    let record = RawRecord::new(ArtifactType::Config, path)
        .title(format!("{label} {name}"))
        .meta("relative_path", name.clone())
        .record_key(name);

    let record = if has_extension(path, "json") {
        let Some((value, facts)) = collection.absorb(ctx, read_json(path, &ctx.policy)) else {
            return;
        };
        record
            .meta("key_count", value.as_object().map_or(0, |m| m.len()))
            .structured(value)
            .facts(Some(facts))
    } else {
        let Some((text, facts)) = collection.absorb(ctx, read_text(path, &ctx.policy)) else {
            return;
        };
        record.text(text).facts(Some(facts))
    };
    collection.push(record);
}

/// Scan one log file and push a `LogMatch` record per keyword hit.
pub fn push_log_matches(path: &Path, keywords: &[String], ctx: &CollectContext, collection: &mut Collection) {
    let scan = scan_log(path, &ctx.policy, keywords, LOG_MAX_MATCHES_PER_FILE);
    let Some(scan) = collection.absorb(ctx, scan) else {
        return;
    };
    if scan.long_lines > 0 || scan.dropped_matches > 0 {
        debug!(
            "[{}] {}: {} over-long lines, {} matches over the cap",
            collection.source(),
            path.display(),
            scan.long_lines,
            scan.dropped_matches
        );
    }

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    for line in scan.matches {
        collection.push(
            RawRecord::new(ArtifactType::LogMatch, path)
                .title(format!("'{}' in {}:{}", line.keyword, name, line.line_no))
                .text(line.text)
                .meta("keyword", line.keyword)
                .meta("line", line.line_no)
                .record_key(format!("line:{}", line.line_no))
                .facts(Some(scan.facts.clone())),
        );
    }
}

/// Keyword list from static strings.
pub fn keywords(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// True when `path` has the extension `ext` (case-insensitive).
pub fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .map(|e| e.to_string_lossy().eq_ignore_ascii_case(ext))
        .unwrap_or(false)
}

/// First present string field among `keys`.
pub fn str_field(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| value.get(*k))
        .find_map(|v| v.as_str())
        .map(str::to_string)
}

/// First present non-null field among `keys`.
pub fn field<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().filter_map(|k| value.get(*k)).find(|v| !v.is_null())
}

/// Flatten message content that is either a string or a list of blocks.
pub fn message_text(content: &Value) -> String {
    match content {
        Value::String(s) => s.clone(),
        Value::Array(blocks) => blocks
            .iter()
            .filter_map(|block| match block {
                Value::String(s) => Some(s.clone()),
                Value::Object(_) => str_field(block, &["text", "content"]),
                _ => None,
            })
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n"),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// `(col LIKE ? OR col LIKE ? ...)` plus the bound `%pattern%` values.
///
/// Patterns are always bound, never spliced into the SQL text.
pub fn like_filter(column: &str, patterns: &[String]) -> (String, Vec<String>) {
    let clause = patterns
        .iter()
        .map(|_| format!("{column} LIKE ?"))
        .collect::<Vec<_>>()
        .join(" OR ");
    let values = patterns.iter().map(|p| format!("%{p}%")).collect();
    (format!("({clause})"), values)
}

/// Path relative to `base`, or the full path when it is not beneath it.
pub fn relative_to(path: &Path, base: &Path) -> String {
    path.strip_prefix(base)
        .unwrap_or(path)
        .to_string_lossy()
        .into_owned()
}
