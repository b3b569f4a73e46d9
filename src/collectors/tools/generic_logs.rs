//! Keyword scan of log and cache directories for traces of AI tools.
//!
//! Directories named after an AI tool are reported as they are found. Log
//! files inside them, or whose own name mentions a keyword, are scanned line
//! by line for keyword matches.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::{DateTime, Utc};
use log::debug;
use walkdir::WalkDir;

use crate::collectors::collector::{CollectContext, Collection, Collector};
use crate::collectors::tools::common::{has_extension, push_log_matches, root_present};
use crate::constants::LOG_FILE_EXTENSIONS;
use crate::error::SourceError;
use crate::models::{ArtifactType, Capability, CollectorDescriptor, FileFacts, RawRecord};

pub struct GenericLogsCollector {
    roots: Vec<PathBuf>,
    keywords: Vec<String>,
    directory_names: HashSet<String>,
}

impl GenericLogsCollector {
    pub fn new(roots: Vec<PathBuf>, keywords: Vec<String>, directory_names: Vec<String>) -> Self {
        Self {
            roots,
            keywords,
            directory_names: directory_names.into_iter().map(|n| n.to_lowercase()).collect(),
        }
    }

    fn is_ai_directory(&self, path: &Path) -> bool {
        path.file_name()
            .map(|n| self.directory_names.contains(&n.to_string_lossy().to_lowercase()))
            .unwrap_or(false)
    }

    fn is_log_file(path: &Path) -> bool {
        LOG_FILE_EXTENSIONS.iter().any(|ext| has_extension(path, ext))
    }

    fn name_mentions_keyword(&self, path: &Path) -> bool {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        self.keywords.iter().any(|k| name.contains(&k.to_lowercase()))
    }

    /// True when `root` or a directory between it and `path` is AI-named.
    fn inside_ai_directory(&self, root: &Path, path: &Path) -> bool {
        if self.is_ai_directory(root) {
            return true;
        }
        let Some(rel) = path.parent().and_then(|p| p.strip_prefix(root).ok()) else {
            return false;
        };
        rel.components().any(|c| {
            self.directory_names
                .contains(&c.as_os_str().to_string_lossy().to_lowercase())
        })
    }

    fn walk_root(&self, root: &Path, ctx: &CollectContext, collection: &mut Collection) {
        let mut scanned = 0;
        let walker = WalkDir::new(root)
            .max_depth(ctx.policy.limits.max_walk_depth)
            .follow_links(false)
            .sort_by_file_name();

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    let path = err.path().unwrap_or(root).to_path_buf();
                    if let Some(io_err) = err.into_io_error() {
                        collection.skip(ctx, SourceError::read(&path, io_err));
                    }
                    continue;
                }
            };
            let path = entry.path();
            let file_type = entry.file_type();

            if file_type.is_symlink() {
                if Self::is_log_file(path) || self.is_ai_directory(path) {
                    collection.skip(ctx, SourceError::SymlinkSkipped { path: path.to_path_buf() });
                }
                continue;
            }

            if file_type.is_dir() {
                if entry.depth() > 0 && self.is_ai_directory(path) {
                    self.report_directory(&entry, collection);
                }
                continue;
            }

            if !file_type.is_file() || !Self::is_log_file(path) {
                continue;
            }
            if !self.inside_ai_directory(root, path) && !self.name_mentions_keyword(path) {
                continue;
            }
            if scanned >= ctx.policy.limits.max_files_per_collector {
                debug!("[generic_logs] file limit reached under {}", root.display());
                break;
            }
            scanned += 1;
            self.scan_file(path, ctx, collection);
        }
    }

    fn report_directory(&self, entry: &walkdir::DirEntry, collection: &mut Collection) {
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        let facts = entry.metadata().ok().map(|m| FileFacts {
            size: 0,
            modified: m.modified().ok().map(DateTime::<Utc>::from),
            created: m.created().ok().map(DateTime::<Utc>::from),
            sha256: None,
        });
        collection.push(
            RawRecord::new(ArtifactType::AiDirectory, path)
                .title(format!("AI-related directory: {name}"))
                .text(path.to_string_lossy())
                .meta("directory_name", name.to_lowercase())
                .record_key(path.to_string_lossy())
                .facts(facts),
        );
    }

    fn scan_file(&self, path: &Path, ctx: &CollectContext, collection: &mut Collection) {
        push_log_matches(path, &self.keywords, ctx, collection);
    }
}

impl Collector for GenericLogsCollector {
    fn name(&self) -> &'static str {
        "generic_logs"
    }

    fn descriptor(&self) -> CollectorDescriptor {
        CollectorDescriptor::new(self.name(), &[Capability::LogScan], self.roots.clone())
    }

    fn detect(&self) -> bool {
        self.roots.iter().any(|r| root_present(r))
    }

    fn collect(&self, ctx: &CollectContext) -> Result<Collection> {
        let mut collection = Collection::new(self.name());
        if self.keywords.is_empty() && self.directory_names.is_empty() {
            return Ok(collection);
        }

        for root in &self.roots {
            if crate::security::path_guard::is_symlink(root) {
                collection.skip(ctx, SourceError::SymlinkSkipped { path: root.clone() });
                continue;
            }
            if root_present(root) {
                self.walk_root(root, ctx, &mut collection);
            }
        }
        Ok(collection)
    }
}
