//! Chromium-family browser history (Chrome, Brave, Edge, Arc).
//!
//! Every profile directory under the browser's user-data root may hold a
//! `History` database. Only visits whose URL matches the configured AI
//! domain allowlist are kept.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use log::debug;
use rusqlite::ToSql;

use crate::adapters::SourceDb;
use crate::collectors::collector::{CollectContext, Collection, Collector};
use crate::collectors::tools::common::{like_filter, root_present, usable_root};
use crate::models::{ArtifactType, Capability, CollectorDescriptor, RawRecord, RawTimestamp};
use crate::security::path_guard::{exists_no_follow, is_real_dir};

const HISTORY_TABLES: &[&str] = &["urls", "visits"];

struct Visit {
    id: i64,
    url: String,
    title: Option<String>,
    visit_time: i64,
    visit_count: i64,
}

pub struct ChromiumCollector {
    name: &'static str,
    root: PathBuf,
    url_patterns: Vec<String>,
}

impl ChromiumCollector {
    pub fn new(name: &'static str, root: PathBuf, url_patterns: Vec<String>) -> Self {
        Self { name, root, url_patterns }
    }

    /// `History` files of every profile, sorted by profile name.
    fn history_files(&self) -> Vec<PathBuf> {
        let Ok(entries) = fs::read_dir(&self.root) else {
            return Vec::new();
        };
        let mut files: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| is_real_dir(p))
            .map(|p| p.join("History"))
            .filter(|p| exists_no_follow(p))
            .collect();
        files.sort();
        files
    }

    fn collect_profile(&self, path: &Path, ctx: &CollectContext, collection: &mut Collection) {
        let db = match SourceDb::open_with_tables(path, &ctx.policy, HISTORY_TABLES) {
            Ok(Some(db)) => db,
            Ok(None) => return,
            Err(err) => {
                collection.skip(ctx, err);
                return;
            }
        };

        let (clause, likes) = like_filter("urls.url", &self.url_patterns);
        let sql = format!(
            "SELECT visits.id, urls.url, urls.title, visits.visit_time, urls.visit_count \
             FROM visits JOIN urls ON urls.id = visits.url \
             WHERE {clause} ORDER BY visits.visit_time"
        );
        let params: Vec<&dyn ToSql> = likes.iter().map(|s| s as &dyn ToSql).collect();

        let visits = db.query(&sql, &params, |row| {
            Ok(Visit {
                id: row.get(0)?,
                url: row.get(1)?,
                title: row.get(2)?,
                visit_time: row.get(3)?,
                visit_count: row.get(4)?,
            })
        });
        let Some(visits) = collection.absorb(ctx, visits) else {
            return;
        };
        collection.count_format_errors(visits.malformed);

        let profile = path
            .parent()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        debug!("[{}] {} AI visits in profile {}", self.name, visits.rows.len(), profile);

        for visit in visits.rows {
            let title = visit.title.filter(|t| !t.is_empty());
            let text = match &title {
                Some(t) => format!("{t} {}", visit.url),
                None => visit.url.clone(),
            };
            collection.push(
                RawRecord::new(ArtifactType::BrowserHistory, path)
                    .timestamp(RawTimestamp::Chrome(visit.visit_time))
                    .title(title.unwrap_or_else(|| "Untitled visit".to_string()))
                    .text(text)
                    .meta("url", visit.url)
                    .meta("visit_count", visit.visit_count)
                    .meta("browser", self.name)
                    .meta("profile", profile.clone())
                    .record_key(format!("visit:{}", visit.id))
                    .facts(Some(db.facts().clone())),
            );
        }
    }
}

impl Collector for ChromiumCollector {
    fn name(&self) -> &'static str {
        self.name
    }

    fn descriptor(&self) -> CollectorDescriptor {
        CollectorDescriptor::new(self.name, &[Capability::EmbeddedDatabase], vec![self.root.clone()])
    }

    fn detect(&self) -> bool {
        root_present(&self.root) && !self.history_files().is_empty()
    }

    fn collect(&self, ctx: &CollectContext) -> Result<Collection> {
        let mut collection = Collection::new(self.name);
        if !usable_root(&self.root, ctx, &mut collection) || self.url_patterns.is_empty() {
            return Ok(collection);
        }

        for path in self.history_files() {
            self.collect_profile(&path, ctx, &mut collection);
        }
        Ok(collection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::CHROME_EPOCH_OFFSET_SECS;
    use rusqlite::Connection;
    use tempfile::TempDir;

    fn chrome_time(unix_secs: i64) -> i64 {
        (unix_secs + CHROME_EPOCH_OFFSET_SECS) * 1_000_000
    }

    fn fixture(root: &Path, profile: &str) {
        let dir = root.join(profile);
        fs::create_dir_all(&dir).unwrap();
        let conn = Connection::open(dir.join("History")).unwrap();
        conn.execute_batch(
            "CREATE TABLE urls (id INTEGER PRIMARY KEY, url TEXT, title TEXT, visit_count INTEGER);
             CREATE TABLE visits (id INTEGER PRIMARY KEY, url INTEGER, visit_time INTEGER);",
        )
        .unwrap();
        conn.execute(
            "INSERT INTO urls VALUES (1, 'https://claude.ai/chat/abc', 'Claude', 3), (2, 'https://news.example.com', 'News', 9)",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO visits VALUES (10, 1, ?1), (11, 2, ?1)",
            [chrome_time(1_705_314_600)],
        )
        .unwrap();
    }

    #[test]
    fn test_only_allowlisted_visits() {
        let dir = TempDir::new().unwrap();
        fixture(dir.path(), "Default");
        fixture(dir.path(), "Profile 1");

        let collector = ChromiumCollector::new("chrome", dir.path().to_path_buf(), vec!["claude.ai".to_string()]);
        assert!(collector.detect());

        let collection = collector.collect(&CollectContext::default()).unwrap();
        assert_eq!(collection.len(), 2);
        let record = &collection.records()[0];
        assert_eq!(record.timestamp, RawTimestamp::Chrome(chrome_time(1_705_314_600)));
        assert_eq!(record.metadata["profile"], "Default");
        assert_eq!(record.record_key.as_deref(), Some("visit:10"));
    }

    #[test]
    fn test_empty_allowlist_collects_nothing() {
        let dir = TempDir::new().unwrap();
        fixture(dir.path(), "Default");
        let collector = ChromiumCollector::new("brave", dir.path().to_path_buf(), Vec::new());
        assert!(collector.collect(&CollectContext::default()).unwrap().is_empty());
    }

    #[test]
    fn test_not_detected_without_history() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("Default")).unwrap();
        let collector = ChromiumCollector::new("edge", dir.path().to_path_buf(), vec!["claude.ai".into()]);
        assert!(!collector.detect());
    }
}
