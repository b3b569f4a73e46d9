//! Safari history (`~/Library/Safari/History.db`, Cocoa timestamps).

use std::path::PathBuf;

use anyhow::Result;
use rusqlite::ToSql;

use crate::adapters::SourceDb;
use crate::collectors::collector::{CollectContext, Collection, Collector};
use crate::collectors::tools::common::{like_filter, root_present};
use crate::models::{ArtifactType, Capability, CollectorDescriptor, RawRecord, RawTimestamp};

const HISTORY_TABLES: &[&str] = &["history_items", "history_visits"];

pub struct SafariCollector {
    history: PathBuf,
    url_patterns: Vec<String>,
}

impl SafariCollector {
    pub fn new(history: PathBuf, url_patterns: Vec<String>) -> Self {
        Self { history, url_patterns }
    }
}

impl Collector for SafariCollector {
    fn name(&self) -> &'static str {
        "safari"
    }

    fn descriptor(&self) -> CollectorDescriptor {
        CollectorDescriptor::new(self.name(), &[Capability::EmbeddedDatabase], vec![self.history.clone()])
    }

    fn detect(&self) -> bool {
        root_present(&self.history)
    }

    fn collect(&self, ctx: &CollectContext) -> Result<Collection> {
        let mut collection = Collection::new(self.name());
        if self.url_patterns.is_empty() {
            return Ok(collection);
        }

        let db = match SourceDb::open_with_tables(&self.history, &ctx.policy, HISTORY_TABLES) {
            Ok(Some(db)) => db,
            Ok(None) => return Ok(collection),
            Err(err) => {
                collection.skip(ctx, err);
                return Ok(collection);
            }
        };

        let (clause, likes) = like_filter("history_items.url", &self.url_patterns);
        let sql = format!(
            "SELECT history_visits.id, history_items.url, history_visits.title, history_visits.visit_time \
             FROM history_visits JOIN history_items ON history_items.id = history_visits.history_item \
             WHERE {clause} ORDER BY history_visits.visit_time"
        );
        let params: Vec<&dyn ToSql> = likes.iter().map(|s| s as &dyn ToSql).collect();

        let rows = db.query(&sql, &params, |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, f64>(3)?,
            ))
        });
        let Some(rows) = collection.absorb(ctx, rows) else {
            return Ok(collection);
        };
        collection.count_format_errors(rows.malformed);

        for (id, url, title, visit_time) in rows.rows {
            let title = title.filter(|t| !t.is_empty());
            collection.push(
                RawRecord::new(ArtifactType::BrowserHistory, &self.history)
                    .timestamp(RawTimestamp::Cocoa(visit_time))
                    .title(title.clone().unwrap_or_else(|| "Untitled visit".to_string()))
                    .text(match title {
                        Some(t) => format!("{t} {url}"),
                        None => url.clone(),
                    })
                    .meta("url", url)
                    .meta("browser", "safari")
                    .record_key(format!("visit:{id}"))
                    .facts(Some(db.facts().clone())),
            );
        }

        Ok(collection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;
    use tempfile::TempDir;

    #[test]
    fn test_safari_history() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("History.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE history_items (id INTEGER PRIMARY KEY, url TEXT);
             CREATE TABLE history_visits (id INTEGER PRIMARY KEY, history_item INTEGER, visit_time REAL, title TEXT);
             INSERT INTO history_items VALUES (1, 'https://chatgpt.com/c/1'), (2, 'https://example.org');
             INSERT INTO history_visits VALUES (5, 1, 727000000.5, 'ChatGPT'), (6, 2, 727000100.0, 'Example');",
        )
        .unwrap();
        drop(conn);

        let collector = SafariCollector::new(path, vec!["chatgpt.com".to_string()]);
        assert!(collector.detect());
        let collection = collector.collect(&CollectContext::default()).unwrap();
        assert_eq!(collection.len(), 1);
        assert_eq!(collection.records()[0].timestamp, RawTimestamp::Cocoa(727000000.5));
    }
}
