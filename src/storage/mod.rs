//! SQLite evidence store.
//!
//! A single WAL-mode database holds runs, per-collector outcomes and
//! artifacts. Artifacts are keyed by `(source, file_path, fingerprint)` so a
//! repeated run over unchanged sources adds no rows.

pub mod query;
pub mod schema;
pub mod store;

pub use query::{ArtifactQuery, Page, StoreStats};
pub use schema::SCHEMA_VERSION;
pub use store::Store;
