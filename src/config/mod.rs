//! Configuration management.
//!
//! A single YAML document ([`CollectionConfig`]) carries the store location,
//! read limits, per-tool source roots and the data-driven policies (AI domain
//! allowlist, log keywords, credential file names).

mod collection_config;
mod default_configs;
mod paths;

pub use collection_config::{load_or_create_config, CollectionConfig, Limits, SourcePaths};

pub use default_configs::{
    DEFAULT_AI_DIRECTORY_NAMES, DEFAULT_AI_URL_PATTERNS, DEFAULT_CREDENTIAL_FILE_EXTENSIONS,
    DEFAULT_CREDENTIAL_FILE_NAMES, DEFAULT_LOG_KEYWORDS,
};

pub use paths::{expand_path, home_dir};
