use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::config::paths::expand_path;
use crate::constants::{
    DEFAULT_DB_BUSY_TIMEOUT_MS, DEFAULT_DB_LOCK_RETRIES, DEFAULT_MAX_FILES_PER_COLLECTOR,
    DEFAULT_MAX_FILE_BYTES, DEFAULT_MAX_LINE_BYTES, DEFAULT_MAX_WALK_DEPTH,
};

/// Read bounds applied to every source.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Limits {
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
    #[serde(default = "default_max_line_bytes")]
    pub max_line_bytes: usize,
    #[serde(default = "default_db_busy_timeout_ms")]
    pub db_busy_timeout_ms: u64,
    #[serde(default = "default_db_lock_retries")]
    pub db_lock_retries: u32,
    #[serde(default = "default_max_walk_depth")]
    pub max_walk_depth: usize,
    #[serde(default = "default_max_files_per_collector")]
    pub max_files_per_collector: usize,
}

fn default_max_file_bytes() -> u64 {
    DEFAULT_MAX_FILE_BYTES
}
fn default_max_line_bytes() -> usize {
    DEFAULT_MAX_LINE_BYTES
}
fn default_db_busy_timeout_ms() -> u64 {
    DEFAULT_DB_BUSY_TIMEOUT_MS
}
fn default_db_lock_retries() -> u32 {
    DEFAULT_DB_LOCK_RETRIES
}
fn default_max_walk_depth() -> usize {
    DEFAULT_MAX_WALK_DEPTH
}
fn default_max_files_per_collector() -> usize {
    DEFAULT_MAX_FILES_PER_COLLECTOR
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
            db_busy_timeout_ms: DEFAULT_DB_BUSY_TIMEOUT_MS,
            db_lock_retries: DEFAULT_DB_LOCK_RETRIES,
            max_walk_depth: DEFAULT_MAX_WALK_DEPTH,
            max_files_per_collector: DEFAULT_MAX_FILES_PER_COLLECTOR,
        }
    }
}

/// Per-tool source roots. Values may reference `$HOME`, `${VAR}` or `~`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SourcePaths {
    pub claude_code: String,
    pub codex: String,
    pub chrome: String,
    pub brave: String,
    pub edge: String,
    pub arc: String,
    pub safari_history: String,
    pub cursor_state: String,
    pub chatgpt: String,
    pub claude_desktop: String,
    pub ollama: String,
    /// Sources added after the first configuration format. An omitted entry
    /// is empty and its collector finds nothing.
    #[serde(default)]
    pub windsurf: String,
    #[serde(default)]
    pub codeium: String,
    /// Directory holding `.aider.chat.history.md` and `.aider/`.
    #[serde(default)]
    pub aider_home: String,
    /// Each subdirectory of these is checked for aider history files.
    #[serde(default)]
    pub aider_project_roots: Vec<String>,
    #[serde(default)]
    pub lm_studio: String,
    #[serde(default)]
    pub gpt4all: String,
    /// Tried in order; the first present one is used.
    #[serde(default)]
    pub jan: Vec<String>,
    #[serde(default)]
    pub copilot: String,
    #[serde(default)]
    pub copilot_config: String,
    #[serde(default)]
    pub vscode_logs: String,
    #[serde(default)]
    pub log_roots: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CollectionConfig {
    pub version: String,
    pub description: String,
    pub store_path: String,
    #[serde(default)]
    pub limits: Limits,
    pub sources: SourcePaths,
    /// Domain allowlist deciding which browser visits are AI related.
    #[serde(default)]
    pub ai_url_patterns: Vec<String>,
    #[serde(default)]
    pub log_keywords: Vec<String>,
    #[serde(default)]
    pub ai_directory_names: Vec<String>,
    #[serde(default)]
    pub credential_file_names: Vec<String>,
    #[serde(default)]
    pub credential_file_extensions: Vec<String>,
    /// 0 or 1 runs collectors sequentially.
    #[serde(default)]
    pub workers: usize,
    #[serde(default)]
    pub disabled_collectors: Vec<String>,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self::default_macos()
    }
}

impl CollectionConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path.display()))?;

        let config: CollectionConfig =
            serde_yaml::from_str(&content).context("Failed to parse YAML config")?;

        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Save configuration to a YAML file
    pub fn save_to_yaml_file(&self, path: &Path) -> Result<()> {
        let yaml = serde_yaml::to_string(self).context("Failed to serialize config to YAML")?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .context(format!("Failed to create {}", parent.display()))?;
            }
        }

        fs::write(path, yaml).context(format!("Failed to write config to {}", path.display()))?;

        info!("Saved configuration to {}", path.display());
        Ok(())
    }

    /// Expand `~`, `$VAR` and `${VAR}` in every configured path.
    pub fn process_environment_variables(&mut self) -> Result<()> {
        let expand = |raw: &mut String| {
            *raw = expand_path(raw).to_string_lossy().into_owned();
        };

        expand(&mut self.store_path);
        let sources = &mut self.sources;
        for path in [
            &mut sources.claude_code,
            &mut sources.codex,
            &mut sources.chrome,
            &mut sources.brave,
            &mut sources.edge,
            &mut sources.arc,
            &mut sources.safari_history,
            &mut sources.cursor_state,
            &mut sources.chatgpt,
            &mut sources.claude_desktop,
            &mut sources.ollama,
            &mut sources.windsurf,
            &mut sources.codeium,
            &mut sources.aider_home,
            &mut sources.lm_studio,
            &mut sources.gpt4all,
            &mut sources.copilot,
            &mut sources.copilot_config,
            &mut sources.vscode_logs,
        ] {
            expand(path);
        }
        for root in sources
            .log_roots
            .iter_mut()
            .chain(sources.aider_project_roots.iter_mut())
            .chain(sources.jan.iter_mut())
        {
            expand(root);
        }

        Ok(())
    }

    /// Create a default configuration YAML file
    pub fn create_default_config_file(path: &Path) -> Result<()> {
        CollectionConfig::default().save_to_yaml_file(path)
    }

    pub fn store_path(&self) -> PathBuf {
        PathBuf::from(&self.store_path)
    }

    pub fn is_enabled(&self, collector: &str) -> bool {
        !self.disabled_collectors.iter().any(|c| c == collector)
    }
}

/// Load a configuration file or create a default one.
///
/// * `Some(path)` that exists is parsed.
/// * `Some(path)` that does not exist gets the defaults written to it.
/// * `None` uses the built-in defaults without touching the filesystem.
///
/// Paths are returned with environment variables already expanded.
pub fn load_or_create_config(config_path: Option<&Path>) -> Result<CollectionConfig> {
    let mut config = match config_path {
        Some(path) if path.exists() => CollectionConfig::from_yaml_file(path)?,
        Some(path) => {
            info!("Creating default config at {}", path.display());
            let default_config = CollectionConfig::default();
            default_config.save_to_yaml_file(path)?;
            default_config
        }
        None => {
            info!("No config path provided, using built-in defaults");
            CollectionConfig::default()
        }
    };

    config.process_environment_variables()?;
    Ok(config)
}
