//! The fixed, ordered set of collectors a run executes.

use std::path::PathBuf;

use log::debug;

use crate::collectors::collector::Collector;
use crate::collectors::tools::{
    AiderCollector, ChatGptDesktopCollector, ChromiumCollector, ClaudeCodeCollector, ClaudeDesktopCollector,
    CodexCollector, CopilotCollector, CursorCollector, GenericLogsCollector, Gpt4AllCollector, JanCollector,
    LmStudioCollector, OllamaCollector, SafariCollector, WindsurfCollector,
};
use crate::config::CollectionConfig;
use crate::models::CollectorDescriptor;

/// Immutable after construction. Order is the order outcomes are reported in.
pub struct Registry {
    collectors: Vec<Box<dyn Collector>>,
}

impl Registry {
    pub fn new(collectors: Vec<Box<dyn Collector>>) -> Self {
        Self { collectors }
    }

    /// Every built-in collector, wired to the configured source roots,
    /// minus those listed in `disabled_collectors`.
    pub fn from_config(config: &CollectionConfig) -> Self {
        let sources = &config.sources;
        let patterns = || config.ai_url_patterns.clone();

        let all: Vec<Box<dyn Collector>> = vec![
            Box::new(ClaudeCodeCollector::new(PathBuf::from(&sources.claude_code))),
            Box::new(CodexCollector::new(PathBuf::from(&sources.codex))),
            Box::new(ChromiumCollector::new("chrome", PathBuf::from(&sources.chrome), patterns())),
            Box::new(ChromiumCollector::new("brave", PathBuf::from(&sources.brave), patterns())),
            Box::new(ChromiumCollector::new("edge", PathBuf::from(&sources.edge), patterns())),
            Box::new(ChromiumCollector::new("arc", PathBuf::from(&sources.arc), patterns())),
            Box::new(SafariCollector::new(PathBuf::from(&sources.safari_history), patterns())),
            Box::new(CursorCollector::new(PathBuf::from(&sources.cursor_state))),
            Box::new(WindsurfCollector::new(
                PathBuf::from(&sources.windsurf),
                PathBuf::from(&sources.codeium),
            )),
            Box::new(CopilotCollector::new(
                PathBuf::from(&sources.copilot),
                PathBuf::from(&sources.copilot_config),
                PathBuf::from(&sources.vscode_logs),
            )),
            Box::new(AiderCollector::new(
                PathBuf::from(&sources.aider_home),
                sources.aider_project_roots.iter().map(PathBuf::from).collect(),
            )),
            Box::new(ChatGptDesktopCollector::new(PathBuf::from(&sources.chatgpt))),
            Box::new(ClaudeDesktopCollector::new(PathBuf::from(&sources.claude_desktop))),
            Box::new(OllamaCollector::new(PathBuf::from(&sources.ollama))),
            Box::new(LmStudioCollector::new(PathBuf::from(&sources.lm_studio))),
            Box::new(Gpt4AllCollector::new(PathBuf::from(&sources.gpt4all))),
            Box::new(JanCollector::new(sources.jan.iter().map(PathBuf::from).collect())),
            Box::new(GenericLogsCollector::new(
                sources.log_roots.iter().map(PathBuf::from).collect(),
                config.log_keywords.clone(),
                config.ai_directory_names.clone(),
            )),
        ];

        let collectors = all
            .into_iter()
            .filter(|c| {
                let enabled = config.is_enabled(c.name());
                if !enabled {
                    debug!("Collector {} disabled by configuration", c.name());
                }
                enabled
            })
            .collect();

        Self::new(collectors)
    }

    pub fn collectors(&self) -> &[Box<dyn Collector>] {
        &self.collectors
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.collectors.iter().map(|c| c.name()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&dyn Collector> {
        self.collectors
            .iter()
            .find(|c| c.name() == name)
            .map(|c| c.as_ref())
    }

    pub fn descriptors(&self) -> Vec<CollectorDescriptor> {
        self.collectors.iter().map(|c| c.descriptor()).collect()
    }

    pub fn len(&self) -> usize {
        self.collectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collectors.is_empty()
    }
}
