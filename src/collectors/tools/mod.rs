//! Per-tool collectors, one module per AI tool or source family.

pub mod aider;
pub mod chatgpt_desktop;
pub mod chromium;
pub mod claude_code;
pub mod claude_desktop;
pub mod codex;
pub mod common;
pub mod copilot;
pub mod cursor;
pub mod generic_logs;
pub mod gpt4all;
pub mod jan;
pub mod lm_studio;
pub mod local_runner;
pub mod ollama;
pub mod safari;
pub mod transcripts;
pub mod windsurf;

pub use aider::AiderCollector;
pub use chatgpt_desktop::ChatGptDesktopCollector;
pub use chromium::ChromiumCollector;
pub use claude_code::ClaudeCodeCollector;
pub use claude_desktop::ClaudeDesktopCollector;
pub use codex::CodexCollector;
pub use copilot::CopilotCollector;
pub use cursor::CursorCollector;
pub use generic_logs::GenericLogsCollector;
pub use gpt4all::Gpt4AllCollector;
pub use jan::JanCollector;
pub use lm_studio::LmStudioCollector;
pub use ollama::OllamaCollector;
pub use safari::SafariCollector;
pub use windsurf::WindsurfCollector;
