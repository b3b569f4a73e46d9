use crate::config::collection_config::{CollectionConfig, Limits, SourcePaths};
use crate::constants::{DEFAULT_STORE_DIR, DEFAULT_STORE_FILE};

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Hosts whose visits count as AI-tool usage in browser history.
pub const DEFAULT_AI_URL_PATTERNS: &[&str] = &[
    "chat.openai.com",
    "chatgpt.com",
    "claude.ai",
    "anthropic.com",
    "bard.google.com",
    "gemini.google.com",
    "perplexity.ai",
    "copilot.microsoft.com",
    "github.com/copilot",
    "huggingface.co",
    "poe.com",
    "character.ai",
    "you.com",
    "phind.com",
    "cursor.sh",
    "v0.dev",
    "bolt.new",
    "replit.com",
    "labs.google.com",
];

pub const DEFAULT_LOG_KEYWORDS: &[&str] = &["anthropic", "openai", "gpt-4", "claude", "copilot"];

pub const DEFAULT_AI_DIRECTORY_NAMES: &[&str] = &[
    "anthropic",
    "openai",
    "claude",
    "cursor",
    "copilot",
    "chatgpt",
    "perplexity",
    "gemini",
];

/// File names that are flagged and never opened.
pub const DEFAULT_CREDENTIAL_FILE_NAMES: &[&str] = &[
    ".env",
    ".env.local",
    ".env.production",
    ".env.development",
    "credentials.json",
    ".credentials.json",
    "auth.json",
    "hosts.yml",
    ".netrc",
    ".npmrc",
    ".pypirc",
    "token",
    "token.json",
    "id_rsa",
    "id_dsa",
    "id_ecdsa",
    "id_ed25519",
];

pub const DEFAULT_CREDENTIAL_FILE_EXTENSIONS: &[&str] =
    &["pem", "key", "p12", "pfx", "keystore", "jks"];

/// Home subdirectories whose projects are checked for aider history files.
const AIDER_PROJECT_DIRS: &[&str] = &[
    "Projects",
    "projects",
    "src",
    "dev",
    "code",
    "repos",
    "workspace",
    "Documents",
    "Desktop",
];

impl CollectionConfig {
    /// Default configuration for macOS user profiles
    pub fn default_macos() -> Self {
        let support = "$HOME/Library/Application Support";
        CollectionConfig {
            version: "1.0".into(),
            description: "Default macOS AI tool evidence collection".into(),
            store_path: format!("$HOME/{DEFAULT_STORE_DIR}/{DEFAULT_STORE_FILE}"),
            limits: Limits::default(),
            sources: SourcePaths {
                claude_code: "$HOME/.claude".into(),
                codex: "$HOME/.codex".into(),
                chrome: format!("{support}/Google/Chrome"),
                brave: format!("{support}/BraveSoftware/Brave-Browser"),
                edge: format!("{support}/Microsoft Edge"),
                arc: format!("{support}/Arc/User Data"),
                safari_history: "$HOME/Library/Safari/History.db".into(),
                cursor_state: format!("{support}/Cursor/User/globalStorage/state.vscdb"),
                chatgpt: "$HOME/Library/Group Containers/group.com.openai.chat".into(),
                claude_desktop: format!("{support}/Claude"),
                ollama: "$HOME/.ollama".into(),
                windsurf: format!("{support}/Windsurf"),
                codeium: "$HOME/.codeium".into(),
                aider_home: "$HOME".into(),
                aider_project_roots: AIDER_PROJECT_DIRS.iter().map(|d| format!("$HOME/{d}")).collect(),
                lm_studio: "$HOME/.lmstudio".into(),
                gpt4all: format!("{support}/nomic.ai/GPT4All"),
                jan: vec!["$HOME/jan".into(), format!("{support}/Jan")],
                copilot: format!("{support}/GitHub Copilot"),
                copilot_config: "$HOME/.config/github-copilot".into(),
                vscode_logs: format!("{support}/Code/logs"),
                log_roots: vec![
                    "$HOME/Library/Logs".into(),
                    "$HOME/Library/Caches".into(),
                    support.into(),
                ],
            },
            ai_url_patterns: strings(DEFAULT_AI_URL_PATTERNS),
            log_keywords: strings(DEFAULT_LOG_KEYWORDS),
            ai_directory_names: strings(DEFAULT_AI_DIRECTORY_NAMES),
            credential_file_names: strings(DEFAULT_CREDENTIAL_FILE_NAMES),
            credential_file_extensions: strings(DEFAULT_CREDENTIAL_FILE_EXTENSIONS),
            workers: 0,
            disabled_collectors: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_macos_config() {
        let config = CollectionConfig::default_macos();
        assert_eq!(config.version, "1.0");
        assert!(config.ai_url_patterns.iter().any(|p| p == "claude.ai"));
        assert!(config.credential_file_names.iter().any(|n| n == ".env"));
        assert_eq!(config.sources.log_roots.len(), 3);
        assert_eq!(config.sources.aider_project_roots.len(), 9);
        assert_eq!(config.sources.jan[0], "$HOME/jan");
        assert!(config.store_path.ends_with(".ai-forensics/aift.db"));
    }
}
