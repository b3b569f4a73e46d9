//! Aider pair-programming CLI.
//!
//! Aider writes two files into whichever directory it runs in:
//! `.aider.chat.history.md`, a Markdown transcript with one
//! `# aider chat started at` header per session, and
//! `.aider.input.history`, the prompt history. Both are read from the home
//! directory and from one level below each project root. Configuration is
//! `.aider.conf.yml` in the home directory plus `~/.aider/`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use log::debug;

use crate::adapters::read_text;
use crate::collectors::collector::{CollectContext, Collection, Collector};
use crate::collectors::tools::common::{
    has_extension, push_config_file, relative_to, root_present, usable_root, walk_files,
};
use crate::error::SourceError;
use crate::models::{meta_keys, ArtifactType, Capability, CollectorDescriptor, RawRecord, RawTimestamp};
use crate::security::path_guard::{exists_no_follow, is_real_dir};

const CHAT_HISTORY: &str = ".aider.chat.history.md";
const INPUT_HISTORY: &str = ".aider.input.history";
const CONFIG_FILE: &str = ".aider.conf.yml";
const DATA_DIR: &str = ".aider";
/// OpenRouter OAuth keys saved by `aider --login`.
const OAUTH_KEYS: &str = "oauth-keys.env";
const DATA_EXTENSIONS: &[&str] = &["json", "yaml", "yml"];

const SESSION_HEADER: &str = "# aider chat started at ";
const USER_PREFIX: &str = "#### ";
const TOOL_PREFIX: char = '>';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    User,
    Assistant,
}

impl Role {
    fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, PartialEq)]
struct Turn {
    role: Role,
    text: String,
}

/// One `# aider chat started at` block of a chat transcript.
#[derive(Debug, Default)]
struct ChatSession {
    started: Option<String>,
    turns: Vec<Turn>,
    tool_lines: usize,
}

impl ChatSession {
    fn append(&mut self, role: Role, line: &str) {
        match self.turns.last_mut() {
            Some(turn) if turn.role == role => {
                turn.text.push('\n');
                turn.text.push_str(line);
            }
            _ => self.turns.push(Turn {
                role,
                text: line.to_string(),
            }),
        }
    }
}

/// Split a transcript into sessions. `####` lines are the user's prompts,
/// `>` lines are aider's own tool output and everything else is the model's
/// reply.
fn parse_chat_history(text: &str) -> Vec<ChatSession> {
    let mut sessions: Vec<ChatSession> = Vec::new();

    for line in text.lines() {
        if let Some(started) = line.strip_prefix(SESSION_HEADER) {
            sessions.push(ChatSession {
                started: Some(started.trim().to_string()),
                ..Default::default()
            });
            continue;
        }
        if line.trim().is_empty() && sessions.is_empty() {
            continue;
        }
        if sessions.is_empty() {
            sessions.push(ChatSession::default());
        }
        let Some(session) = sessions.last_mut() else {
            continue;
        };

        if let Some(prompt) = line.strip_prefix(USER_PREFIX) {
            session.append(Role::User, prompt);
        } else if line.starts_with(TOOL_PREFIX) {
            session.tool_lines += 1;
        } else if line.trim().is_empty() {
            if let Some(turn) = session.turns.last_mut().filter(|t| t.role == Role::Assistant) {
                turn.text.push('\n');
            }
        } else {
            session.append(Role::Assistant, line);
        }
    }

    for session in &mut sessions {
        for turn in &mut session.turns {
            let trimmed = turn.text.trim_end().len();
            turn.text.truncate(trimmed);
        }
    }
    sessions.retain(|s| !s.turns.is_empty() || s.tool_lines > 0);
    sessions
}

/// One prompt of the input history.
#[derive(Debug, PartialEq)]
struct InputEntry {
    line_no: usize,
    timestamp: String,
    text: String,
}

/// `# <timestamp>` followed by the prompt, each line prefixed with `+`.
fn parse_input_history(text: &str) -> Vec<InputEntry> {
    let mut entries: Vec<InputEntry> = Vec::new();
    for (index, line) in text.lines().enumerate() {
        if let Some(timestamp) = line.strip_prefix("# ") {
            entries.push(InputEntry {
                line_no: index + 1,
                timestamp: timestamp.trim().to_string(),
                text: String::new(),
            });
        } else if let (Some(body), Some(entry)) = (line.strip_prefix('+'), entries.last_mut()) {
            if !entry.text.is_empty() {
                entry.text.push('\n');
            }
            entry.text.push_str(body);
        }
    }
    entries.retain(|e| !e.text.trim().is_empty());
    entries
}

pub struct AiderCollector {
    home: PathBuf,
    project_roots: Vec<PathBuf>,
}

impl AiderCollector {
    pub fn new(home: PathBuf, project_roots: Vec<PathBuf>) -> Self {
        Self { home, project_roots }
    }

    fn data_dir(&self) -> PathBuf {
        self.home.join(DATA_DIR)
    }

    /// Directories that may hold aider's per-project files: the home
    /// directory and each real subdirectory of a project root.
    fn working_dirs(&self, ctx: &CollectContext, collection: &mut Collection) -> Vec<PathBuf> {
        let mut dirs = vec![self.home.clone()];
        for root in &self.project_roots {
            if !usable_root(root, ctx, collection) || !is_real_dir(root) {
                continue;
            }
            let entries = match fs::read_dir(root) {
                Ok(entries) => entries,
                Err(err) => {
                    collection.skip(ctx, SourceError::read(root, err));
                    continue;
                }
            };
            let mut projects: Vec<PathBuf> = entries
                .filter_map(|e| e.ok().map(|e| e.path()))
                .filter(|p| is_real_dir(p))
                .collect();
            projects.sort();
            dirs.extend(projects);
        }
        dirs
    }

    fn collect_chat_history(&self, path: &Path, ctx: &CollectContext, collection: &mut Collection) {
        let Some((text, facts)) = collection.absorb(ctx, read_text(path, &ctx.policy)) else {
            return;
        };
        let project = path.parent().map(|p| p.to_string_lossy().into_owned());
        let sessions = parse_chat_history(&text);
        debug!("[aider] {}: {} sessions", path.display(), sessions.len());

        for (n, session) in sessions.iter().enumerate() {
            let timestamp = session
                .started
                .clone()
                .map(RawTimestamp::Text)
                .unwrap_or_default();
            let session_id = session.started.clone().unwrap_or_else(|| format!("session:{n}"));
            let transcript = session
                .turns
                .iter()
                .map(|t| t.text.as_str())
                .collect::<Vec<_>>()
                .join("\n");

            collection.push(
                RawRecord::new(ArtifactType::Conversation, path)
                    .timestamp(timestamp.clone())
                    .title(match &session.started {
                        Some(started) => format!("Aider session started {started}"),
                        None => "Aider session".to_string(),
                    })
                    .text(transcript)
                    .meta(meta_keys::SESSION_ID, session_id.clone())
                    .meta("message_count", session.turns.len())
                    .meta("tool_output_lines", session.tool_lines)
                    .meta("project_dir", project.clone())
                    .meta("format", "markdown_transcript")
                    .record_key(format!("session:{n}"))
                    .facts(Some(facts.clone())),
            );

            for (m, turn) in session.turns.iter().enumerate() {
                collection.push(
                    RawRecord::new(ArtifactType::ConversationMessage, path)
                        .timestamp(timestamp.clone())
                        .title(format!("Aider {} message", turn.role.as_str()))
                        .text(turn.text.clone())
                        .meta(meta_keys::ROLE, turn.role.as_str())
                        .meta(meta_keys::SESSION_ID, session_id.clone())
                        .record_key(format!("session:{n}:msg:{m}"))
                        .facts(Some(facts.clone())),
                );
            }
        }
    }

    fn collect_input_history(&self, path: &Path, ctx: &CollectContext, collection: &mut Collection) {
        let Some((text, facts)) = collection.absorb(ctx, read_text(path, &ctx.policy)) else {
            return;
        };
        let project = path.parent().map(|p| p.to_string_lossy().into_owned());

        for entry in parse_input_history(&text) {
            collection.push(
                RawRecord::new(ArtifactType::HistoryEntry, path)
                    .timestamp(RawTimestamp::Text(entry.timestamp.clone()))
                    .title(format!("Aider prompt {}", entry.timestamp))
                    .text(entry.text)
                    .meta("project_dir", project.clone())
                    .meta("line", entry.line_no)
                    .record_key(format!("line:{}", entry.line_no))
                    .facts(Some(facts.clone())),
            );
        }
    }

    fn collect_config(&self, ctx: &CollectContext, collection: &mut Collection) {
        let home_config = self.home.join(CONFIG_FILE);
        if exists_no_follow(&home_config) {
            push_config_file(&home_config, &self.home, "Aider", ctx, collection);
        }

        let data_dir = self.data_dir();
        if !usable_root(&data_dir, ctx, collection) {
            return;
        }
        let oauth_keys = data_dir.join(OAUTH_KEYS);
        if exists_no_follow(&oauth_keys) {
            collection.flag_credential_file(ctx, &oauth_keys);
        }
        let files = walk_files(
            &data_dir,
            ctx.policy.limits.max_walk_depth,
            ctx.policy.limits.max_files_per_collector,
            ctx,
            collection,
            |p| DATA_EXTENSIONS.iter().any(|ext| has_extension(p, ext)),
        );
        let label = format!("Aider {}", relative_to(&data_dir, &self.home));
        for path in files {
            push_config_file(&path, &data_dir, &label, ctx, collection);
        }
    }
}

impl Collector for AiderCollector {
    fn name(&self) -> &'static str {
        "aider"
    }

    fn descriptor(&self) -> CollectorDescriptor {
        let mut paths = vec![
            self.data_dir(),
            self.home.join(CHAT_HISTORY),
            self.home.join(INPUT_HISTORY),
            self.home.join(CONFIG_FILE),
        ];
        paths.extend(self.project_roots.iter().cloned());
        CollectorDescriptor::new(self.name(), &[Capability::JsonFiles, Capability::FileMetadata], paths)
    }

    fn detect(&self) -> bool {
        root_present(&self.data_dir())
            || root_present(&self.home.join(CHAT_HISTORY))
            || root_present(&self.home.join(INPUT_HISTORY))
            || root_present(&self.home.join(CONFIG_FILE))
    }

    fn collect(&self, ctx: &CollectContext) -> Result<Collection> {
        let mut collection = Collection::new(self.name());

        for dir in self.working_dirs(ctx, &mut collection) {
            let chat = dir.join(CHAT_HISTORY);
            if exists_no_follow(&chat) {
                self.collect_chat_history(&chat, ctx, &mut collection);
            }
            let input = dir.join(INPUT_HISTORY);
            if exists_no_follow(&input) {
                self.collect_input_history(&input, ctx, &mut collection);
            }
        }
        self.collect_config(ctx, &mut collection);

        Ok(collection)
    }
}
