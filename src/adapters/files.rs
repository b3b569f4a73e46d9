//! Bounded plain-file reads: raw bytes, text, JSON and JSON Lines.

use std::fs::{File, Metadata};
use std::io::Read;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::adapters::ReadPolicy;
use crate::error::SourceError;
use crate::models::FileFacts;
use crate::security::inspect_candidate;
use crate::utils::hash::sha256_bytes;

/// Contents of a file read under the size cap.
#[derive(Debug, Clone)]
pub struct BoundedRead {
    pub bytes: Vec<u8>,
    pub facts: FileFacts,
}

/// Parsed JSON Lines document. Malformed lines are counted, not fatal.
#[derive(Debug, Clone, Default)]
pub struct JsonLines {
    /// `(1-based line number, value)`
    pub records: Vec<(usize, Value)>,
    pub malformed: usize,
    pub facts: FileFacts,
}

/// Filesystem facts from already fetched metadata.
pub fn file_facts(metadata: &Metadata, sha256: Option<String>) -> FileFacts {
    FileFacts {
        size: metadata.len(),
        modified: metadata.modified().ok().map(DateTime::<Utc>::from),
        created: metadata.created().ok().map(DateTime::<Utc>::from),
        sha256,
    }
}

/// Read a whole file, refusing anything over the cap before opening it.
pub fn read_bounded(path: &Path, policy: &ReadPolicy) -> Result<BoundedRead, SourceError> {
    let cap = policy.max_file_bytes();
    let metadata = inspect_candidate(path, &policy.credentials, cap)?;

    let file = File::open(path).map_err(|e| SourceError::read(path, e))?;
    let mut bytes = Vec::with_capacity(metadata.len() as usize);
    file.take(cap.saturating_add(1))
        .read_to_end(&mut bytes)
        .map_err(|e| SourceError::read(path, e))?;

    // Grew past the cap between stat and read.
    if bytes.len() as u64 > cap {
        return Err(SourceError::SizeLimitExceeded {
            path: path.to_path_buf(),
            size: bytes.len() as u64,
            cap,
        });
    }

    let facts = file_facts(&metadata, Some(sha256_bytes(&bytes)));
    Ok(BoundedRead { bytes, facts })
}

/// Read a file as lossy UTF-8 text.
pub fn read_text(path: &Path, policy: &ReadPolicy) -> Result<(String, FileFacts), SourceError> {
    let read = read_bounded(path, policy)?;
    Ok((String::from_utf8_lossy(&read.bytes).into_owned(), read.facts))
}

/// Parse the first JSON value in `bytes`, ignoring whatever trails it.
pub fn parse_json_prefix(bytes: &[u8]) -> Result<Value, String> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let mut stream = serde_json::Deserializer::from_slice(bytes).into_iter::<Value>();
    match stream.next() {
        Some(Ok(value)) => Ok(value),
        Some(Err(e)) => Err(format!("invalid JSON at line {} column {}", e.line(), e.column())),
        None => Err("empty document".to_string()),
    }
}

/// Read and parse a JSON document.
pub fn read_json(path: &Path, policy: &ReadPolicy) -> Result<(Value, FileFacts), SourceError> {
    let read = read_bounded(path, policy)?;
    let value = parse_json_prefix(&read.bytes).map_err(|reason| SourceError::format(path, reason))?;
    Ok((value, read.facts))
}

/// Read a JSON Lines file, one value per non-blank line.
pub fn read_jsonl(path: &Path, policy: &ReadPolicy) -> Result<JsonLines, SourceError> {
    let read = read_bounded(path, policy)?;
    let text = String::from_utf8_lossy(&read.bytes);

    let mut parsed = JsonLines {
        facts: read.facts,
        ..Default::default()
    };
    for (idx, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(line) {
            Ok(value) => parsed.records.push((idx + 1, value)),
            Err(_) => parsed.malformed += 1,
        }
    }

    Ok(parsed)
}
