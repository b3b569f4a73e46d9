//! Streaming keyword scan over log files.
//!
//! Lines are read through a bounded buffer: a line longer than
//! `max_line_bytes` is consumed in chunks, counted and never matched, so a
//! log without newlines cannot force a large allocation.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::adapters::files::file_facts;
use crate::adapters::ReadPolicy;
use crate::error::SourceError;
use crate::models::FileFacts;
use crate::security::inspect_candidate;

/// One matching line.
#[derive(Debug, Clone, PartialEq)]
pub struct LogLine {
    pub line_no: usize,
    pub text: String,
    pub keyword: String,
}

#[derive(Debug, Clone, Default)]
pub struct LogScan {
    pub matches: Vec<LogLine>,
    /// Lines skipped for exceeding the line cap.
    pub long_lines: usize,
    /// Matches beyond `max_matches` that were not kept.
    pub dropped_matches: usize,
    pub facts: FileFacts,
}

/// Scan `path` for lines containing any keyword (case-insensitive).
pub fn scan_log(
    path: &Path,
    policy: &ReadPolicy,
    keywords: &[String],
    max_matches: usize,
) -> Result<LogScan, SourceError> {
    let cap = policy.max_file_bytes();
    let metadata = inspect_candidate(path, &policy.credentials, cap)?;
    let max_line = policy.limits.max_line_bytes;
    let lowered: Vec<String> = keywords.iter().map(|k| k.to_lowercase()).collect();

    let file = File::open(path).map_err(|e| SourceError::read(path, e))?;
    let mut reader = BufReader::new(file.take(cap));
    let mut hasher = Sha256::new();
    let mut scan = LogScan::default();
    let mut buf = Vec::with_capacity(4096);
    let mut line_no = 0;

    loop {
        buf.clear();
        let n = (&mut reader)
            .take(max_line as u64 + 1)
            .read_until(b'\n', &mut buf)
            .map_err(|e| SourceError::read(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf);
        line_no += 1;

        if buf.len() > max_line && buf.last() != Some(&b'\n') {
            scan.long_lines += 1;
            skip_rest_of_line(&mut reader, &mut hasher, max_line).map_err(|e| SourceError::read(path, e))?;
            continue;
        }

        let line = String::from_utf8_lossy(&buf);
        let lower = line.to_lowercase();
        if let Some(keyword) = lowered.iter().find(|k| lower.contains(k.as_str())) {
            if scan.matches.len() < max_matches {
                scan.matches.push(LogLine {
                    line_no,
                    text: line.trim_end().to_string(),
                    keyword: keyword.clone(),
                });
            } else {
                scan.dropped_matches += 1;
            }
        }
    }

    scan.facts = file_facts(&metadata, Some(format!("{:x}", hasher.finalize())));
    Ok(scan)
}

fn skip_rest_of_line<R: BufRead>(reader: &mut R, hasher: &mut Sha256, chunk: usize) -> std::io::Result<()> {
    let mut buf = Vec::with_capacity(chunk.min(64 * 1024));
    loop {
        buf.clear();
        let n = reader.by_ref().take(chunk as u64).read_until(b'\n', &mut buf)?;
        hasher.update(&buf);
        if n == 0 || buf.last() == Some(&b'\n') {
            return Ok(());
        }
    }
}
