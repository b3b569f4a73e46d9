//! Printable-string extraction from LevelDB table and log files.
//!
//! Entries are Snappy-compressed and framed in ways that change between
//! Chromium releases; only runs of printable ASCII are recovered, which is
//! enough to show what a store was used for.

use std::collections::BTreeSet;
use std::path::Path;

use crate::adapters::files::read_bounded;
use crate::adapters::ReadPolicy;
use crate::error::SourceError;
use crate::models::FileFacts;

/// Runs of printable ASCII at least `min_len` bytes long, in file order.
pub fn printable_strings(bytes: &[u8], min_len: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut start: Option<usize> = None;

    for (idx, byte) in bytes.iter().enumerate() {
        let printable = byte.is_ascii_graphic() || *byte == b' ';
        match (printable, start) {
            (true, None) => start = Some(idx),
            (false, Some(s)) => {
                if idx - s >= min_len {
                    out.push(String::from_utf8_lossy(&bytes[s..idx]).into_owned());
                }
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        if bytes.len() - s >= min_len {
            out.push(String::from_utf8_lossy(&bytes[s..]).into_owned());
        }
    }

    out
}

/// Distinct printable strings from one LevelDB file that mention any of
/// `keywords`, capped at `max_samples`.
pub fn leveldb_samples(
    path: &Path,
    policy: &ReadPolicy,
    keywords: &[String],
    min_len: usize,
    max_samples: usize,
) -> Result<(Vec<String>, FileFacts), SourceError> {
    let read = read_bounded(path, policy)?;
    let lowered: Vec<String> = keywords.iter().map(|k| k.to_lowercase()).collect();

    let mut seen = BTreeSet::new();
    let mut samples = Vec::new();
    for candidate in printable_strings(&read.bytes, min_len) {
        let trimmed = candidate.trim();
        let lower = trimmed.to_lowercase();
        if !lowered.iter().any(|k| lower.contains(k.as_str())) {
            continue;
        }
        if seen.insert(trimmed.to_string()) {
            samples.push(trimmed.to_string());
            if samples.len() >= max_samples {
                break;
            }
        }
    }

    Ok((samples, read.facts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_printable_strings() {
        let bytes = b"\x00\x01short\x02a much longer printable run\xff\xfetail-end-of-file-run";
        let runs = printable_strings(bytes, 10);
        assert_eq!(runs, vec!["a much longer printable run", "tail-end-of-file-run"]);
    }

    #[test]
    fn test_samples_filtered_and_deduplicated() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("000003.log");
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"\x01conversation with claude about rust\x00");
        bytes.extend_from_slice(b"\x01conversation with claude about rust\x00");
        bytes.extend_from_slice(b"\x01unrelated browser cache entry here\x00");
        std::fs::write(&path, bytes).unwrap();

        let keywords = vec!["Claude".to_string()];
        let (samples, facts) = leveldb_samples(&path, &ReadPolicy::default(), &keywords, 20, 10).unwrap();
        assert_eq!(samples, vec!["conversation with claude about rust"]);
        assert!(facts.size > 0);
    }
}
