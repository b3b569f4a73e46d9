use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;
use sha2::{Sha256, Digest};

use crate::constants::DEFAULT_BUFFER_SIZE;

/// Calculate SHA-256 of a byte slice as lowercase hex.
pub fn sha256_bytes(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Calculate SHA-256 hash of a file, reading at most `max_bytes`.
///
/// Returns None if:
/// - The file is larger than `max_bytes` (nothing is read)
/// - The path is not a regular file or is a symlink
///
/// The file is opened read-only and streamed through a fixed buffer.
pub fn calculate_sha256(path: &Path, max_bytes: u64) -> io::Result<Option<String>> {
    let metadata = std::fs::symlink_metadata(path)?;

    // Skip if file is too large
    if metadata.len() > max_bytes {
        return Ok(None);
    }

    // Skip if not a regular file
    if !metadata.file_type().is_file() {
        return Ok(None);
    }

    let file = File::open(path)?;
    let mut reader = BufReader::new(file.take(max_bytes));
    let mut hasher = Sha256::new();
    let mut buffer = vec![0; DEFAULT_BUFFER_SIZE];

    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(Some(format!("{:x}", hasher.finalize())))
}
