//! Candidate path checks that run before any source file is opened.
//!
//! Every adapter calls [`inspect_candidate`] first. It only ever uses
//! `symlink_metadata`, so a rejected path has had zero bytes read.

use std::fs::{self, Metadata};
use std::io;
use std::path::Path;

use crate::error::SourceError;
use crate::security::credential_files::CredentialClassifier;

/// Reject symlinks, credential files, non-regular files and oversized files.
///
/// # Errors
///
/// * [`SourceError::SymlinkSkipped`] when the path itself is a symlink
/// * [`SourceError::CredentialFileSkipped`] when the name classifies as a credential file
/// * [`SourceError::SizeLimitExceeded`] when the file is larger than `max_bytes`
/// * [`SourceError::Read`] when the path is missing or not a regular file
pub fn inspect_candidate(
    path: &Path,
    credentials: &CredentialClassifier,
    max_bytes: u64,
) -> Result<Metadata, SourceError> {
    let metadata = fs::symlink_metadata(path).map_err(|e| SourceError::read(path, e))?;

    if metadata.file_type().is_symlink() {
        return Err(SourceError::SymlinkSkipped { path: path.to_path_buf() });
    }
    if credentials.is_credential_file(path) {
        return Err(SourceError::CredentialFileSkipped { path: path.to_path_buf() });
    }
    if !metadata.is_file() {
        return Err(SourceError::read(
            path,
            io::Error::new(io::ErrorKind::InvalidInput, "not a regular file"),
        ));
    }
    if metadata.len() > max_bytes {
        return Err(SourceError::SizeLimitExceeded {
            path: path.to_path_buf(),
            size: metadata.len(),
            cap: max_bytes,
        });
    }

    Ok(metadata)
}

/// True when `path` exists and is itself a symlink.
pub fn is_symlink(path: &Path) -> bool {
    fs::symlink_metadata(path)
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false)
}

/// Existence check that never follows links. Detection helpers use this.
pub fn exists_no_follow(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

/// Directory check that never follows links.
pub fn is_real_dir(path: &Path) -> bool {
    fs::symlink_metadata(path)
        .map(|m| m.file_type().is_dir())
        .unwrap_or(false)
}

/// Regular-file check that never follows links.
pub fn is_real_file(path: &Path) -> bool {
    fs::symlink_metadata(path)
        .map(|m| m.file_type().is_file())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_regular_file_passes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.jsonl");
        fs::write(&path, b"{}\n").unwrap();

        let meta = inspect_candidate(&path, &CredentialClassifier::default(), 1024).unwrap();
        assert_eq!(meta.len(), 3);
    }

    #[test]
    fn test_oversized_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("big.log");
        fs::write(&path, vec![b'x'; 2048]).unwrap();

        let err = inspect_candidate(&path, &CredentialClassifier::default(), 1024).unwrap_err();
        assert!(matches!(err, SourceError::SizeLimitExceeded { size: 2048, cap: 1024, .. }));
    }

    #[test]
    fn test_credential_file_rejected_before_size() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".env");
        fs::write(&path, vec![b'x'; 4096]).unwrap();

        let err = inspect_candidate(&path, &CredentialClassifier::default(), 1024).unwrap_err();
        assert!(matches!(err, SourceError::CredentialFileSkipped { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_rejected() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("real.json");
        fs::write(&target, b"{}").unwrap();
        let link = dir.path().join("link.json");
        std::os::unix::fs::symlink(&target, &link).unwrap();

        let err = inspect_candidate(&link, &CredentialClassifier::default(), 1024).unwrap_err();
        assert!(matches!(err, SourceError::SymlinkSkipped { .. }));
        assert!(is_symlink(&link));
        assert!(!is_real_file(&link));
        assert!(exists_no_follow(&link));
    }

    #[test]
    fn test_directory_rejected() {
        let dir = TempDir::new().unwrap();
        let err = inspect_candidate(dir.path(), &CredentialClassifier::default(), 1024).unwrap_err();
        assert!(matches!(err, SourceError::Read { .. }));
        assert!(is_real_dir(dir.path()));
    }
}
