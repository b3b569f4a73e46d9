//! Error taxonomy.
//!
//! Per-item problems are [`SourceError`]s: collectors catch them, count them
//! and move on. [`StorageError`] is the only class that can end a run, and it
//! reaches callers wrapped in [`RunError`].

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::models::CollectionRun;

/// A failure tied to one candidate source item.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Permission, missing file, or any other io failure while reading.
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Embedded database stayed locked after the bounded retries.
    #[error("database {} is locked", path.display())]
    Locked { path: PathBuf },

    /// Embedded database or container is unreadable.
    #[error("{} is corrupt or not a supported container: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },

    /// A record or file could not be parsed.
    #[error("unparseable content in {}: {reason}", path.display())]
    Format { path: PathBuf, reason: String },

    /// File larger than the configured cap. No bytes were read.
    #[error("{} is {size} bytes, over the {cap} byte cap", path.display())]
    SizeLimitExceeded { path: PathBuf, size: u64, cap: u64 },

    /// Classified as a credential file. Never opened.
    #[error("{} is a credential file", path.display())]
    CredentialFileSkipped { path: PathBuf },

    /// Candidate path is a symlink. Never followed.
    #[error("{} is a symlink", path.display())]
    SymlinkSkipped { path: PathBuf },
}

impl SourceError {
    pub fn read(path: &Path, source: io::Error) -> Self {
        SourceError::Read {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn format(path: &Path, reason: impl Into<String>) -> Self {
        SourceError::Format {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }

    pub fn corrupt(path: &Path, reason: impl Into<String>) -> Self {
        SourceError::Corrupt {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }

    /// Path the error refers to.
    pub fn path(&self) -> &Path {
        match self {
            SourceError::Read { path, .. }
            | SourceError::Locked { path }
            | SourceError::Corrupt { path, .. }
            | SourceError::Format { path, .. }
            | SourceError::SizeLimitExceeded { path, .. }
            | SourceError::CredentialFileSkipped { path }
            | SourceError::SymlinkSkipped { path } => path,
        }
    }

    /// True when the underlying io error is a permission denial.
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, SourceError::Read { source, .. } if source.kind() == io::ErrorKind::PermissionDenied)
    }
}

/// Failures of the evidence store. Any of these is run-fatal.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("store database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store io error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("unknown run id {0}")]
    UnknownRun(String),

    #[error("invalid pagination cursor")]
    InvalidCursor,
}

/// Terminal failure of a collection run.
#[derive(Debug, Error)]
pub enum RunError {
    /// A storage write failed. The summary reflects everything committed before it.
    #[error("storage write failed during run {}: {source}", summary.id)]
    StorageWrite {
        summary: Box<CollectionRun>,
        #[source]
        source: StorageError,
    },
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;
