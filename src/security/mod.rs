//! Security utilities.
//!
//! This module provides:
//! - The credential redaction engine applied to every stored value
//! - Credential file classification (flag only, never open)
//! - Candidate path checks run before any source file is read

pub mod credential_files;
pub mod path_guard;
pub mod redaction;

pub use credential_files::{CredentialClassifier, CredentialKind};
pub use path_guard::inspect_candidate;
pub use redaction::{is_sensitive_key, safe_error_message, scrub, Redactor, Scan, ValueRedaction};
