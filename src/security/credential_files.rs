//! Credential file classification.
//!
//! Classification looks at the path only. A file classified here is never
//! opened by any adapter; collectors record its existence and move on.

use std::collections::HashSet;
use std::path::{Component, Path};

use crate::config::{CollectionConfig, DEFAULT_CREDENTIAL_FILE_EXTENSIONS, DEFAULT_CREDENTIAL_FILE_NAMES};

/// Directories whose entire content is treated as key material.
const SENSITIVE_DIRECTORIES: &[&str] = &[".ssh", ".aws", ".gnupg", ".kube", ".docker"];

/// Why a path was classified as a credential file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialKind {
    /// Exact match against the configured file name list.
    KnownName,
    /// A `.env.<stage>` variant.
    EnvFile,
    /// Key or certificate container by extension.
    KeyMaterial,
    /// Lives under a directory such as `.ssh` or `.aws`.
    SensitiveDirectory,
}

impl CredentialKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialKind::KnownName => "known_name",
            CredentialKind::EnvFile => "env_file",
            CredentialKind::KeyMaterial => "key_material",
            CredentialKind::SensitiveDirectory => "sensitive_directory",
        }
    }
}

/// Classifies candidate paths by name and extension.
#[derive(Debug, Clone, PartialEq)]
pub struct CredentialClassifier {
    names: HashSet<String>,
    extensions: HashSet<String>,
}

impl Default for CredentialClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_CREDENTIAL_FILE_NAMES, DEFAULT_CREDENTIAL_FILE_EXTENSIONS)
    }
}

impl CredentialClassifier {
    pub fn new<S: AsRef<str>>(names: &[S], extensions: &[S]) -> Self {
        Self {
            names: names.iter().map(|n| n.as_ref().to_lowercase()).collect(),
            extensions: extensions
                .iter()
                .map(|e| e.as_ref().trim_start_matches('.').to_lowercase())
                .collect(),
        }
    }

    /// Build from configuration, falling back to the built-in lists when a
    /// list is empty.
    pub fn from_config(config: &CollectionConfig) -> Self {
        let defaults = Self::default();
        let mut classifier = Self::new(&config.credential_file_names, &config.credential_file_extensions);
        if classifier.names.is_empty() {
            classifier.names = defaults.names;
        }
        if classifier.extensions.is_empty() {
            classifier.extensions = defaults.extensions;
        }
        classifier
    }

    pub fn classify(&self, path: &Path) -> Option<CredentialKind> {
        let name = path.file_name()?.to_string_lossy().to_lowercase();

        if self.names.contains(&name) {
            return Some(CredentialKind::KnownName);
        }
        if name.starts_with(".env.") {
            return Some(CredentialKind::EnvFile);
        }
        if let Some(ext) = path.extension() {
            if self.extensions.contains(&ext.to_string_lossy().to_lowercase()) {
                return Some(CredentialKind::KeyMaterial);
            }
        }
        let in_sensitive_dir = path.components().any(|c| match c {
            Component::Normal(part) => SENSITIVE_DIRECTORIES
                .iter()
                .any(|d| part.to_string_lossy().eq_ignore_ascii_case(d)),
            _ => false,
        });
        if in_sensitive_dir {
            return Some(CredentialKind::SensitiveDirectory);
        }

        None
    }

    pub fn is_credential_file(&self, path: &Path) -> bool {
        self.classify(path).is_some()
    }
}
