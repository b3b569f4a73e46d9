//! Normalization pipeline.
//!
//! Timestamps are canonicalized to UTC, text is sanitized and bounded, and
//! every value is routed through the [`crate::security::Redactor`] before an
//! [`crate::models::Artifact`] is produced.

pub mod artifact;
pub mod text;
pub mod timestamp;

pub use artifact::{detect_model, fingerprint, Normalizer};
pub use text::{bounded_preview, estimate_tokens, sanitize_text, truncate_chars};
pub use timestamp::{normalize_timestamp, to_canonical, CANONICAL_FORMAT};
