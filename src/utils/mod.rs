//! Utility functions shared by the collectors and the binary.
//!
//! ## Components
//!
//! - **Hashing**: bounded SHA-256 calculation for file facts and fingerprints
//! - **Summary**: run summary JSON and terminal reports
//! - **Export**: JSON / JSON Lines export of stored artifacts
//!
//! ### Generating File Hashes
//!
//! ```no_run
//! use aift_collector::utils::hash::calculate_sha256;
//! use std::path::Path;
//!
//! # fn example() -> anyhow::Result<()> {
//! let file_path = Path::new("/Users/a/Library/Application Support/com.openai.chat/conversations.data");
//! let max_size = 50 * 1024 * 1024;
//!
//! match calculate_sha256(file_path, max_size)? {
//!     Some(hash) => println!("SHA-256: {}", hash),
//!     None => println!("File exceeds size limit"),
//! }
//! # Ok(())
//! # }
//! ```

/// Run summary generation and reporting
pub mod summary;

/// Cryptographic hash calculation utilities
pub mod hash;

/// Artifact export
pub mod export;
