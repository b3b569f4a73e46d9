//! Permission error tracking and reporting
//!
//! This module tracks sources that could not be read because the OS refused
//! access, and reports them once at the end of a run with guidance on
//! granting the collector access.

use log::warn;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

/// Tracks sources that failed due to permission errors
#[derive(Debug, Clone, Default)]
pub struct PermissionTracker {
    failed_sources: Arc<Mutex<BTreeSet<String>>>,
}

impl PermissionTracker {
    /// Create a new permission tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a permission failure for a source path
    pub fn record_permission_failure(&self, source: &str) {
        if let Ok(mut failures) = self.failed_sources.lock() {
            failures.insert(source.to_string());
        }
    }

    /// Check if an error message indicates a permission problem
    pub fn is_permission_error(error_msg: &str) -> bool {
        error_msg.contains("Permission denied")
            || error_msg.contains("PermissionDenied")
            || error_msg.contains("Operation not permitted")
            || error_msg.contains("authorization denied")
    }

    /// Get the count of permission failures
    pub fn failure_count(&self) -> usize {
        self.failed_sources.lock().map(|f| f.len()).unwrap_or(0)
    }

    /// Sorted snapshot of the failed sources
    pub fn failures(&self) -> Vec<String> {
        self.failed_sources
            .lock()
            .map(|f| f.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Report permission failures and provide guidance
    pub fn report_failures(&self) {
        let failures = self.failures();

        if failures.is_empty() {
            return;
        }

        warn!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        warn!("⚠️  Permission Issues Summary");
        warn!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        warn!("");
        warn!(
            "The following {} source(s) could not be read due to insufficient permissions:",
            failures.len()
        );
        warn!("");

        for source in &failures {
            warn!("  • {}", source);
        }

        warn!("");
        warn!("To collect these sources, try one of the following:");
        warn!("");

        #[cfg(target_os = "macos")]
        {
            warn!("  1. Grant Full Disk Access to your terminal in System Settings > Privacy & Security");
            warn!("  2. Quit the owning application if its database is locked, then re-run");
            warn!("  3. Check file permissions with 'ls -la'");
        }

        #[cfg(not(target_os = "macos"))]
        {
            warn!("  1. Run as the user who owns the AI tool profiles");
            warn!("  2. Check file permissions with 'ls -la'");
        }

        warn!("");
        warn!("Note: Collection continued for accessible sources.");
        warn!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    /// Check if the user should be told to grant additional access
    pub fn should_suggest_access(&self) -> bool {
        self.failure_count() > 0
    }
}
