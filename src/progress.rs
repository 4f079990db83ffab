//! Progress-callback trait for ingestion events.
//!
//! Inject an [`Arc<dyn IngestProgressCallback>`] via
//! [`crate::config::VaultConfigBuilder::progress_callback`] to follow a
//! document through the ingestion state machine:
//!
//! ```text
//! Received ─▶ Stored ─▶ Derived ───────────┐
//!                  │ ├─▶ DerivationSkipped ─┼─▶ Committed
//!                  │ └─▶ DerivationFailed ──┘
//!                  └─▶ Rejected
//! ```
//!
//! Callers can forward events to a terminal spinner, a channel or an audit
//! log without the library knowing how the host application communicates.
//!
//! # Example
//!
//! ```rust
//! use edgequake_docvault::{IngestProgressCallback, IngestStage, VaultConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct Commits(AtomicUsize);
//!
//! impl IngestProgressCallback for Commits {
//!     fn on_stage(&self, _label: &str, stage: IngestStage) {
//!         if stage == IngestStage::Committed {
//!             self.0.fetch_add(1, Ordering::SeqCst);
//!         }
//!     }
//! }
//!
//! let config = VaultConfig::builder()
//!     .progress_callback(Arc::new(Commits(AtomicUsize::new(0))))
//!     .build()
//!     .unwrap();
//! ```

use crate::error::CleanupIssue;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Where a create or replace currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestStage {
    /// Request accepted for processing; metadata and upload checks passed.
    Received,
    /// Original written durably under a fresh key.
    Stored,
    /// A complete page set was staged.
    Derived,
    /// Not a derivable kind; no pages.
    DerivationSkipped,
    /// Derivation failed; the document continues without pages.
    DerivationFailed,
    /// Record store write succeeded.
    Committed,
    /// Terminal failure; nothing committed.
    Rejected,
}

impl IngestStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            IngestStage::Received => "received",
            IngestStage::Stored => "stored",
            IngestStage::Derived => "derived",
            IngestStage::DerivationSkipped => "derivation skipped",
            IngestStage::DerivationFailed => "derivation failed",
            IngestStage::Committed => "committed",
            IngestStage::Rejected => "rejected",
        }
    }

    /// `Committed` and `Rejected` end an operation.
    pub fn is_terminal(&self) -> bool {
        matches!(self, IngestStage::Committed | IngestStage::Rejected)
    }
}

impl fmt::Display for IngestStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Called by the ingestor as a document moves through its stages.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Independent documents may be ingested concurrently,
/// so implementations must synchronise shared state.
pub trait IngestProgressCallback: Send + Sync {
    /// Called on every stage transition.
    ///
    /// # Arguments
    /// * `label` - the document id
    /// * `stage` - the stage just entered
    fn on_stage(&self, label: &str, stage: IngestStage) {
        let _ = (label, stage);
    }

    /// Called once pages have been published.
    fn on_pages_published(&self, label: &str, page_count: usize) {
        let _ = (label, page_count);
    }

    /// Called for each best-effort cleanup step that did not complete.
    fn on_cleanup_issue(&self, label: &str, issue: &CleanupIssue) {
        let _ = (label, issue);
    }
}

/// A no-op implementation; the default when no callback is configured.
pub struct NoopProgressCallback;

impl IngestProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::VaultConfig`].
pub type ProgressCallback = Arc<dyn IngestProgressCallback>;
