//! Error types for the edgequake-docvault library.
//!
//! Two kinds of failure exist, and they are kept apart:
//!
//! * [`DocVaultError`]: **fatal**. The operation was rejected or could not
//!   reach its commit point (bad metadata, corrupt PDF, disk or database
//!   failure, unknown id). Returned as `Err(DocVaultError)`.
//!
//! * [`DerivationFailure`] and [`CleanupIssue`]: **non-fatal**. The document
//!   was committed, but preview pages could not be produced or an old file
//!   could not be removed. These travel inside
//!   [`crate::ingest::IngestReport`] / [`crate::ingest::DeleteReport`] so
//!   callers and tests can inspect them instead of grepping logs.

use std::path::PathBuf;
use thiserror::Error;

/// Message shown to users for any storage or persistence failure.
///
/// Internal paths and driver messages stay in the logs.
pub const GENERIC_FAILURE_MESSAGE: &str = "The document could not be saved. Please try again later.";

/// All fatal errors returned by the edgequake-docvault library.
#[derive(Debug, Error)]
pub enum DocVaultError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Required metadata missing, upload missing/empty/too large, bad status.
    /// Raised before any disk or database access.
    #[error("Invalid request: {0}")]
    Validation(String),

    /// Unknown (or unparseable) document id.
    #[error("Document not found: {id}")]
    NotFound { id: String },

    /// A preview path tried to leave the document's page directory.
    #[error("Rejected page path '{requested}': it escapes the document's page directory")]
    PathTraversal { requested: String },

    // ── Artifact errors ───────────────────────────────────────────────────
    /// The uploaded file failed format validation. The stored copy has
    /// already been removed when this is returned.
    #[error("Uploaded file '{filename}' is corrupt or not a valid PDF: {reason}")]
    CorruptArtifact { filename: String, reason: String },

    /// A derived page exists but is zero bytes long.
    #[error("Derived page '{}' is empty", path.display())]
    EmptyArtifact { path: PathBuf },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Writing an original failed. Nothing was left addressable.
    #[error("Failed to write '{}': {source}", path.display())]
    StorageWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Reading an original or a derived page failed.
    #[error("Failed to read '{}': {source}", path.display())]
    StorageRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Record store errors ───────────────────────────────────────────────
    /// The record store failed. When the failure happened after a file was
    /// written, `orphaned` names the storage key left without a row.
    #[error("Record store failed during {operation}: {source}")]
    Persistence {
        operation: &'static str,
        orphaned: Option<String>,
        #[source]
        source: sqlx::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set DOCVAULT_PDFIUM_LIB (or --pdfium-lib) to the directory or file of an existing libpdfium."
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error (a blocking task panicked, etc.).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DocVaultError {
    /// Shorthand for a record-store failure with no orphaned file.
    pub(crate) fn persistence(operation: &'static str, source: sqlx::Error) -> Self {
        DocVaultError::Persistence {
            operation,
            orphaned: None,
            source,
        }
    }

    /// `true` for errors caused by the request itself (the HTTP 4xx family).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            DocVaultError::Validation(_)
                | DocVaultError::NotFound { .. }
                | DocVaultError::PathTraversal { .. }
                | DocVaultError::CorruptArtifact { .. }
        )
    }

    /// Stable text that is safe to show to an end user.
    ///
    /// Validation, not-found and corrupt-file errors are descriptive; all
    /// storage, persistence and internal failures collapse to
    /// [`GENERIC_FAILURE_MESSAGE`] so no path or driver detail leaks.
    pub fn user_message(&self) -> String {
        match self {
            DocVaultError::Validation(msg) => msg.clone(),
            DocVaultError::NotFound { .. } => "Document not found".to_string(),
            DocVaultError::PathTraversal { .. } => "Invalid page path".to_string(),
            DocVaultError::CorruptArtifact { reason, .. } => {
                format!("The uploaded PDF is corrupt or invalid: {reason}")
            }
            DocVaultError::EmptyArtifact { .. } => "The requested page is unavailable".to_string(),
            _ => GENERIC_FAILURE_MESSAGE.to_string(),
        }
    }
}

/// Result alias used throughout the crate.
pub type VaultResult<T> = std::result::Result<T, DocVaultError>;

/// Page derivation did not produce a complete page set.
///
/// Never fatal: the original is kept and the document is committed without
/// preview pages.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
#[error("page derivation failed: {reason}")]
pub struct DerivationFailure {
    pub reason: String,
}

impl DerivationFailure {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// A best-effort cleanup step that did not complete.
///
/// The document operation itself succeeded; the named file or directory may
/// still be on disk and is a candidate for an offline sweep.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum CleanupIssue {
    /// An original that should have been removed is still present.
    #[error("could not remove original '{}': {detail}", path.display())]
    Original { path: PathBuf, detail: String },

    /// A page directory that should have been removed is still present.
    #[error("could not remove page directory '{}': {detail}", path.display())]
    PageTree { path: PathBuf, detail: String },
}
