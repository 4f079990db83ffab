//! # edgequake-docvault
//!
//! Store uploaded documents, derive one preview file per PDF page, and serve
//! both back out safely.
//!
//! ## Lifecycle Overview
//!
//! ```text
//! upload
//!  │
//!  ├─ 1. Validate  metadata and upload size, before any I/O
//!  ├─ 2. Store     original under a fresh key (temp file + fsync + rename)
//!  ├─ 3. Check     PDF validation via pdfium (spawn_blocking); corrupt → removed, rejected
//!  ├─ 4. Stage     split into split/.staging-*, all pages or none
//!  ├─ 5. Commit    record-store write (SQLite)
//!  └─ 6. Publish   rename staging → split/<id>; remove replaced files
//! ```
//!
//! Retrieval never writes: originals are served as attachments, pages inline,
//! and every page path is confined to its document's directory.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_docvault::{DocVault, MetadataInput, Upload, VaultConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = VaultConfig::builder()
//!         .uploads_root("uploads")
//!         .database_url("sqlite://docvault.db")
//!         .build()?;
//!     let vault = DocVault::open(config).await?;
//!
//!     let bytes = std::fs::read("report.pdf")?;
//!     let report = vault
//!         .create(
//!             MetadataInput::new("Annual report", "Finance", "report"),
//!             Some(Upload::new("report.pdf", bytes)),
//!         )
//!         .await?;
//!     println!("{} pages", report.page_count());
//!     println!("{:?}", vault.list_pages(report.document.id).await?);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `docvault` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-docvault = { version = "0.1", default-features = false }
//! ```
//!
//! ## Known limits
//!
//! A record-store failure after the original was written leaves that file on
//! disk; the error names it in `Persistence { orphaned }`. Listing is
//! unbounded. Opening a vault removes leftover staging, retired and partial
//! upload entries, so two processes must not share an uploads root.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod deriver;
pub mod document;
pub mod error;
pub mod ingest;
pub mod progress;
pub mod records;
pub mod retrieval;
pub mod storage;
pub mod vault;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{VaultConfig, VaultConfigBuilder};
pub use deriver::{ArtifactDeriver, PageSet, PdfCapability, PdfiumCapability, StagedPages, Validation};
pub use document::{
    Document, DocumentId, DocumentMetadata, DocumentStatus, DocumentSummary, MetadataInput, Upload,
};
pub use error::{CleanupIssue, DerivationFailure, DocVaultError, VaultResult};
pub use ingest::{DeleteReport, DerivationOutcome, IngestReport, Ingestor};
pub use progress::{IngestProgressCallback, IngestStage, NoopProgressCallback};
pub use records::{DocumentRecords, SqliteRecords};
pub use retrieval::{Gateway, ServedFile};
pub use storage::{FileStore, Removal, StorageKey, StorageLayout};
pub use vault::DocVault;
