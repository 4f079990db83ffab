//! Ingestion orchestrator: create, replace and delete documents.
//!
//! ## Ordering
//!
//! Every operation has exactly one commit point: the record-store write.
//! Everything before it can be undone or is invisible; everything after it is
//! best-effort and reported, never raised.
//!
//! ```text
//! create   validate ─▶ store original ─▶ validate PDF ─▶ stage pages ─▶ lock ─▶ INSERT ─▶ publish pages
//! replace  validate ─▶ lock ─▶ read old ─▶ store new ─▶ … ─▶ UPDATE ─▶ publish/remove pages ─▶ remove old original
//! delete   lock ─▶ read path ─▶ DELETE ─▶ remove original ─▶ remove pages
//! ```
//!
//! Pages are staged before the commit and published after it, so a failed
//! record write never leaves a visible page set behind.

pub mod locks;

pub use locks::{DocumentGuard, DocumentLocks};

use crate::config::VaultConfig;
use crate::deriver::{ArtifactDeriver, StagedPages, Validation};
use crate::document::{Document, DocumentId, DocumentStatus, MetadataInput, Upload};
use crate::error::{CleanupIssue, DerivationFailure, DocVaultError, VaultResult};
use crate::progress::{IngestProgressCallback, IngestStage, NoopProgressCallback};
use crate::records::DocumentRecords;
use crate::storage::{FileStore, StorageKey};
use chrono::{SubsecRound, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn, Span};

// ── Outcomes ─────────────────────────────────────────────────────────────

/// What happened to the preview pages of a committed document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DerivationOutcome {
    /// A complete page set is published.
    Derived { pages: usize },
    /// The file kind has no pages.
    Skipped,
    /// Derivation failed; the document has no pages.
    Failed(DerivationFailure),
    /// Metadata-only update; pages were not touched.
    Untouched,
}

/// Result of a successful create or replace.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub document: Document,
    pub derivation: DerivationOutcome,
    /// Best-effort steps after the commit that did not complete.
    pub cleanup: Vec<CleanupIssue>,
}

impl IngestReport {
    pub fn page_count(&self) -> usize {
        match self.derivation {
            DerivationOutcome::Derived { pages } => pages,
            _ => 0,
        }
    }

    /// No derivation failure and no leftover files.
    pub fn is_clean(&self) -> bool {
        self.cleanup.is_empty() && !matches!(self.derivation, DerivationOutcome::Failed(_))
    }
}

/// Result of a successful delete.
#[derive(Debug, Clone, Serialize)]
pub struct DeleteReport {
    pub id: DocumentId,
    /// Storage key the document pointed at.
    pub file_path: StorageKey,
    pub cleanup: Vec<CleanupIssue>,
}

// ── Orchestrator ─────────────────────────────────────────────────────────

/// Pages prepared for an original that is not yet committed.
enum PagePlan {
    Staged(StagedPages),
    Skipped,
    Failed(DerivationFailure),
}

struct Prepared {
    key: StorageKey,
    pages: PagePlan,
}

/// The only writer of document records and their files.
pub struct Ingestor {
    store: FileStore,
    records: Arc<dyn DocumentRecords>,
    deriver: ArtifactDeriver,
    locks: DocumentLocks,
    max_upload_bytes: u64,
    default_status: DocumentStatus,
    progress: Arc<dyn IngestProgressCallback>,
}

impl Ingestor {
    pub fn new(
        store: FileStore,
        records: Arc<dyn DocumentRecords>,
        deriver: ArtifactDeriver,
        config: &VaultConfig,
    ) -> Self {
        Self {
            store,
            records,
            deriver,
            locks: DocumentLocks::new(),
            max_upload_bytes: config.max_upload_bytes,
            default_status: config.default_status,
            progress: config
                .progress_callback
                .clone()
                .unwrap_or_else(|| Arc::new(NoopProgressCallback)),
        }
    }

    /// Create a document from metadata and an uploaded file.
    #[instrument(skip_all, fields(id = tracing::field::Empty))]
    pub async fn create(
        &self,
        input: MetadataInput,
        upload: Option<Upload>,
    ) -> VaultResult<IngestReport> {
        let metadata = input.validate(self.default_status)?;
        let upload = self.check_upload(upload)?;

        let id = DocumentId::generate();
        Span::current().record("id", tracing::field::display(id));
        let label = id.to_string();
        self.progress.on_stage(&label, IngestStage::Received);

        let prepared = self
            .prepare(&label, &upload)
            .await
            .inspect_err(|_| self.progress.on_stage(&label, IngestStage::Rejected))?;

        let document = Document {
            id,
            title: metadata.title,
            author: metadata.author,
            kind: metadata.kind,
            status: metadata.status,
            file_path: prepared.key.clone(),
            // Stored with microsecond precision.
            created_at: Utc::now().trunc_subsecs(6),
        };

        // The row is visible once inserted; hold the id until pages are out.
        let _guard = self.locks.acquire(id).await;
        if let Err(e) = self.records.insert(&document).await {
            self.progress.on_stage(&label, IngestStage::Rejected);
            return Err(orphaned(e, &prepared.key));
        }
        info!(key = %document.file_path, title = %document.title, "Document created");

        let (derivation, cleanup) = self.finish_pages(id, &label, prepared.pages, false).await;
        self.progress.on_stage(&label, IngestStage::Committed);
        Ok(IngestReport {
            document,
            derivation,
            cleanup,
        })
    }

    /// Update a document's metadata and, when `upload` is given, replace its
    /// original.
    ///
    /// The old original and page set are removed only after the record points
    /// at the new file.
    #[instrument(skip(self, input, upload), fields(id = %id))]
    pub async fn replace(
        &self,
        id: DocumentId,
        input: MetadataInput,
        upload: Option<Upload>,
    ) -> VaultResult<IngestReport> {
        let metadata = input.validate(self.default_status)?;
        let upload = upload.map(|u| self.check_upload(Some(u))).transpose()?;

        let _guard = self.locks.acquire(id).await;
        let mut document = self.records.get(id).await?;

        let Some(upload) = upload else {
            self.records
                .update_metadata_and_path(id, &metadata, None)
                .await?;
            document.apply(metadata);
            info!("Document metadata updated");
            return Ok(IngestReport {
                document,
                derivation: DerivationOutcome::Untouched,
                cleanup: Vec::new(),
            });
        };

        let label = id.to_string();
        self.progress.on_stage(&label, IngestStage::Received);
        let old_key = document.file_path.clone();

        let prepared = self
            .prepare(&label, &upload)
            .await
            .inspect_err(|_| self.progress.on_stage(&label, IngestStage::Rejected))?;

        if let Err(e) = self
            .records
            .update_metadata_and_path(id, &metadata, Some(&prepared.key))
            .await
        {
            self.progress.on_stage(&label, IngestStage::Rejected);
            if matches!(e, DocVaultError::NotFound { .. }) {
                // Nothing references the new file; it can go.
                self.discard_original(&prepared.key).await;
                return Err(e);
            }
            return Err(orphaned(e, &prepared.key));
        }
        document.apply(metadata);
        document.file_path = prepared.key.clone();
        info!(key = %prepared.key, old_key = %old_key, "Document original replaced");

        let (derivation, mut cleanup) = self.finish_pages(id, &label, prepared.pages, true).await;
        if old_key != prepared.key {
            if let Some(issue) = self.discard_original(&old_key).await {
                self.progress.on_cleanup_issue(&label, &issue);
                cleanup.push(issue);
            }
        }

        self.progress.on_stage(&label, IngestStage::Committed);
        Ok(IngestReport {
            document,
            derivation,
            cleanup,
        })
    }

    /// Delete a document, its original and its pages.
    ///
    /// The row deletion is the commit point; file removal afterwards is
    /// best-effort and reported in [`DeleteReport::cleanup`].
    #[instrument(skip(self), fields(id = %id))]
    pub async fn delete(&self, id: DocumentId) -> VaultResult<DeleteReport> {
        let _guard = self.locks.acquire(id).await;
        let file_path = self.records.get_path_by_id(id).await?;
        self.records.delete(id).await?;
        info!(key = %file_path, "Document deleted");

        let label = id.to_string();
        let mut cleanup = Vec::new();
        cleanup.extend(self.discard_original(&file_path).await);
        cleanup.extend(self.discard_pages(id).await);
        for issue in &cleanup {
            self.progress.on_cleanup_issue(&label, issue);
        }

        Ok(DeleteReport {
            id,
            file_path,
            cleanup,
        })
    }

    /// Required, non-empty and within the size ceiling. No I/O.
    fn check_upload(&self, upload: Option<Upload>) -> VaultResult<Upload> {
        let upload =
            upload.ok_or_else(|| DocVaultError::Validation("file is required".into()))?;
        if upload.bytes.is_empty() {
            return Err(DocVaultError::Validation(
                "uploaded file is empty".into(),
            ));
        }
        if upload.bytes.len() as u64 > self.max_upload_bytes {
            return Err(DocVaultError::Validation(format!(
                "uploaded file exceeds the {} byte limit",
                self.max_upload_bytes
            )));
        }
        Ok(upload)
    }

    /// Store the original and, for derivable kinds, validate and stage pages.
    ///
    /// A corrupt file is removed again before the error is returned.
    async fn prepare(&self, label: &str, upload: &Upload) -> VaultResult<Prepared> {
        let extension = upload.extension();
        let key = self.store.store(&upload.bytes, extension.as_deref()).await?;
        self.progress.on_stage(label, IngestStage::Stored);

        if !self.deriver.is_derivable(key.extension()) {
            debug!(key = %key, "Not a derivable kind");
            self.progress.on_stage(label, IngestStage::DerivationSkipped);
            return Ok(Prepared {
                key,
                pages: PagePlan::Skipped,
            });
        }

        let path = self.store.resolve(&key);
        if let Validation::Corrupt(reason) = self.deriver.validate(&path).await {
            warn!(key = %key, %reason, "Rejecting corrupt upload");
            if let Some(issue) = self.discard_original(&key).await {
                error!(%issue, "Corrupt upload could not be removed");
            }
            return Err(DocVaultError::CorruptArtifact {
                filename: upload.filename.clone(),
                reason,
            });
        }

        let pages = match self
            .deriver
            .stage(&path, &self.store.layout().split_root())
            .await
        {
            Ok(staged) => {
                debug!(key = %key, pages = staged.page_count(), "Pages staged");
                self.progress.on_stage(label, IngestStage::Derived);
                PagePlan::Staged(staged)
            }
            Err(failure) => {
                warn!(key = %key, reason = %failure.reason, "Page derivation failed; continuing without pages");
                self.progress.on_stage(label, IngestStage::DerivationFailed);
                PagePlan::Failed(failure)
            }
        };

        Ok(Prepared { key, pages })
    }

    /// Publish staged pages after the commit. When there is nothing to
    /// publish and `replacing`, the previous page set is removed so old pages
    /// are never served for a new original.
    async fn finish_pages(
        &self,
        id: DocumentId,
        label: &str,
        plan: PagePlan,
        replacing: bool,
    ) -> (DerivationOutcome, Vec<CleanupIssue>) {
        let outcome = match plan {
            PagePlan::Staged(staged) => {
                let dest = self.store.layout().split_dir(id);
                match staged.publish(&dest).await {
                    Ok(set) => {
                        self.progress.on_pages_published(label, set.pages.len());
                        return (
                            DerivationOutcome::Derived {
                                pages: set.pages.len(),
                            },
                            Vec::new(),
                        );
                    }
                    Err(e) => {
                        warn!(dir = %dest.display(), error = %e, "Could not publish pages");
                        DerivationOutcome::Failed(DerivationFailure::new(format!(
                            "could not publish pages: {e}"
                        )))
                    }
                }
            }
            PagePlan::Skipped => DerivationOutcome::Skipped,
            PagePlan::Failed(failure) => DerivationOutcome::Failed(failure),
        };

        let mut cleanup = Vec::new();
        if replacing {
            if let Some(issue) = self.discard_pages(id).await {
                self.progress.on_cleanup_issue(label, &issue);
                cleanup.push(issue);
            }
        }
        (outcome, cleanup)
    }

    async fn discard_original(&self, key: &StorageKey) -> Option<CleanupIssue> {
        match self.store.remove(key).await {
            Ok(removal) => {
                debug!(key = %key, ?removal, "Original removed");
                None
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Could not remove original");
                Some(CleanupIssue::Original {
                    path: self.store.resolve(key),
                    detail: e.to_string(),
                })
            }
        }
    }

    async fn discard_pages(&self, id: DocumentId) -> Option<CleanupIssue> {
        match self.store.remove_tree(id).await {
            Ok(removal) => {
                debug!(?removal, "Page directory removed");
                None
            }
            Err(e) => {
                let path = self.store.layout().split_dir(id);
                warn!(dir = %path.display(), error = %e, "Could not remove page directory");
                Some(CleanupIssue::PageTree {
                    path,
                    detail: e.to_string(),
                })
            }
        }
    }
}

/// Attach the storage key a failed record write left behind.
///
/// The file is not removed; it is logged so an offline sweep can find it.
fn orphaned(err: DocVaultError, key: &StorageKey) -> DocVaultError {
    match err {
        DocVaultError::Persistence {
            operation, source, ..
        } => {
            error!(key = %key, operation, error = %source, "Record write failed after the original was stored; file is orphaned");
            DocVaultError::Persistence {
                operation,
                orphaned: Some(key.to_string()),
                source,
            }
        }
        other => other,
    }
}
