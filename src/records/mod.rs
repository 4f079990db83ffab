//! Document record store.
//!
//! The record store is the source of truth for which documents exist and
//! which storage key is current for each. Every successful write is the
//! commit point of the ingestion operation that issued it.

pub mod sqlite;

pub use sqlite::SqliteRecords;

use crate::document::{Document, DocumentId, DocumentMetadata, DocumentSummary};
use crate::error::VaultResult;
use crate::storage::StorageKey;
use async_trait::async_trait;

/// Persistence seam for document rows.
#[async_trait]
pub trait DocumentRecords: Send + Sync {
    /// Insert a new row. The id must be fresh.
    async fn insert(&self, document: &Document) -> VaultResult<()>;

    /// Overwrite the metadata of an existing row, and its storage key when
    /// `file_path` is given. `NotFound` if no row has this id.
    async fn update_metadata_and_path(
        &self,
        id: DocumentId,
        metadata: &DocumentMetadata,
        file_path: Option<&StorageKey>,
    ) -> VaultResult<()>;

    /// Fetch one row. `NotFound` if absent.
    async fn get(&self, id: DocumentId) -> VaultResult<Document>;

    /// Current storage key of a document. `NotFound` if absent.
    async fn get_path_by_id(&self, id: DocumentId) -> VaultResult<StorageKey>;

    /// Delete one row. `NotFound` if absent.
    async fn delete(&self, id: DocumentId) -> VaultResult<()>;

    /// All rows, newest first, insertion order breaking ties.
    ///
    /// Unbounded; callers with large collections should add paging.
    async fn list(&self) -> VaultResult<Vec<DocumentSummary>>;

    /// Check connectivity.
    async fn health_check(&self) -> VaultResult<()>;
}
