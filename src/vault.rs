//! [`DocVault`]: one storage tree, one record store, one PDF capability.
//!
//! Everything is constructed once here and handed to the [`Ingestor`] and
//! the [`Gateway`] by reference; nothing in the crate reaches for a global.

use crate::config::VaultConfig;
use crate::deriver::{ArtifactDeriver, PdfCapability, PdfiumCapability};
use crate::document::{Document, DocumentId, DocumentSummary, MetadataInput, Upload};
use crate::error::VaultResult;
use crate::ingest::{DeleteReport, IngestReport, Ingestor};
use crate::records::{DocumentRecords, SqliteRecords};
use crate::retrieval::{Gateway, ServedFile};
use crate::storage::{FileStore, StorageLayout};
use std::sync::Arc;
use tracing::info;

pub struct DocVault {
    ingestor: Ingestor,
    gateway: Gateway,
    records: Arc<dyn DocumentRecords>,
    store: FileStore,
}

impl DocVault {
    /// Open the vault described by `config` with the pdfium backend.
    ///
    /// Fails with `PdfiumBindingFailed` if the library cannot be loaded.
    pub async fn open(config: VaultConfig) -> VaultResult<Self> {
        let pdfium = PdfiumCapability::new(config.pdfium_lib_path.clone());
        pdfium.check_binding()?;
        Self::with_capability(config, Arc::new(pdfium)).await
    }

    /// Open with a caller-supplied PDF capability.
    pub async fn with_capability(
        config: VaultConfig,
        capability: Arc<dyn PdfCapability>,
    ) -> VaultResult<Self> {
        let records = SqliteRecords::connect(&config.database_url).await?;
        Self::with_parts(config, Arc::new(records), capability).await
    }

    /// Open with caller-supplied record store and PDF capability.
    pub async fn with_parts(
        config: VaultConfig,
        records: Arc<dyn DocumentRecords>,
        capability: Arc<dyn PdfCapability>,
    ) -> VaultResult<Self> {
        let store = FileStore::new(StorageLayout::new(&config.uploads_root)).await?;
        let deriver = ArtifactDeriver::new(capability, &config.derivable_extensions);
        let ingestor = Ingestor::new(store.clone(), Arc::clone(&records), deriver, &config);
        let gateway = Gateway::new(
            Arc::clone(&records),
            store.layout().clone(),
            config.preview_max_age_secs,
        );

        info!(root = %store.layout().root().display(), "Document vault opened");
        Ok(Self {
            ingestor,
            gateway,
            records,
            store,
        })
    }

    pub fn ingestor(&self) -> &Ingestor {
        &self.ingestor
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    pub fn layout(&self) -> &StorageLayout {
        self.store.layout()
    }

    pub async fn create(
        &self,
        metadata: MetadataInput,
        upload: Option<Upload>,
    ) -> VaultResult<IngestReport> {
        self.ingestor.create(metadata, upload).await
    }

    pub async fn update(
        &self,
        id: DocumentId,
        metadata: MetadataInput,
        upload: Option<Upload>,
    ) -> VaultResult<IngestReport> {
        self.ingestor.replace(id, metadata, upload).await
    }

    pub async fn delete(&self, id: DocumentId) -> VaultResult<DeleteReport> {
        self.ingestor.delete(id).await
    }

    pub async fn get(&self, id: DocumentId) -> VaultResult<Document> {
        self.gateway.get(id).await
    }

    pub async fn list(&self) -> VaultResult<Vec<DocumentSummary>> {
        self.gateway.list().await
    }

    pub async fn list_pages(&self, id: DocumentId) -> VaultResult<Vec<String>> {
        self.gateway.list_pages(id).await
    }

    pub async fn download(&self, id: DocumentId) -> VaultResult<ServedFile> {
        self.gateway.download(id).await
    }

    pub async fn preview(&self, id: DocumentId, page: &str) -> VaultResult<ServedFile> {
        self.gateway.preview(id, page).await
    }

    pub async fn health_check(&self) -> VaultResult<()> {
        self.records.health_check().await
    }
}
