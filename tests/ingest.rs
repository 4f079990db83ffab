//! Create / replace / delete behaviour against a real SQLite store and a
//! scripted PDF capability.

mod common;

use common::{fake_pdf, open_vault, open_vault_with, truncated_pdf, FakePdf};
use async_trait::async_trait;
use edgequake_docvault::{
    DerivationOutcome, DocVault, DocVaultError, Document, DocumentId, DocumentMetadata,
    DocumentRecords, DocumentStatus, DocumentSummary, IngestProgressCallback, IngestStage,
    MetadataInput, SqliteRecords, StorageKey, Upload, VaultConfig, VaultResult,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio_test::{assert_err, assert_ok};

fn meta() -> MetadataInput {
    MetadataInput::new("T", "A", "paper")
}

fn pdf(name: &str, pages: usize) -> Option<Upload> {
    Some(Upload::new(name, fake_pdf(pages)))
}

// ── Create ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn valid_pdf_is_stored_listed_and_split() {
    let tv = open_vault(FakePdf::new()).await;

    let report = assert_ok!(tv.vault.create(meta(), pdf("report.pdf", 3)).await);
    assert_eq!(report.derivation, DerivationOutcome::Derived { pages: 3 });
    assert!(report.is_clean());

    let docs = tv.vault.list().await.unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].status, DocumentStatus::Draft);
    assert_eq!(docs[0].title, "T");

    let pages = tv.vault.list_pages(report.document.id).await.unwrap();
    assert_eq!(pages, vec!["page-0001.pdf", "page-0002.pdf", "page-0003.pdf"]);
    assert!(pages.iter().all(|p| p.ends_with(".pdf")));
}

#[tokio::test]
async fn committed_path_resolves_to_non_empty_file() {
    let tv = open_vault(FakePdf::new()).await;
    let report = tv.vault.create(meta(), pdf("a.pdf", 1)).await.unwrap();

    let key = tv.records.get_path_by_id(report.document.id).await.unwrap();
    let path = tv.uploads().join(key.as_str());
    assert!(std::fs::metadata(&path).unwrap().len() > 0);
    assert_eq!(key, report.document.file_path);
}

#[tokio::test]
async fn corrupt_pdf_leaves_no_row_and_no_file() {
    let tv = open_vault(FakePdf::new()).await;

    let err = tv
        .vault
        .create(meta(), Some(Upload::new("broken.pdf", truncated_pdf(3))))
        .await
        .unwrap_err();
    assert!(matches!(err, DocVaultError::CorruptArtifact { .. }), "{err:?}");
    assert!(err.is_client_error());

    assert!(tv.vault.list().await.unwrap().is_empty());
    assert!(tv.originals().is_empty());
    assert!(tv.split_entries().is_empty());
}

#[tokio::test]
async fn missing_metadata_is_rejected_before_io() {
    let tv = open_vault(FakePdf::new()).await;

    for input in [
        MetadataInput::new("", "A", "paper"),
        MetadataInput::new("T", "   ", "paper"),
        MetadataInput {
            category: None,
            ..MetadataInput::new("T", "A", "x")
        },
        meta().with_status("archived"),
    ] {
        let err = tv.vault.create(input, pdf("a.pdf", 1)).await.unwrap_err();
        assert!(matches!(err, DocVaultError::Validation(_)), "{err:?}");
    }
    assert!(tv.originals().is_empty());
}

#[tokio::test]
async fn missing_empty_and_oversized_uploads_are_rejected() {
    let tv = open_vault_with(FakePdf::new(), VaultConfig::builder().max_upload_bytes(32)).await;

    assert_err!(tv.vault.create(meta(), None).await);
    assert_err!(
        tv.vault
            .create(meta(), Some(Upload::new("a.pdf", Vec::new())))
            .await
    );
    let err = tv.vault.create(meta(), pdf("big.pdf", 10)).await.unwrap_err();
    assert!(err.user_message().contains("32 byte limit"));

    assert!(tv.originals().is_empty());
    assert!(tv.vault.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn non_pdf_kinds_are_accepted_without_pages() {
    let fake = FakePdf::new();
    let tv = open_vault(fake.clone()).await;

    for name in ["notes.txt", "scan.PNG", "README"] {
        let report = tv
            .vault
            .create(meta(), Some(Upload::new(name, b"hello".to_vec())))
            .await
            .unwrap();
        assert_eq!(report.derivation, DerivationOutcome::Skipped);
        assert!(tv.vault.list_pages(report.document.id).await.unwrap().is_empty());
    }
    assert_eq!(fake.split_count(), 0);
    assert_eq!(tv.originals().len(), 3);
}

#[tokio::test]
async fn extension_detection_is_case_insensitive() {
    let tv = open_vault(FakePdf::new()).await;
    let report = tv.vault.create(meta(), pdf("REPORT.PDF", 2)).await.unwrap();
    assert_eq!(report.page_count(), 2);
    assert!(report.document.file_path.as_str().ends_with(".pdf"));
}

#[tokio::test]
async fn split_failing_midway_publishes_no_pages() {
    let tv = open_vault(FakePdf::failing_after(2)).await;

    let report = tv.vault.create(meta(), pdf("long.pdf", 5)).await.unwrap();
    assert!(matches!(report.derivation, DerivationOutcome::Failed(_)));
    assert!(!report.is_clean());

    // Committed without pages: never 2 of 5.
    assert_eq!(tv.vault.list().await.unwrap().len(), 1);
    assert!(tv.vault.list_pages(report.document.id).await.unwrap().is_empty());
    assert!(tv.split_entries().is_empty(), "staging left behind");
}

#[tokio::test]
async fn zero_byte_page_fails_the_whole_set() {
    let tv = open_vault(FakePdf::with_empty_page(2)).await;

    let report = tv.vault.create(meta(), pdf("a.pdf", 3)).await.unwrap();
    match &report.derivation {
        DerivationOutcome::Failed(f) => assert!(f.reason.contains("empty")),
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(tv.vault.list_pages(report.document.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn persistence_failure_reports_orphaned_key() {
    let tv = open_vault(FakePdf::new()).await;
    tv.records.close().await;

    let err = tv.vault.create(meta(), pdf("a.pdf", 2)).await.unwrap_err();
    let orphan = match &err {
        DocVaultError::Persistence { orphaned, .. } => orphaned.clone().unwrap(),
        other => panic!("expected persistence error, got {other:?}"),
    };
    assert_eq!(err.user_message(), edgequake_docvault::error::GENERIC_FAILURE_MESSAGE);

    // The original stays for an offline sweep; no page set was published.
    assert_eq!(tv.originals(), vec![orphan]);
    assert!(tv.split_entries().is_empty());
}

// ── Replace ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn replacing_with_same_bytes_twice_keeps_one_original() {
    let tv = open_vault(FakePdf::new()).await;
    let created = tv.vault.create(meta(), pdf("a.pdf", 2)).await.unwrap();
    let id = created.document.id;

    let first = tv.vault.update(id, meta(), pdf("a.pdf", 2)).await.unwrap();
    let second = tv.vault.update(id, meta(), pdf("a.pdf", 2)).await.unwrap();

    assert_ne!(first.document.file_path, created.document.file_path);
    assert_ne!(second.document.file_path, first.document.file_path);
    assert_eq!(tv.originals(), vec![second.document.file_path.to_string()]);
    assert_eq!(
        tv.records.get_path_by_id(id).await.unwrap(),
        second.document.file_path
    );
    assert_eq!(tv.vault.list_pages(id).await.unwrap().len(), 2);
    assert_eq!(tv.split_entries(), vec![id.to_string()]);
}

#[tokio::test]
async fn replace_preserves_identity_and_creation_time() {
    let tv = open_vault(FakePdf::new()).await;
    let created = tv.vault.create(meta(), pdf("a.pdf", 1)).await.unwrap();

    let updated = tv
        .vault
        .update(
            created.document.id,
            MetadataInput::new("T2", "B", "thesis").with_status("PUBLISHED"),
            pdf("b.pdf", 4),
        )
        .await
        .unwrap();

    let stored = tv.vault.get(created.document.id).await.unwrap();
    assert_eq!(stored, updated.document);
    assert_eq!(stored.created_at, created.document.created_at);
    assert_eq!(stored.status, DocumentStatus::Published);
    assert_eq!(stored.kind, "thesis");
    assert_eq!(updated.page_count(), 4);
}

#[tokio::test]
async fn replacing_pdf_with_other_kind_removes_old_pages() {
    let tv = open_vault(FakePdf::new()).await;
    let created = tv.vault.create(meta(), pdf("a.pdf", 3)).await.unwrap();
    let id = created.document.id;

    let report = tv
        .vault
        .update(id, meta(), Some(Upload::new("a.txt", b"text".to_vec())))
        .await
        .unwrap();
    assert_eq!(report.derivation, DerivationOutcome::Skipped);
    assert!(tv.vault.list_pages(id).await.unwrap().is_empty());
    assert!(!tv.vault.layout().split_dir(id).exists());
}

#[tokio::test]
async fn replace_with_corrupt_file_keeps_old_document() {
    let tv = open_vault(FakePdf::new()).await;
    let created = tv.vault.create(meta(), pdf("a.pdf", 2)).await.unwrap();
    let id = created.document.id;

    let err = tv
        .vault
        .update(
            id,
            MetadataInput::new("changed", "A", "paper"),
            Some(Upload::new("b.pdf", truncated_pdf(2))),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DocVaultError::CorruptArtifact { .. }));

    let doc = tv.vault.get(id).await.unwrap();
    assert_eq!(doc.title, "T");
    assert_eq!(doc.file_path, created.document.file_path);
    assert_eq!(tv.originals(), vec![created.document.file_path.to_string()]);
    assert_eq!(tv.vault.list_pages(id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn replace_of_unknown_id_writes_nothing() {
    let tv = open_vault(FakePdf::new()).await;
    let id = edgequake_docvault::DocumentId::generate();

    let err = tv.vault.update(id, meta(), pdf("a.pdf", 1)).await.unwrap_err();
    assert!(matches!(err, DocVaultError::NotFound { .. }));
    assert!(tv.originals().is_empty());
    assert!(tv.split_entries().is_empty());
}

#[tokio::test]
async fn metadata_only_update_leaves_files_untouched() {
    let fake = FakePdf::new();
    let tv = open_vault(fake.clone()).await;
    let created = tv.vault.create(meta(), pdf("a.pdf", 2)).await.unwrap();
    let id = created.document.id;

    let report = tv
        .vault
        .update(id, MetadataInput::new("New", "A", "paper"), None)
        .await
        .unwrap();
    assert_eq!(report.derivation, DerivationOutcome::Untouched);
    assert_eq!(report.document.title, "New");
    assert_eq!(report.document.file_path, created.document.file_path);
    assert_eq!(tv.vault.list_pages(id).await.unwrap().len(), 2);
    assert_eq!(fake.split_count(), 1);

    // Metadata is validated exactly as on create.
    let err = tv
        .vault
        .update(id, MetadataInput::new("", "A", "paper"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, DocVaultError::Validation(_)));
}

#[tokio::test]
async fn concurrent_replaces_on_one_document_are_serialised() {
    let tv = open_vault(FakePdf::new()).await;
    let created = tv.vault.create(meta(), pdf("a.pdf", 1)).await.unwrap();
    let id = created.document.id;
    let vault = Arc::new(tv.vault);

    let mut tasks = Vec::new();
    for pages in 1..=6 {
        let vault = Arc::clone(&vault);
        tasks.push(tokio::spawn(async move {
            vault.update(id, meta(), pdf("a.pdf", pages)).await
        }));
    }
    for t in tasks {
        t.await.unwrap().unwrap();
    }

    let current = vault.get(id).await.unwrap();
    let originals: Vec<_> = std::fs::read_dir(vault.layout().root())
        .unwrap()
        .map(|e| e.unwrap())
        .filter(|e| e.file_type().unwrap().is_file())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(originals, vec![current.file_path.to_string()]);

    let pages = vault.list_pages(id).await.unwrap().len();
    assert!((1..=6).contains(&pages));
}

/// Record store whose `insert` commits, then waits to be released.
struct PausedInsert {
    inner: SqliteRecords,
    inserted: Notify,
    release: Notify,
    last_id: Mutex<Option<DocumentId>>,
}

#[async_trait]
impl DocumentRecords for PausedInsert {
    async fn insert(&self, document: &Document) -> VaultResult<()> {
        self.inner.insert(document).await?;
        *self.last_id.lock().unwrap() = Some(document.id);
        self.inserted.notify_one();
        self.release.notified().await;
        Ok(())
    }

    async fn update_metadata_and_path(
        &self,
        id: DocumentId,
        metadata: &DocumentMetadata,
        file_path: Option<&StorageKey>,
    ) -> VaultResult<()> {
        self.inner.update_metadata_and_path(id, metadata, file_path).await
    }

    async fn get(&self, id: DocumentId) -> VaultResult<Document> {
        self.inner.get(id).await
    }

    async fn get_path_by_id(&self, id: DocumentId) -> VaultResult<StorageKey> {
        self.inner.get_path_by_id(id).await
    }

    async fn delete(&self, id: DocumentId) -> VaultResult<()> {
        self.inner.delete(id).await
    }

    async fn list(&self) -> VaultResult<Vec<DocumentSummary>> {
        self.inner.list().await
    }

    async fn health_check(&self) -> VaultResult<()> {
        self.inner.health_check().await
    }
}

#[tokio::test]
async fn delete_during_create_waits_for_pages_to_publish() {
    common::init_tracing();
    let tmp = tempfile::tempdir().unwrap();
    let config = VaultConfig::builder()
        .uploads_root(tmp.path().join("uploads"))
        .database_url("sqlite::memory:")
        .build()
        .unwrap();
    let records = Arc::new(PausedInsert {
        inner: SqliteRecords::connect(&config.database_url).await.unwrap(),
        inserted: Notify::new(),
        release: Notify::new(),
        last_id: Mutex::new(None),
    });
    let vault = Arc::new(
        DocVault::with_parts(config, records.clone(), FakePdf::new())
            .await
            .unwrap(),
    );

    let creating = {
        let vault = Arc::clone(&vault);
        tokio::spawn(async move { vault.create(meta(), pdf("report.pdf", 3)).await })
    };
    records.inserted.notified().await;
    let id = records.last_id.lock().unwrap().unwrap();
    // The row is already listed while the create is still in flight.
    assert_eq!(vault.list().await.unwrap().len(), 1);

    let deleting = {
        let vault = Arc::clone(&vault);
        tokio::spawn(async move { vault.delete(id).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!deleting.is_finished(), "delete ran while create held the id");

    records.release.notify_one();
    let created = creating.await.unwrap().unwrap();
    assert_eq!(created.derivation, DerivationOutcome::Derived { pages: 3 });
    let deleted = deleting.await.unwrap().unwrap();
    assert!(deleted.cleanup.is_empty());

    assert!(matches!(vault.get(id).await, Err(DocVaultError::NotFound { .. })));
    assert!(!vault.layout().split_dir(id).exists());
    assert!(vault.list_pages(id).await.unwrap().is_empty());
    let originals = std::fs::read_dir(vault.layout().root())
        .unwrap()
        .filter(|e| e.as_ref().unwrap().file_type().unwrap().is_file())
        .count();
    assert_eq!(originals, 0);
}

// ── Delete ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn delete_removes_row_original_and_pages() {
    let tv = open_vault(FakePdf::new()).await;
    let created = tv.vault.create(meta(), pdf("a.pdf", 3)).await.unwrap();
    let id = created.document.id;

    let report = tv.vault.delete(id).await.unwrap();
    assert!(report.cleanup.is_empty());
    assert_eq!(report.file_path, created.document.file_path);

    assert!(matches!(
        tv.records.get_path_by_id(id).await,
        Err(DocVaultError::NotFound { .. })
    ));
    assert!(tv.originals().is_empty());
    assert!(!tv.vault.layout().split_dir(id).exists());
    assert!(tv.vault.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn delete_tolerates_files_already_gone() {
    let tv = open_vault(FakePdf::new()).await;
    let created = tv.vault.create(meta(), pdf("a.pdf", 1)).await.unwrap();
    std::fs::remove_file(tv.uploads().join(created.document.file_path.as_str())).unwrap();
    std::fs::remove_dir_all(tv.vault.layout().split_dir(created.document.id)).unwrap();

    let report = tv.vault.delete(created.document.id).await.unwrap();
    assert!(report.cleanup.is_empty());
}

#[tokio::test]
async fn delete_of_unknown_id_is_not_found() {
    let tv = open_vault(FakePdf::new()).await;
    let err = tv
        .vault
        .delete(edgequake_docvault::DocumentId::generate())
        .await
        .unwrap_err();
    assert!(matches!(err, DocVaultError::NotFound { .. }));
    assert!(err.is_client_error());
}

// ── Progress ─────────────────────────────────────────────────────────────

#[derive(Default)]
struct StageLog(Mutex<Vec<IngestStage>>);

impl IngestProgressCallback for StageLog {
    fn on_stage(&self, _label: &str, stage: IngestStage) {
        self.0.lock().unwrap().push(stage);
    }
}

#[tokio::test]
async fn progress_follows_the_state_machine() {
    let log = Arc::new(StageLog::default());
    let tv = open_vault_with(
        FakePdf::new(),
        VaultConfig::builder().progress_callback(log.clone()),
    )
    .await;

    tv.vault.create(meta(), pdf("a.pdf", 2)).await.unwrap();
    assert_eq!(
        *log.0.lock().unwrap(),
        vec![
            IngestStage::Received,
            IngestStage::Stored,
            IngestStage::Derived,
            IngestStage::Committed
        ]
    );

    log.0.lock().unwrap().clear();
    let _ = tv
        .vault
        .create(meta(), Some(Upload::new("b.pdf", truncated_pdf(1))))
        .await;
    assert_eq!(
        *log.0.lock().unwrap(),
        vec![IngestStage::Received, IngestStage::Stored, IngestStage::Rejected]
    );
}
