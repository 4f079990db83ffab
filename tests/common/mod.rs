//! Shared fixtures for the integration tests.
//!
//! [`FakePdf`] stands in for pdfium. Its "PDF" format is:
//!
//! ```text
//! %PDF-1.7
//! page
//! page
//! %%EOF
//! ```
//!
//! one `page` line per page. Anything without the header and trailer is
//! corrupt, which makes a truncated upload easy to produce.

#![allow(dead_code)]

use edgequake_docvault::{DocVault, PdfCapability, SqliteRecords, VaultConfig};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::sync::Once;
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

pub fn fake_pdf(pages: usize) -> Vec<u8> {
    let mut doc = b"%PDF-1.7\n".to_vec();
    for _ in 0..pages {
        doc.extend_from_slice(b"page\n");
    }
    doc.extend_from_slice(b"%%EOF\n");
    doc
}

/// A fake PDF cut off before its trailer.
pub fn truncated_pdf(pages: usize) -> Vec<u8> {
    let mut doc = fake_pdf(pages);
    doc.truncate(doc.len() - 8);
    doc
}

#[derive(Default)]
pub struct FakePdf {
    /// Fail the split after writing this many pages.
    pub fail_after: Option<usize>,
    /// Write this (1-indexed) page as a zero-byte file.
    pub empty_page: Option<usize>,
    pub splits: AtomicUsize,
}

impl FakePdf {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing_after(pages: usize) -> Arc<Self> {
        Arc::new(Self {
            fail_after: Some(pages),
            ..Self::default()
        })
    }

    pub fn with_empty_page(page: usize) -> Arc<Self> {
        Arc::new(Self {
            empty_page: Some(page),
            ..Self::default()
        })
    }

    pub fn split_count(&self) -> usize {
        self.splits.load(Ordering::SeqCst)
    }

    fn page_count(path: &Path) -> Result<usize, String> {
        let text = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
        if !text.starts_with("%PDF-") {
            return Err("missing %PDF header".into());
        }
        if !text.trim_end().ends_with("%%EOF") {
            return Err("missing %%EOF trailer".into());
        }
        let pages = text.lines().filter(|l| *l == "page").count();
        if pages == 0 {
            return Err("document has no pages".into());
        }
        Ok(pages)
    }
}

impl PdfCapability for FakePdf {
    fn name(&self) -> &'static str {
        "fake-pdf"
    }

    fn validate(&self, path: &Path) -> Result<(), String> {
        Self::page_count(path).map(|_| ())
    }

    fn split(&self, path: &Path, out_dir: &Path) -> Result<Vec<PathBuf>, String> {
        self.splits.fetch_add(1, Ordering::SeqCst);
        let total = Self::page_count(path)?;
        let mut written = Vec::with_capacity(total);
        for page in 1..=total {
            if self.fail_after == Some(page - 1) {
                return Err(format!("split crashed at page {page}"));
            }
            let target = out_dir.join(format!("out_{page}.pdf"));
            let body = if self.empty_page == Some(page) {
                Vec::new()
            } else {
                format!("%PDF-1.7\npage {page}/{total}\n%%EOF\n").into_bytes()
            };
            std::fs::write(&target, body).map_err(|e| e.to_string())?;
            written.push(target);
        }
        Ok(written)
    }
}

pub struct TestVault {
    pub vault: DocVault,
    pub records: Arc<SqliteRecords>,
    pub tmp: TempDir,
}

impl TestVault {
    pub fn uploads(&self) -> PathBuf {
        self.vault.layout().root().to_path_buf()
    }

    /// Files directly in the uploads root, excluding the `split/` tree.
    pub fn originals(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.uploads())
            .unwrap()
            .map(|e| e.unwrap())
            .filter(|e| e.file_type().unwrap().is_file())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    /// Entries under `split/`, hidden staging directories included.
    pub fn split_entries(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.vault.layout().split_root())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}

pub async fn open_vault(capability: Arc<FakePdf>) -> TestVault {
    open_vault_with(capability, VaultConfig::builder()).await
}

/// Route `tracing` output through the test harness. `RUST_LOG` overrides the
/// default `warn` filter.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

pub async fn open_vault_with(
    capability: Arc<FakePdf>,
    builder: edgequake_docvault::VaultConfigBuilder,
) -> TestVault {
    init_tracing();
    let tmp = tempfile::tempdir().unwrap();
    let config = builder
        .uploads_root(tmp.path().join("uploads"))
        .database_url("sqlite::memory:")
        .build()
        .unwrap();
    let records = Arc::new(SqliteRecords::connect(&config.database_url).await.unwrap());
    let vault = DocVault::with_parts(config, records.clone(), capability)
        .await
        .unwrap();
    TestVault {
        vault,
        records,
        tmp,
    }
}
