//! [`PdfCapability`] backed by pdfium via `pdfium-render`.
//!
//! ## Binding
//!
//! pdfium is a native library loaded at runtime. When a library path is
//! configured it is used (a directory is searched for the platform's library
//! file name); otherwise the system library search path is tried. Each call
//! binds afresh, so the capability itself holds no native state and is
//! trivially `Send + Sync`.

use super::PdfCapability;
use crate::error::{DocVaultError, VaultResult};
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone, Default)]
pub struct PdfiumCapability {
    library_path: Option<PathBuf>,
}

impl PdfiumCapability {
    pub fn new(library_path: Option<PathBuf>) -> Self {
        Self { library_path }
    }

    /// Fail fast at startup if the library cannot be loaded.
    pub fn check_binding(&self) -> VaultResult<()> {
        self.bind().map(|_| ()).map_err(DocVaultError::PdfiumBindingFailed)
    }

    fn bind(&self) -> Result<Pdfium, String> {
        let bindings = match &self.library_path {
            Some(dir) if dir.is_dir() => {
                Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir))
            }
            Some(file) => Pdfium::bind_to_library(file),
            None => Pdfium::bind_to_system_library(),
        }
        .map_err(|e| e.to_string())?;
        Ok(Pdfium::new(bindings))
    }
}

impl PdfCapability for PdfiumCapability {
    fn name(&self) -> &'static str {
        "pdfium"
    }

    fn validate(&self, path: &Path) -> Result<(), String> {
        let pdfium = self.bind()?;
        let document = pdfium
            .load_pdf_from_file(path, None)
            .map_err(|e| format!("{e:?}"))?;

        let pages = document.pages();
        if pages.is_empty() {
            return Err("document has no pages".to_string());
        }
        for index in 0..pages.len() {
            pages
                .get(index)
                .map_err(|e| format!("page {} unreadable: {e:?}", index + 1))?;
        }
        debug!(path = %path.display(), pages = pages.len(), "PDF validated");
        Ok(())
    }

    fn split(&self, path: &Path, out_dir: &Path) -> Result<Vec<PathBuf>, String> {
        let pdfium = self.bind()?;
        let source = pdfium
            .load_pdf_from_file(path, None)
            .map_err(|e| format!("{e:?}"))?;

        let total = source.pages().len();
        let mut written = Vec::new();
        for index in 0..total {
            let mut single = pdfium.create_new_pdf().map_err(|e| format!("{e:?}"))?;
            single
                .pages_mut()
                .copy_page_from_document(&source, index, 0)
                .map_err(|e| format!("page {}: {e:?}", index + 1))?;

            let target = out_dir.join(format!("page-{}.pdf", index + 1));
            single
                .save_to_file(&target)
                .map_err(|e| format!("page {}: {e:?}", index + 1))?;
            written.push(target);
        }

        info!(path = %path.display(), pages = written.len(), "PDF split");
        Ok(written)
    }
}
