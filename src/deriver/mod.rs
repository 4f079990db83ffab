//! Artifact derivation: validate an original and split it into page files.
//!
//! ## All-or-nothing page sets
//!
//! The underlying PDF library writes pages one file at a time and can fail
//! halfway. A half-written directory would look exactly like a short document,
//! so pages are never written where readers look. Instead:
//!
//! ```text
//! stage   ──▶  split/.staging-XXXX/page-0001.pdf …   (capability output, renamed)
//! publish ──▶  rename staging → split/<id>            (single rename)
//! ```
//!
//! A [`StagedPages`] that is dropped without being published is deleted with
//! its temp directory, so a failed derivation leaves nothing behind.

pub mod pdfium;

pub use self::pdfium::PdfiumCapability;

use crate::error::DerivationFailure;
use crate::storage::layout::{RETIRED_PREFIX, STAGING_PREFIX};
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

/// Narrow interface to an external PDF library.
///
/// Methods are blocking; [`ArtifactDeriver`] calls them from
/// `spawn_blocking`. Implementations may wrap a native library or shell out
/// to an external tool.
pub trait PdfCapability: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    /// Check that `path` is a well-formed document. Must not modify the file.
    fn validate(&self, path: &Path) -> Result<(), String>;

    /// Write one single-page file per page into `out_dir` and return their
    /// paths in page order. Not required to be atomic.
    fn split(&self, path: &Path, out_dir: &Path) -> Result<Vec<PathBuf>, String>;
}

/// Result of format validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    Valid,
    Corrupt(String),
}

/// A published, complete page set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageSet {
    pub dir: PathBuf,
    /// File names in page order.
    pub pages: Vec<String>,
}

/// Pages derived into a private staging directory, not yet visible.
#[derive(Debug)]
pub struct StagedPages {
    staging: TempDir,
    pages: Vec<String>,
}

impl StagedPages {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn pages(&self) -> &[String] {
        &self.pages
    }

    /// Make the staged pages the page set at `dest`, replacing any previous set.
    ///
    /// A previous set is first moved aside and is restored if the final
    /// rename fails, so `dest` always holds a complete set or nothing.
    pub async fn publish(self, dest: &Path) -> io::Result<PageSet> {
        let StagedPages { staging, pages } = self;
        let parent = dest
            .parent()
            .ok_or_else(|| io::Error::other("page directory has no parent"))?;

        let retired = if fs::try_exists(dest).await? {
            let aside = parent.join(format!("{RETIRED_PREFIX}{}", Uuid::new_v4()));
            fs::rename(dest, &aside).await?;
            Some(aside)
        } else {
            None
        };

        if let Err(e) = fs::rename(staging.path(), dest).await {
            if let Some(aside) = &retired {
                if let Err(restore) = fs::rename(aside, dest).await {
                    warn!(dir = %dest.display(), error = %restore, "Could not restore previous page set");
                }
            }
            return Err(e);
        }

        if let Some(aside) = retired {
            if let Err(e) = fs::remove_dir_all(&aside).await {
                warn!(dir = %aside.display(), error = %e, "Could not remove replaced page set");
            }
        }

        // `staging` now points at a path that no longer exists; dropping it is
        // a no-op.
        drop(staging);
        debug!(dir = %dest.display(), pages = pages.len(), "Published page set");
        Ok(PageSet {
            dir: dest.to_path_buf(),
            pages,
        })
    }
}

/// Wraps a [`PdfCapability`] with kind detection and atomic staging.
#[derive(Clone)]
pub struct ArtifactDeriver {
    capability: Arc<dyn PdfCapability>,
    derivable: Vec<String>,
}

impl std::fmt::Debug for ArtifactDeriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactDeriver")
            .field("capability", &self.capability.name())
            .field("derivable", &self.derivable)
            .finish()
    }
}

impl ArtifactDeriver {
    pub fn new(capability: Arc<dyn PdfCapability>, derivable_extensions: &[String]) -> Self {
        Self {
            capability,
            derivable: derivable_extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }

    /// Whether files with this extension get preview pages.
    ///
    /// Case-insensitive. Unknown or missing extensions are simply not
    /// derivable; they are never a reason to reject an upload.
    pub fn is_derivable(&self, extension: Option<&str>) -> bool {
        extension
            .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
            .is_some_and(|e| self.derivable.iter().any(|d| *d == e))
    }

    /// Run the capability's validator on a stored original.
    pub async fn validate(&self, path: &Path) -> Validation {
        let capability = Arc::clone(&self.capability);
        let path = path.to_path_buf();
        match tokio::task::spawn_blocking(move || capability.validate(&path)).await {
            Ok(Ok(())) => Validation::Valid,
            Ok(Err(reason)) => Validation::Corrupt(reason),
            Err(e) => Validation::Corrupt(format!("validator task panicked: {e}")),
        }
    }

    /// Split `source` into a staging directory under `split_root`.
    pub async fn stage(
        &self,
        source: &Path,
        split_root: &Path,
    ) -> Result<StagedPages, DerivationFailure> {
        let capability = Arc::clone(&self.capability);
        let source = source.to_path_buf();
        let split_root = split_root.to_path_buf();

        tokio::task::spawn_blocking(move || stage_blocking(capability.as_ref(), &source, &split_root))
            .await
            .map_err(|e| DerivationFailure::new(format!("split task panicked: {e}")))?
    }

    /// Split `source` and publish the pages at `output_dir` in one step.
    pub async fn derive(
        &self,
        source: &Path,
        output_dir: &Path,
    ) -> Result<PageSet, DerivationFailure> {
        let split_root = output_dir
            .parent()
            .ok_or_else(|| DerivationFailure::new("output directory has no parent"))?;
        let staged = self.stage(source, split_root).await?;
        staged
            .publish(output_dir)
            .await
            .map_err(|e| DerivationFailure::new(format!("could not publish pages: {e}")))
    }
}

/// Canonical page file name; zero-padded so name order is page order.
pub fn page_file_name(page_num: usize, total: usize) -> String {
    let width = total.to_string().len().max(4);
    format!("page-{page_num:0width$}.pdf")
}

fn stage_blocking(
    capability: &dyn PdfCapability,
    source: &Path,
    split_root: &Path,
) -> Result<StagedPages, DerivationFailure> {
    let io_failure = |what: &str, e: io::Error| DerivationFailure::new(format!("{what}: {e}"));

    std::fs::create_dir_all(split_root).map_err(|e| io_failure("create split root", e))?;
    let staging = tempfile::Builder::new()
        .prefix(STAGING_PREFIX)
        .tempdir_in(split_root)
        .map_err(|e| io_failure("create staging directory", e))?;

    let raw = staging.path().join("raw");
    std::fs::create_dir(&raw).map_err(|e| io_failure("create staging directory", e))?;

    let produced = capability.split(source, &raw).map_err(DerivationFailure::new)?;
    if produced.is_empty() {
        return Err(DerivationFailure::new("split produced no pages"));
    }

    let total = produced.len();
    let mut pages = Vec::with_capacity(total);
    for (idx, page) in produced.iter().enumerate() {
        let page_num = idx + 1;
        if !page.starts_with(&raw) {
            return Err(DerivationFailure::new(format!(
                "page {page_num} was written outside the staging directory"
            )));
        }
        let len = std::fs::metadata(page)
            .map_err(|e| io_failure(&format!("page {page_num} missing"), e))?
            .len();
        if len == 0 {
            return Err(DerivationFailure::new(format!("page {page_num} is empty")));
        }

        let name = page_file_name(page_num, total);
        std::fs::rename(page, staging.path().join(&name))
            .map_err(|e| io_failure(&format!("rename page {page_num}"), e))?;
        pages.push(name);
    }

    std::fs::remove_dir_all(&raw).map_err(|e| io_failure("clear staging leftovers", e))?;
    debug!(capability = capability.name(), pages = total, "Staged page set");
    Ok(StagedPages { staging, pages })
}
