//! Configuration for a document vault.
//!
//! All behaviour is controlled through [`VaultConfig`], built via its
//! [`VaultConfigBuilder`]. Callers set only what they care about and rely on
//! the documented defaults for the rest.

use crate::document::DocumentStatus;
use crate::error::DocVaultError;
use crate::progress::IngestProgressCallback;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Default upload ceiling: 10 MiB.
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

/// Configuration for [`crate::DocVault`].
///
/// # Example
/// ```rust
/// use edgequake_docvault::VaultConfig;
///
/// let config = VaultConfig::builder()
///     .uploads_root("/var/lib/docvault/uploads")
///     .database_url("sqlite:///var/lib/docvault/docvault.db")
///     .max_upload_bytes(50 * 1024 * 1024)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct VaultConfig {
    /// Directory holding originals and the `split/` page tree. Default: `uploads`.
    pub uploads_root: PathBuf,

    /// sqlx SQLite URL of the record store. Default: `sqlite://docvault.db`.
    pub database_url: String,

    /// Largest accepted upload in bytes. Default: 10 MiB.
    ///
    /// Checked before anything is written, so oversized uploads leave no trace.
    pub max_upload_bytes: u64,

    /// Status given to documents created without one. Default: draft.
    pub default_status: DocumentStatus,

    /// Extensions (lowercase, no dot) that get preview pages. Default: `["pdf"]`.
    pub derivable_extensions: Vec<String>,

    /// pdfium shared library, or a directory containing it. Default: None
    /// (system library search path).
    pub pdfium_lib_path: Option<PathBuf>,

    /// `max-age` advertised on preview responses, in seconds. Default: 3600.
    pub preview_max_age_secs: u64,

    /// Receives ingestion stage events.
    pub progress_callback: Option<Arc<dyn IngestProgressCallback>>,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            uploads_root: PathBuf::from("uploads"),
            database_url: "sqlite://docvault.db".to_string(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            default_status: DocumentStatus::Draft,
            derivable_extensions: vec!["pdf".to_string()],
            pdfium_lib_path: None,
            preview_max_age_secs: 3600,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for VaultConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VaultConfig")
            .field("uploads_root", &self.uploads_root)
            .field("database_url", &self.database_url)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("default_status", &self.default_status)
            .field("derivable_extensions", &self.derivable_extensions)
            .field("pdfium_lib_path", &self.pdfium_lib_path)
            .field("preview_max_age_secs", &self.preview_max_age_secs)
            .field(
                "progress_callback",
                &self
                    .progress_callback
                    .as_ref()
                    .map(|_| "<dyn IngestProgressCallback>"),
            )
            .finish()
    }
}

impl VaultConfig {
    /// Create a new builder for `VaultConfig`.
    pub fn builder() -> VaultConfigBuilder {
        VaultConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`VaultConfig`].
#[derive(Debug)]
pub struct VaultConfigBuilder {
    config: VaultConfig,
}

impl VaultConfigBuilder {
    pub fn uploads_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.uploads_root = root.into();
        self
    }

    pub fn database_url(mut self, url: impl Into<String>) -> Self {
        self.config.database_url = url.into();
        self
    }

    pub fn max_upload_bytes(mut self, bytes: u64) -> Self {
        self.config.max_upload_bytes = bytes;
        self
    }

    pub fn default_status(mut self, status: DocumentStatus) -> Self {
        self.config.default_status = status;
        self
    }

    pub fn derivable_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.derivable_extensions = extensions
            .into_iter()
            .map(|e| e.into().trim_start_matches('.').to_ascii_lowercase())
            .collect();
        self
    }

    pub fn pdfium_lib_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_lib_path = Some(path.into());
        self
    }

    pub fn preview_max_age_secs(mut self, secs: u64) -> Self {
        self.config.preview_max_age_secs = secs;
        self
    }

    pub fn progress_callback(mut self, callback: Arc<dyn IngestProgressCallback>) -> Self {
        self.config.progress_callback = Some(callback);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<VaultConfig, DocVaultError> {
        let c = &self.config;
        if c.uploads_root.as_os_str().is_empty() {
            return Err(DocVaultError::InvalidConfig(
                "uploads root must not be empty".into(),
            ));
        }
        if c.max_upload_bytes == 0 {
            return Err(DocVaultError::InvalidConfig(
                "max upload size must be at least 1 byte".into(),
            ));
        }
        if c.database_url.trim().is_empty() {
            return Err(DocVaultError::InvalidConfig(
                "database url must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}
