//! Read-only access to originals and derived pages.
//!
//! The gateway never writes. It resolves every path through
//! [`StorageLayout`], so a preview request can only ever reach a file inside
//! `split/<id>/`.

use crate::document::{Document, DocumentId, DocumentSummary};
use crate::error::{DocVaultError, VaultResult};
use crate::records::DocumentRecords;
use crate::storage::StorageLayout;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{self, File};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_stream::wrappers::ReadDirStream;
use tokio_stream::StreamExt;
use tracing::{debug, error, instrument};

/// An open file plus the response headers it should be served with.
#[derive(Debug)]
pub struct ServedFile {
    pub path: PathBuf,
    pub len: u64,
    pub headers: Vec<(&'static str, String)>,
    file: File,
}

impl ServedFile {
    /// First header named `name`, case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Stream the whole file into `writer`.
    pub async fn copy_to<W>(mut self, writer: &mut W) -> VaultResult<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let read_err = |source: io::Error| DocVaultError::StorageRead {
            path: self.path.clone(),
            source,
        };
        let copied = tokio::io::copy(&mut self.file, writer)
            .await
            .map_err(read_err)?;
        writer.flush().await.map_err(read_err)?;
        Ok(copied)
    }

    pub fn into_file(self) -> File {
        self.file
    }
}

/// Content type for an original, by extension.
pub fn content_type_for(extension: Option<&str>) -> &'static str {
    match extension.map(|e| e.to_ascii_lowercase()).as_deref() {
        Some("pdf") => "application/pdf",
        Some("txt") => "text/plain; charset=utf-8",
        Some("md") => "text/markdown; charset=utf-8",
        Some("doc") => "application/msword",
        Some("docx") => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        _ => "application/octet-stream",
    }
}

#[derive(Clone)]
pub struct Gateway {
    records: Arc<dyn DocumentRecords>,
    layout: StorageLayout,
    preview_max_age_secs: u64,
}

impl Gateway {
    pub fn new(
        records: Arc<dyn DocumentRecords>,
        layout: StorageLayout,
        preview_max_age_secs: u64,
    ) -> Self {
        Self {
            records,
            layout,
            preview_max_age_secs,
        }
    }

    pub async fn get(&self, id: DocumentId) -> VaultResult<Document> {
        self.records.get(id).await
    }

    pub async fn list(&self) -> VaultResult<Vec<DocumentSummary>> {
        self.records.list().await
    }

    /// Open the current original for download.
    ///
    /// Always served as an attachment; originals are never rendered inline.
    #[instrument(skip(self), fields(id = %id))]
    pub async fn download(&self, id: DocumentId) -> VaultResult<ServedFile> {
        let key = self.records.get_path_by_id(id).await?;
        let path = self.layout.original_path(&key);
        let (file, len) = match open_with_meta(&path).await {
            Ok((file, meta)) => (file, meta.len()),
            Err(source) => {
                // The row says the file exists; this is a storage defect.
                error!(path = %path.display(), error = %source, "Original missing for committed document");
                return Err(DocVaultError::StorageRead { path, source });
            }
        };

        let headers = vec![
            ("Content-Type", content_type_for(key.extension()).to_string()),
            (
                "Content-Disposition",
                format!("attachment; filename=\"{key}\""),
            ),
            ("Content-Length", len.to_string()),
        ];
        debug!(key = %key, len, "Serving original");
        Ok(ServedFile {
            path,
            len,
            headers,
            file,
        })
    }

    /// Page file names of a document, in page order.
    ///
    /// A document without pages (not split, or not splittable) yields an
    /// empty list; unknown ids do too.
    pub async fn list_pages(&self, id: DocumentId) -> VaultResult<Vec<String>> {
        let dir = self.layout.split_dir(id);
        let read_err = |source: io::Error| DocVaultError::StorageRead {
            path: dir.clone(),
            source,
        };

        let entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(read_err(e)),
        };

        let mut stream = ReadDirStream::new(entries);
        let mut pages = Vec::new();
        while let Some(entry) = stream.next().await {
            let entry = entry.map_err(read_err)?;
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if name.starts_with('.') || !name.to_ascii_lowercase().ends_with(".pdf") {
                continue;
            }
            if entry.file_type().await.map_err(read_err)?.is_file() {
                pages.push(name);
            }
        }
        pages.sort();
        Ok(pages)
    }

    /// Open one derived page for inline preview.
    ///
    /// `page` is untrusted. It is normalised and must stay inside the
    /// document's page directory even after following symlinks.
    #[instrument(skip(self), fields(id = %id))]
    pub async fn preview(&self, id: DocumentId, page: &str) -> VaultResult<ServedFile> {
        let requested = self.layout.page_path(id, page)?;
        let not_found = || DocVaultError::NotFound {
            id: format!("{id}/{page}"),
        };

        match fs::try_exists(&requested).await {
            Ok(true) => {}
            Ok(false) => return Err(not_found()),
            Err(source) => {
                return Err(DocVaultError::StorageRead {
                    path: requested,
                    source,
                })
            }
        }
        let path = self.layout.verify_confined(id, &requested).await?;
        let (file, meta) = open_with_meta(&path)
            .await
            .map_err(|source| DocVaultError::StorageRead {
                path: path.clone(),
                source,
            })?;
        if !meta.is_file() {
            return Err(not_found());
        }
        let len = meta.len();
        if len == 0 {
            error!(path = %path.display(), "Refusing to serve empty page");
            return Err(DocVaultError::EmptyArtifact { path });
        }

        let headers = vec![
            ("Content-Type", "application/pdf".to_string()),
            ("Content-Disposition", "inline".to_string()),
            (
                "Cache-Control",
                format!("public, max-age={}", self.preview_max_age_secs),
            ),
            ("X-Content-Type-Options", "nosniff".to_string()),
            ("Content-Length", len.to_string()),
        ];
        Ok(ServedFile {
            path,
            len,
            headers,
            file,
        })
    }
}

async fn open_with_meta(path: &Path) -> io::Result<(File, std::fs::Metadata)> {
    let file = File::open(path).await?;
    let meta = file.metadata().await?;
    Ok((file, meta))
}
