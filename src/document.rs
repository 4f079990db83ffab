//! Document data model: identifiers, metadata, status, and uploads.

use crate::error::{DocVaultError, VaultResult};
use crate::storage::StorageKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Opaque, immutable document identifier (a v4 UUID).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(Uuid);

impl DocumentId {
    /// Generate a fresh identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a client-supplied id.
    ///
    /// Anything that is not a UUID cannot name a document, so it is reported
    /// as [`DocVaultError::NotFound`], the same answer an unknown id gets.
    pub fn parse(input: &str) -> VaultResult<Self> {
        Uuid::parse_str(input.trim())
            .map(Self)
            .map_err(|_| DocVaultError::NotFound {
                id: input.to_string(),
            })
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Hyphenated lowercase; also the split directory name.
        write!(f, "{}", self.0.hyphenated())
    }
}

/// Lifecycle status of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    #[default]
    Draft,
    Published,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Draft => "draft",
            DocumentStatus::Published => "published",
        }
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentStatus {
    type Err = DocVaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "draft" => Ok(DocumentStatus::Draft),
            "published" => Ok(DocumentStatus::Published),
            other => Err(DocVaultError::Validation(format!(
                "unknown status '{other}' (expected draft or published)"
            ))),
        }
    }
}

/// Metadata as supplied by a client, before validation.
///
/// Every field is optional here so that "missing" and "empty" are rejected by
/// the same check in [`MetadataInput::validate`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetadataInput {
    pub title: Option<String>,
    pub author: Option<String>,
    /// Category / kind tag, e.g. "paper", "thesis".
    pub category: Option<String>,
    /// `draft` or `published`; the configured default applies when absent.
    pub status: Option<String>,
}

impl MetadataInput {
    pub fn new(
        title: impl Into<String>,
        author: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        Self {
            title: Some(title.into()),
            author: Some(author.into()),
            category: Some(category.into()),
            status: None,
        }
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    /// Check required fields and resolve the status.
    pub fn validate(&self, default_status: DocumentStatus) -> VaultResult<DocumentMetadata> {
        let required = |value: &Option<String>, field: &str| -> VaultResult<String> {
            match value.as_deref().map(str::trim) {
                Some(v) if !v.is_empty() => Ok(v.to_string()),
                _ => Err(DocVaultError::Validation(format!("{field} is required"))),
            }
        };

        let title = required(&self.title, "title")?;
        let author = required(&self.author, "author")?;
        let kind = required(&self.category, "category")?;
        let status = match self.status.as_deref().map(str::trim) {
            Some(s) if !s.is_empty() => s.parse()?,
            _ => default_status,
        };

        Ok(DocumentMetadata {
            title,
            author,
            kind,
            status,
        })
    }
}

/// Validated, mutable document attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: String,
    pub author: String,
    pub kind: String,
    pub status: DocumentStatus,
}

/// A stored document record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub title: String,
    pub author: String,
    pub kind: String,
    pub status: DocumentStatus,
    /// Storage key of the current original, relative to the uploads root.
    pub file_path: StorageKey,
    pub created_at: DateTime<Utc>,
}

impl Document {
    pub fn metadata(&self) -> DocumentMetadata {
        DocumentMetadata {
            title: self.title.clone(),
            author: self.author.clone(),
            kind: self.kind.clone(),
            status: self.status,
        }
    }

    pub(crate) fn apply(&mut self, metadata: DocumentMetadata) {
        self.title = metadata.title;
        self.author = metadata.author;
        self.kind = metadata.kind;
        self.status = metadata.status;
    }
}

/// Listing row: everything except the storage location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub id: DocumentId,
    pub title: String,
    pub author: String,
    pub kind: String,
    pub status: DocumentStatus,
    pub created_at: DateTime<Utc>,
}

impl From<Document> for DocumentSummary {
    fn from(d: Document) -> Self {
        Self {
            id: d.id,
            title: d.title,
            author: d.author,
            kind: d.kind,
            status: d.status,
            created_at: d.created_at,
        }
    }
}

/// An uploaded file: the client's filename (used only for its extension) and
/// the full byte content.
#[derive(Clone)]
pub struct Upload {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(filename: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            bytes: bytes.into(),
        }
    }

    /// Lowercased extension of the client filename, if any.
    pub fn extension(&self) -> Option<String> {
        std::path::Path::new(&self.filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .filter(|e| !e.is_empty())
    }
}

impl fmt::Debug for Upload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Upload")
            .field("filename", &self.filename)
            .field("bytes", &format_args!("<{} bytes>", self.bytes.len()))
            .finish()
    }
}
