//! Durable storage for originals and derived pages.
//!
//! ## On-disk layout
//!
//! ```text
//! uploads/
//!  ├─ <uuid>.<ext>              originals, one per document
//!  └─ split/
//!      ├─ <document-id>/        published page set
//!      │   ├─ page-0001.pdf
//!      │   └─ page-0002.pdf
//!      └─ .staging-XXXXXX/      pages being derived (never served)
//! ```
//!
//! [`layout::StorageLayout`] is the only code that turns keys, ids and page
//! names into paths. [`fs::FileStore`] performs the I/O.

pub mod fs;
pub mod layout;

pub use fs::{FileStore, Removal};
pub use layout::{StorageLayout, SPLIT_DIR};

use crate::error::DocVaultError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A storage key is one path component: an identifier plus optional extension.
static KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_-]*(\.[A-Za-z0-9]{1,16})?$").unwrap());

static EXTENSION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z0-9]{1,16}$").unwrap());

/// Name under which an original is addressable in the uploads root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StorageKey(String);

impl StorageKey {
    /// Generate a fresh key: a random UUID plus the (sanitised) extension.
    ///
    /// Extensions that are not short lowercase alphanumerics are dropped
    /// rather than trusted.
    pub fn generate(extension: Option<&str>) -> Self {
        let id = Uuid::new_v4();
        match extension.map(|e| e.to_ascii_lowercase()) {
            Some(ext) if EXTENSION_RE.is_match(&ext) => Self(format!("{id}.{ext}")),
            _ => Self(id.to_string()),
        }
    }

    /// Validate a key read back from the record store.
    pub fn parse(raw: &str) -> Result<Self, DocVaultError> {
        if KEY_RE.is_match(raw) {
            Ok(Self(raw.to_string()))
        } else {
            Err(DocVaultError::Internal(format!(
                "malformed storage key in record store: {raw:?}"
            )))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lowercased extension, if the key carries one.
    pub fn extension(&self) -> Option<&str> {
        self.0.rsplit_once('.').map(|(_, ext)| ext)
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for StorageKey {
    type Error = DocVaultError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<StorageKey> for String {
    fn from(key: StorageKey) -> Self {
        key.0
    }
}
