//! Path construction for the uploads tree.
//!
//! Every path the crate reads, writes or deletes is produced here. Preview
//! requests arrive as untrusted relative paths; [`StorageLayout::page_path`]
//! normalises them and refuses anything that would land outside the
//! document's own page directory.

use crate::document::DocumentId;
use crate::error::{DocVaultError, VaultResult};
use crate::storage::StorageKey;
use std::path::{Component, Path, PathBuf};

/// Name of the derived-page subtree under the uploads root.
pub const SPLIT_DIR: &str = "split";

/// Prefix of staging directories inside [`SPLIT_DIR`].
pub(crate) const STAGING_PREFIX: &str = ".staging-";

/// Prefix used when a published page set is moved aside for replacement.
pub(crate) const RETIRED_PREFIX: &str = ".retired-";

/// Prefix of originals still being written in the uploads root.
pub(crate) const INCOMING_PREFIX: &str = ".incoming.";

#[derive(Debug, Clone)]
pub struct StorageLayout {
    root: PathBuf,
}

impl StorageLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `uploads/<key>`
    pub fn original_path(&self, key: &StorageKey) -> PathBuf {
        self.root.join(key.as_str())
    }

    /// Hidden sibling an original is written to before its final rename.
    pub(crate) fn incoming_path(&self, key: &StorageKey) -> PathBuf {
        self.root.join(format!("{INCOMING_PREFIX}{key}"))
    }

    /// `uploads/split`
    pub fn split_root(&self) -> PathBuf {
        self.root.join(SPLIT_DIR)
    }

    /// `uploads/split/<id>`
    pub fn split_dir(&self, id: DocumentId) -> PathBuf {
        self.split_root().join(id.to_string())
    }

    /// Resolve an untrusted page request to `uploads/split/<id>/<page>`.
    ///
    /// The request is normalised lexically: `.` is dropped and `..` removes
    /// the previous component. A `..` with nothing left to remove, an absolute
    /// path, or a drive prefix is a [`DocVaultError::PathTraversal`].
    pub fn page_path(&self, id: DocumentId, requested: &str) -> VaultResult<PathBuf> {
        let traversal = || DocVaultError::PathTraversal {
            requested: requested.to_string(),
        };

        let mut parts: Vec<&std::ffi::OsStr> = Vec::new();
        for component in Path::new(requested).components() {
            match component {
                Component::Normal(part) => parts.push(part),
                Component::CurDir => {}
                Component::ParentDir => {
                    parts.pop().ok_or_else(traversal)?;
                }
                Component::RootDir | Component::Prefix(_) => return Err(traversal()),
            }
        }

        if parts.is_empty() {
            return Err(DocVaultError::Validation("page name is required".into()));
        }

        let mut path = self.split_dir(id);
        path.extend(parts);
        Ok(path)
    }

    /// Check that an existing `path` still resolves inside the page directory
    /// of `id` once symlinks are followed.
    pub async fn verify_confined(&self, id: DocumentId, path: &Path) -> VaultResult<PathBuf> {
        let read_err = |p: &Path, source: std::io::Error| DocVaultError::StorageRead {
            path: p.to_path_buf(),
            source,
        };
        let dir = self.split_dir(id);
        let dir = tokio::fs::canonicalize(&dir)
            .await
            .map_err(|e| read_err(&dir, e))?;
        let resolved = tokio::fs::canonicalize(path)
            .await
            .map_err(|e| read_err(path, e))?;

        if resolved.starts_with(&dir) && resolved != dir {
            Ok(resolved)
        } else {
            Err(DocVaultError::PathTraversal {
                requested: path.display().to_string(),
            })
        }
    }
}
