//! Local filesystem store for originals and page directories.

use crate::document::DocumentId;
use crate::error::{DocVaultError, VaultResult};
use crate::storage::layout::{INCOMING_PREFIX, RETIRED_PREFIX, STAGING_PREFIX};
use crate::storage::{StorageKey, StorageLayout};
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};

/// Outcome of a removal. Absence is not an error for cleanup callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    Removed,
    AlreadyAbsent,
}

/// Writes, removes and resolves files under a [`StorageLayout`].
#[derive(Debug, Clone)]
pub struct FileStore {
    layout: StorageLayout,
}

impl FileStore {
    /// Create the uploads root and its `split/` subtree.
    ///
    /// The root is canonicalised so every resolved path is absolute. Leftover
    /// `.incoming.*`, `.staging-*` and `.retired-*` entries from an interrupted
    /// process are removed, so one store must own the root exclusively.
    pub async fn new(layout: StorageLayout) -> VaultResult<Self> {
        let split = layout.split_root();
        fs::create_dir_all(&split)
            .await
            .map_err(|source| DocVaultError::StorageWrite {
                path: split.clone(),
                source,
            })?;
        let root = fs::canonicalize(layout.root())
            .await
            .map_err(|source| DocVaultError::StorageRead {
                path: layout.root().to_path_buf(),
                source,
            })?;
        let store = Self {
            layout: StorageLayout::new(root),
        };
        let swept = sweep(store.layout.root(), &[INCOMING_PREFIX]).await
            + sweep(&store.layout.split_root(), &[STAGING_PREFIX, RETIRED_PREFIX]).await;
        if swept > 0 {
            info!(root = %store.layout.root().display(), swept, "Removed leftovers of interrupted writes");
        }
        Ok(store)
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    /// Absolute path of an original. Pure; no I/O.
    pub fn resolve(&self, key: &StorageKey) -> PathBuf {
        self.layout.original_path(key)
    }

    /// Persist `bytes` under a freshly generated key.
    ///
    /// Bytes go to a hidden `.incoming.*` file which is synced and then
    /// renamed, so the key only becomes addressable once the write is complete.
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    pub async fn store(
        &self,
        bytes: &[u8],
        suggested_extension: Option<&str>,
    ) -> VaultResult<StorageKey> {
        let key = StorageKey::generate(suggested_extension);
        let incoming = self.layout.incoming_path(&key);
        let path = self.layout.original_path(&key);

        if let Err(source) = write_synced(&incoming, bytes).await {
            discard_incoming(&incoming).await;
            return Err(DocVaultError::StorageWrite { path, source });
        }

        if let Err(source) = fs::rename(&incoming, &path).await {
            discard_incoming(&incoming).await;
            return Err(DocVaultError::StorageWrite { path, source });
        }

        debug!(key = %key, "Stored original");
        Ok(key)
    }

    /// Delete the original stored under `key`.
    #[instrument(skip(self))]
    pub async fn remove(&self, key: &StorageKey) -> io::Result<Removal> {
        match fs::remove_file(self.resolve(key)).await {
            Ok(()) => Ok(Removal::Removed),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Removal::AlreadyAbsent),
            Err(e) => Err(e),
        }
    }

    /// Delete the whole page directory of a document.
    #[instrument(skip(self))]
    pub async fn remove_tree(&self, id: DocumentId) -> io::Result<Removal> {
        match fs::remove_dir_all(self.layout.split_dir(id)).await {
            Ok(()) => Ok(Removal::Removed),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Removal::AlreadyAbsent),
            Err(e) => Err(e),
        }
    }
}

/// Remove a partial upload; anything but absence is logged.
async fn discard_incoming(path: &Path) -> bool {
    match fs::remove_file(path).await {
        Ok(()) => true,
        Err(e) if e.kind() == io::ErrorKind::NotFound => true,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Could not remove partial upload");
            false
        }
    }
}

/// Remove entries of `dir` whose names start with one of `prefixes`.
/// Returns how many were removed.
async fn sweep(dir: &Path, prefixes: &[&str]) -> usize {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "Could not scan for leftovers");
            return 0;
        }
    };

    let mut swept = 0;
    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "Could not scan for leftovers");
                break;
            }
        };
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if !prefixes.iter().any(|p| name.starts_with(p)) {
            continue;
        }

        let path = entry.path();
        let removed = match entry.file_type().await {
            Ok(t) if t.is_dir() => fs::remove_dir_all(&path).await,
            Ok(_) => fs::remove_file(&path).await,
            Err(e) => Err(e),
        };
        match removed {
            Ok(()) => {
                debug!(path = %path.display(), "Removed leftover");
                swept += 1;
            }
            Err(e) => warn!(path = %path.display(), error = %e, "Could not remove leftover"),
        }
    }
    swept
}

async fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    Ok(())
}
