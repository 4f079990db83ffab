//! Advisory per-document locks.
//!
//! Replace and delete on the same document id are serialised; operations on
//! different ids never contend. Entries are created on first use and removed
//! when the last holder or waiter lets go, so the table only ever holds ids
//! with an operation in flight.

use crate::document::DocumentId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type Table = HashMap<DocumentId, Arc<AsyncMutex<()>>>;

#[derive(Debug, Clone, Default)]
pub struct DocumentLocks {
    table: Arc<Mutex<Table>>,
}

impl DocumentLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `id`.
    pub async fn acquire(&self, id: DocumentId) -> DocumentGuard {
        let entry = {
            let mut table = lock_table(&self.table);
            Arc::clone(table.entry(id).or_default())
        };
        let guard = Arc::clone(&entry).lock_owned().await;
        DocumentGuard {
            id,
            table: Arc::clone(&self.table),
            entry,
            guard: Some(guard),
        }
    }

    /// Number of ids currently locked or awaited.
    pub fn len(&self) -> usize {
        lock_table(&self.table).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Held for the duration of a replace or delete.
#[derive(Debug)]
pub struct DocumentGuard {
    id: DocumentId,
    table: Arc<Mutex<Table>>,
    entry: Arc<AsyncMutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for DocumentGuard {
    fn drop(&mut self) {
        let mut table = lock_table(&self.table);
        // Release while the table is locked so no waiter can slip in between
        // the count check and the removal.
        self.guard.take();
        // Table entry plus ours: nobody else is holding or waiting.
        if Arc::strong_count(&self.entry) == 2 {
            table.remove(&self.id);
        }
    }
}

fn lock_table(table: &Mutex<Table>) -> MutexGuard<'_, Table> {
    table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
