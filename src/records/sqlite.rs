//! SQLite-backed [`DocumentRecords`].

use super::DocumentRecords;
use crate::document::{Document, DocumentId, DocumentMetadata, DocumentStatus, DocumentSummary};
use crate::error::{DocVaultError, VaultResult};
use crate::storage::StorageKey;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{FromRow, Pool, Sqlite};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS documents (
    id          TEXT PRIMARY KEY NOT NULL,
    title       TEXT NOT NULL,
    author      TEXT NOT NULL,
    kind        TEXT NOT NULL,
    file_path   TEXT NOT NULL,
    status      TEXT NOT NULL DEFAULT 'draft',
    created_at  INTEGER NOT NULL
)
"#;

const CREATED_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_documents_created_at ON documents (created_at DESC)";

const SELECT_COLUMNS: &str = "id, title, author, kind, file_path, status, created_at";

/// Raw `documents` row.
#[derive(Debug, FromRow)]
struct DocumentRow {
    id: String,
    title: String,
    author: String,
    kind: String,
    file_path: String,
    status: String,
    /// Microseconds since the Unix epoch.
    created_at: i64,
}

impl TryFrom<DocumentRow> for Document {
    type Error = DocVaultError;

    fn try_from(row: DocumentRow) -> Result<Self, Self::Error> {
        let id = DocumentId::parse(&row.id)
            .map_err(|_| DocVaultError::Internal(format!("malformed id in record store: {:?}", row.id)))?;
        let status = DocumentStatus::from_str(&row.status)
            .map_err(|_| DocVaultError::Internal(format!("unknown status in record store: {:?}", row.status)))?;
        let created_at = DateTime::<Utc>::from_timestamp_micros(row.created_at).ok_or_else(|| {
            DocVaultError::Internal(format!("timestamp out of range: {}", row.created_at))
        })?;

        Ok(Document {
            id,
            title: row.title,
            author: row.author,
            kind: row.kind,
            status,
            file_path: StorageKey::parse(&row.file_path)?,
            created_at,
        })
    }
}

/// Document rows in a single SQLite database.
#[derive(Debug, Clone)]
pub struct SqliteRecords {
    pool: Pool<Sqlite>,
}

impl SqliteRecords {
    /// Open (creating if missing) the database at `url` and ensure the schema.
    ///
    /// Accepts any sqlx SQLite URL, e.g. `sqlite://docvault.db` or
    /// `sqlite::memory:`.
    pub async fn connect(url: &str) -> VaultResult<Self> {
        let opts = SqliteConnectOptions::from_str(url)
            .map_err(|e| DocVaultError::InvalidConfig(format!("database url '{url}': {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        // One connection serialises writers and keeps `sqlite::memory:` a
        // single database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await
            .map_err(|e| DocVaultError::persistence("connect", e))?;

        let records = Self { pool };
        records.migrate().await?;
        info!(url, "Record store ready");
        Ok(records)
    }

    async fn migrate(&self) -> VaultResult<()> {
        for statement in [SCHEMA, CREATED_INDEX] {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| DocVaultError::persistence("migrate", e))?;
        }
        Ok(())
    }

    /// Close the pool. Later calls fail with `Persistence`.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl DocumentRecords for SqliteRecords {
    async fn insert(&self, document: &Document) -> VaultResult<()> {
        sqlx::query(
            "INSERT INTO documents (id, title, author, kind, file_path, status, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(document.id.to_string())
        .bind(&document.title)
        .bind(&document.author)
        .bind(&document.kind)
        .bind(document.file_path.as_str())
        .bind(document.status.as_str())
        .bind(document.created_at.timestamp_micros())
        .execute(&self.pool)
        .await
        .map_err(|e| DocVaultError::persistence("insert", e))?;

        debug!(id = %document.id, "Inserted document row");
        Ok(())
    }

    async fn update_metadata_and_path(
        &self,
        id: DocumentId,
        metadata: &DocumentMetadata,
        file_path: Option<&StorageKey>,
    ) -> VaultResult<()> {
        let result = sqlx::query(
            "UPDATE documents SET title = ?, author = ?, kind = ?, status = ?, \
             file_path = COALESCE(?, file_path) WHERE id = ?",
        )
        .bind(&metadata.title)
        .bind(&metadata.author)
        .bind(&metadata.kind)
        .bind(metadata.status.as_str())
        .bind(file_path.map(StorageKey::as_str))
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| DocVaultError::persistence("update", e))?;

        if result.rows_affected() == 0 {
            return Err(DocVaultError::NotFound { id: id.to_string() });
        }
        Ok(())
    }

    async fn get(&self, id: DocumentId) -> VaultResult<Document> {
        let row = sqlx::query_as::<_, DocumentRow>(&format!(
            "SELECT {SELECT_COLUMNS} FROM documents WHERE id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DocVaultError::persistence("get", e))?;

        match row {
            Some(row) => Document::try_from(row),
            None => Err(DocVaultError::NotFound { id: id.to_string() }),
        }
    }

    async fn get_path_by_id(&self, id: DocumentId) -> VaultResult<StorageKey> {
        let path: Option<String> = sqlx::query_scalar("SELECT file_path FROM documents WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DocVaultError::persistence("get_path", e))?;

        match path {
            Some(p) => StorageKey::parse(&p),
            None => Err(DocVaultError::NotFound { id: id.to_string() }),
        }
    }

    async fn delete(&self, id: DocumentId) -> VaultResult<()> {
        let result = sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| DocVaultError::persistence("delete", e))?;

        if result.rows_affected() == 0 {
            return Err(DocVaultError::NotFound { id: id.to_string() });
        }
        Ok(())
    }

    async fn list(&self) -> VaultResult<Vec<DocumentSummary>> {
        let rows = sqlx::query_as::<_, DocumentRow>(&format!(
            "SELECT {SELECT_COLUMNS} FROM documents ORDER BY created_at DESC, rowid DESC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DocVaultError::persistence("list", e))?;

        rows.into_iter()
            .map(|row| Document::try_from(row).map(DocumentSummary::from))
            .collect()
    }

    async fn health_check(&self) -> VaultResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| DocVaultError::persistence("health_check", e))?;
        Ok(())
    }
}
