//! SQLite persistence for the chunk registry.
//!
//! One table keyed by row index plus a small key/value table recording the
//! row count at save time. Snapshots are written to a fresh file and renamed
//! into place.

use std::path::Path;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};

use super::registry::ChunkRegistry;
use super::types::ChunkRecord;
use crate::core::errors::RagError;

async fn open_pool(db_path: &Path, create: bool) -> Result<SqlitePool, RagError> {
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(create)
        .journal_mode(SqliteJournalMode::Delete)
        .synchronous(SqliteSynchronous::Full)
        .foreign_keys(true);

    SqlitePoolOptions::new()
        .min_connections(1)
        .max_connections(1)
        .connect_with(options)
        .await
        .map_err(RagError::storage)
}

async fn init_schema(pool: &SqlitePool) -> Result<(), RagError> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS chunks (
            row_index INTEGER PRIMARY KEY,
            chunk_id TEXT NOT NULL UNIQUE,
            document_id TEXT NOT NULL,
            ordinal INTEGER NOT NULL,
            token_offset INTEGER NOT NULL,
            text TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await
    .map_err(RagError::storage)?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_document ON chunks(document_id, ordinal)")
        .execute(pool)
        .await
        .map_err(RagError::storage)?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS registry_meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
        )",
    )
    .execute(pool)
    .await
    .map_err(RagError::storage)?;

    Ok(())
}

/// Writes the whole registry to `db_path`, replacing any previous file.
pub async fn save_registry(registry: &ChunkRegistry, db_path: &Path) -> Result<(), RagError> {
    let tmp_path = db_path.with_extension("db.tmp");
    if tmp_path.exists() {
        std::fs::remove_file(&tmp_path)?;
    }

    let pool = open_pool(&tmp_path, true).await?;
    init_schema(&pool).await?;

    let mut tx = pool.begin().await.map_err(RagError::storage)?;

    for (row, record) in registry.iter() {
        sqlx::query(
            "INSERT INTO chunks (row_index, chunk_id, document_id, ordinal, token_offset, text)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(row as i64)
        .bind(&record.chunk_id)
        .bind(&record.document_id)
        .bind(record.ordinal as i64)
        .bind(record.token_offset as i64)
        .bind(&record.text)
        .execute(&mut *tx)
        .await
        .map_err(RagError::storage)?;
    }

    sqlx::query("INSERT OR REPLACE INTO registry_meta (key, value) VALUES ('row_count', ?1)")
        .bind(registry.count().to_string())
        .execute(&mut *tx)
        .await
        .map_err(RagError::storage)?;

    tx.commit().await.map_err(RagError::storage)?;
    pool.close().await;

    std::fs::rename(&tmp_path, db_path)?;
    Ok(())
}

/// Reads a registry saved by `save_registry`. Structural problems are `CorruptIndex`.
pub async fn load_registry(db_path: &Path) -> Result<ChunkRegistry, RagError> {
    if !db_path.exists() {
        return Err(RagError::CorruptIndex(format!(
            "chunk registry {} is missing",
            db_path.display()
        )));
    }

    let pool = open_pool(db_path, false).await?;

    let rows = sqlx::query(
        "SELECT row_index, chunk_id, document_id, ordinal, token_offset, text
         FROM chunks
         ORDER BY row_index ASC",
    )
    .fetch_all(&pool)
    .await
    .map_err(|err| RagError::CorruptIndex(format!("unreadable chunk registry: {err}")))?;

    let declared: Option<String> =
        sqlx::query_scalar("SELECT value FROM registry_meta WHERE key = 'row_count'")
            .fetch_optional(&pool)
            .await
            .map_err(|err| RagError::CorruptIndex(format!("unreadable registry meta: {err}")))?;

    pool.close().await;

    let mut registry = ChunkRegistry::new();
    for row in &rows {
        let row_index = non_negative(row.get::<i64, _>("row_index"), "row_index")?;
        let record = ChunkRecord {
            chunk_id: row.get("chunk_id"),
            document_id: row.get("document_id"),
            ordinal: non_negative(row.get::<i64, _>("ordinal"), "ordinal")?,
            token_offset: non_negative(row.get::<i64, _>("token_offset"), "token_offset")?,
            text: row.get("text"),
        };
        registry
            .put(row_index, record)
            .map_err(|err| RagError::CorruptIndex(err.to_string()))?;
    }

    if let Some(declared) = declared {
        let declared: usize = declared.parse().map_err(|_| {
            RagError::CorruptIndex(format!("registry row_count {declared:?} is not a number"))
        })?;
        if declared != registry.count() {
            return Err(RagError::CorruptIndex(format!(
                "registry declares {} rows but holds {}",
                declared,
                registry.count()
            )));
        }
    }

    if !registry.is_dense() {
        return Err(RagError::CorruptIndex(
            "registry row indices are not contiguous from 0".to_string(),
        ));
    }

    Ok(registry)
}

fn non_negative(value: i64, column: &str) -> Result<usize, RagError> {
    usize::try_from(value)
        .map_err(|_| RagError::CorruptIndex(format!("negative {column} {value} in registry")))
}
