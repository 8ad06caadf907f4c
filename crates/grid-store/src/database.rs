//! SQLite database for file records.

use std::path::Path;

use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow},
    Row,
};

use crate::error::{GridStoreError, Result};
use crate::record::{FileId, GridFileRecord};

/// SQLite database connection pool.
#[derive(Debug, Clone)]
pub(crate) struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database connection from a file path.
    pub async fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    /// Create an in-memory database.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(":memory:")
            .journal_mode(SqliteJournalMode::Wal);

        // A second connection would see a different in-memory database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    fn record_from_row(row: &SqliteRow) -> Result<GridFileRecord> {
        let id: String = row.get("id");
        let id = id
            .parse::<FileId>()
            .map_err(|e| GridStoreError::InvalidRecord(format!("bad id {}: {}", id, e)))?;

        let length: i64 = row.get("length");
        let chunk_size: i64 = row.get("chunk_size");
        if length < 0 || chunk_size <= 0 {
            return Err(GridStoreError::InvalidRecord(format!(
                "file {} has length {} and chunk size {}",
                id, length, chunk_size
            )));
        }

        Ok(GridFileRecord {
            id,
            filename: row.get("filename"),
            length: length as u64,
            chunk_size: chunk_size as u64,
            content_type: row.get("content_type"),
            upload_date: row.get("upload_date"),
        })
    }

    /// Insert a new file record.
    pub async fn insert_file(&self, record: &GridFileRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO files (id, filename, length, chunk_size, content_type, upload_date)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.id.to_string())
        .bind(&record.filename)
        .bind(record.length as i64)
        .bind(record.chunk_size as i64)
        .bind(&record.content_type)
        .bind(record.upload_date)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Get the newest record stored under a filename.
    pub async fn find_latest(&self, filename: &str) -> Result<Option<GridFileRecord>> {
        let row = sqlx::query(
            r#"
            SELECT id, filename, length, chunk_size, content_type, upload_date
            FROM files
            WHERE filename = ?
            ORDER BY upload_date DESC, rowid DESC
            LIMIT 1
            "#,
        )
        .bind(filename)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::record_from_row).transpose()
    }

    /// Set the length field of a single record.
    pub async fn set_length(&self, id: &FileId, length: u64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE files SET length = ? WHERE id = ?
            "#,
        )
        .bind(length as i64)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// List the newest record of every filename, ordered by filename.
    pub async fn list_latest(&self) -> Result<Vec<GridFileRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT f.id, f.filename, f.length, f.chunk_size, f.content_type, f.upload_date
            FROM files f
            WHERE f.rowid = (
                SELECT g.rowid FROM files g
                WHERE g.filename = f.filename
                ORDER BY g.upload_date DESC, g.rowid DESC
                LIMIT 1
            )
            ORDER BY f.filename
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::record_from_row).collect()
    }

    /// Ids of every version stored under a filename.
    pub async fn versions(&self, filename: &str) -> Result<Vec<FileId>> {
        let rows = sqlx::query(
            r#"
            SELECT id FROM files WHERE filename = ?
            "#,
        )
        .bind(filename)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| {
                let id: String = r.get("id");
                id.parse::<FileId>()
                    .map_err(|e| GridStoreError::InvalidRecord(format!("bad id {}: {}", id, e)))
            })
            .collect()
    }

    /// Delete a single record.
    pub async fn delete_file(&self, id: &FileId) -> Result<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM files WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
impl Database {
    /// Count records across all versions.
    pub async fn count_files(&self) -> Result<i64> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) as count FROM files
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("count"))
    }
}
