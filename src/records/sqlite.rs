use std::str::FromStr;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use uuid::Uuid;

use super::{UploadRecord, UploadRecordStore};

/// The configuration for the SQLite record backend.
///
/// The `connection_uri` should be formatted as a direct connect
/// uri. e.g.
/// `sqlite://stowage.db?mode=rwc`
///
/// The `pool_size` determined the *maximum* amount of pool connections.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub connection_uri: String,

    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
}

const fn default_pool_size() -> u32 {
    10
}

fn from_row(row: SqliteRow) -> Result<UploadRecord> {
    let id: String = row.try_get("id")?;
    let owner_id: String = row.try_get("owner_id")?;
    let deleted_at: Option<DateTime<Utc>> = row.try_get("deleted_at")?;

    Ok(UploadRecord {
        id: Uuid::from_str(&id)?,
        owner_id: Uuid::from_str(&owner_id)?,
        file_path: row.try_get("file_path")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        deleted_at,
    })
}

/// A record backend set to handle a SQLite database.
pub struct SqliteRecordStore {
    pool: SqlitePool,
}

impl SqliteRecordStore {
    /// Connect to the given SQLite database.
    ///
    /// This will build a connection pool and connect with a maximum
    /// of n connections determined by the `pool_size` of the given
    /// config.
    pub async fn connect(cfg: &DatabaseConfig) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(cfg.pool_size)
            .connect(&cfg.connection_uri)
            .await?;

        Ok(Self { pool })
    }

    pub async fn ensure_tables(&self) -> Result<()> {
        info!("building tables");

        sqlx::query(
            r#"
        CREATE TABLE IF NOT EXISTS uploads (
            id CHAR(36) PRIMARY KEY,
            file_path TEXT NOT NULL,
            owner_id CHAR(36) NOT NULL,
            created_at TIMESTAMP NOT NULL,
            updated_at TIMESTAMP NOT NULL,
            deleted_at TIMESTAMP NULL
        )"#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_uploads_owner ON uploads (owner_id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[async_trait]
impl UploadRecordStore for SqliteRecordStore {
    async fn create(&self, record: UploadRecord) -> Result<()> {
        sqlx::query(
            r#"
        INSERT INTO uploads (
            id,
            file_path,
            owner_id,
            created_at,
            updated_at,
            deleted_at
        ) VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(record.id.to_string())
        .bind(&record.file_path)
        .bind(record.owner_id.to_string())
        .bind(record.created_at)
        .bind(record.updated_at)
        .bind(record.deleted_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UploadRecord>> {
        let row = sqlx::query("SELECT * FROM uploads WHERE id = ? AND deleted_at IS NULL LIMIT 1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(from_row).transpose()
    }

    async fn find_by_owner(&self, owner_id: Uuid) -> Result<Vec<UploadRecord>> {
        let rows = sqlx::query(
            "SELECT * FROM uploads WHERE owner_id = ? AND deleted_at IS NULL ORDER BY rowid",
        )
        .bind(owner_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(from_row).collect()
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        let now = Utc::now();
        let done = sqlx::query(
            "UPDATE uploads SET deleted_at = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(now)
        .bind(now)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if done.rows_affected() == 0 {
            bail!("upload {} not found", id);
        }

        Ok(())
    }
}
