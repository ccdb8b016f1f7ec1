//! SQLite cache store.
//!
//! A file-based backend for deployments that want the cache to survive
//! restarts. Each entry is one flat row: the fingerprint key, the extracted
//! document and the optional analysis as JSON, and RFC 3339 timestamps.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::traits::store::CacheStore;
use crate::types::cache::{CacheEntry, CachedAnalysis};
use crate::types::document::ExtractedDocument;
use crate::types::fingerprint::Fingerprint;

/// SQLite-based cache store.
pub struct SqliteStore {
    pool: SqlitePool,
}

fn storage_err(e: impl std::error::Error + Send + Sync + 'static) -> PipelineError {
    PipelineError::Storage(Box::new(e))
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| PipelineError::Storage(format!("invalid timestamp {:?}: {}", raw, e).into()))
}

impl SqliteStore {
    /// Create a new SQLite store with the given connection URL.
    ///
    /// # Example URLs
    /// - `sqlite::memory:` - In-memory database (ephemeral)
    /// - `sqlite://./analyst-cache.db?mode=rwc` - File, created if missing
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(storage_err)?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Create an in-memory SQLite store (for testing).
    pub async fn in_memory() -> Result<Self> {
        // A single connection, so every query sees the same memory database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(storage_err)?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS cache_entries (
                fingerprint TEXT PRIMARY KEY,
                document TEXT NOT NULL,
                analysis TEXT,
                created_at TEXT NOT NULL,
                expires_at TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_cache_entries_expires_at ON cache_entries(expires_at)",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS cache_aliases (
                locator TEXT PRIMARY KEY,
                content TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn delete_entry(&self, fingerprint: &Fingerprint) -> Result<()> {
        sqlx::query("DELETE FROM cache_entries WHERE fingerprint = ?")
            .bind(fingerprint.as_str())
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(())
    }
}

#[derive(Debug, FromRow)]
struct EntryRow {
    document: String,
    analysis: Option<String>,
    created_at: String,
    expires_at: Option<String>,
}

impl EntryRow {
    fn into_entry(self) -> Result<CacheEntry> {
        let document: ExtractedDocument = serde_json::from_str(&self.document)?;
        let analysis: Option<CachedAnalysis> = self
            .analysis
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;

        Ok(CacheEntry {
            document,
            analysis,
            created_at: parse_timestamp(&self.created_at)?,
            expires_at: self.expires_at.as_deref().map(parse_timestamp).transpose()?,
        })
    }
}

#[async_trait]
impl CacheStore for SqliteStore {
    async fn get(&self, fingerprint: &Fingerprint) -> Result<Option<CacheEntry>> {
        let row = sqlx::query_as::<_, EntryRow>(
            "SELECT document, analysis, created_at, expires_at FROM cache_entries WHERE fingerprint = ?",
        )
        .bind(fingerprint.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let entry = row.into_entry()?;
        if entry.is_expired() {
            self.delete_entry(fingerprint).await?;
            debug!(fingerprint = %fingerprint.short(), "Evicted expired cache entry");
            return Ok(None);
        }

        Ok(Some(entry))
    }

    async fn put(&self, entry: CacheEntry) -> Result<()> {
        let document = serde_json::to_string(&entry.document)?;
        let analysis = entry
            .analysis
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        sqlx::query(
            r#"
            INSERT INTO cache_entries (fingerprint, document, analysis, created_at, expires_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(fingerprint) DO UPDATE SET
                document = excluded.document,
                analysis = excluded.analysis,
                created_at = excluded.created_at,
                expires_at = excluded.expires_at
            "#,
        )
        .bind(entry.fingerprint().as_str())
        .bind(document)
        .bind(analysis)
        .bind(timestamp(entry.created_at))
        .bind(entry.expires_at.map(timestamp))
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(())
    }

    async fn invalidate(&self, fingerprint: &Fingerprint) -> Result<()> {
        self.delete_entry(fingerprint).await?;
        sqlx::query("DELETE FROM cache_aliases WHERE content = ?")
            .bind(fingerprint.as_str())
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    async fn resolve_alias(&self, locator: &Fingerprint) -> Result<Option<Fingerprint>> {
        let content: Option<String> =
            sqlx::query_scalar("SELECT content FROM cache_aliases WHERE locator = ?")
                .bind(locator.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(storage_err)?;

        Ok(content.as_deref().and_then(Fingerprint::from_hex))
    }

    async fn put_alias(&self, locator: &Fingerprint, content: &Fingerprint) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO cache_aliases (locator, content) VALUES (?, ?)
            ON CONFLICT(locator) DO UPDATE SET content = excluded.content
            "#,
        )
        .bind(locator.as_str())
        .bind(content.as_str())
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }

    async fn purge_expired(&self) -> Result<usize> {
        let result = sqlx::query(
            "DELETE FROM cache_entries WHERE expires_at IS NOT NULL AND expires_at <= ?",
        )
        .bind(timestamp(Utc::now()))
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        sqlx::query(
            "DELETE FROM cache_aliases WHERE content NOT IN (SELECT fingerprint FROM cache_entries)",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(result.rows_affected() as usize)
    }
}
