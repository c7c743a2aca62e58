//! Provenance map: which URL a spooled blob was fetched from.
//!
//! Each successful ingestion that carries a source URL header appends one
//! `(url, sha1, ts)` row. Rows are never unique on the digest: the same
//! content may well be fetched from several locations.
//!
//! # Schema
//!
//! ```sql
//! CREATE TABLE urlmap (url TEXT NOT NULL, sha1 TEXT NOT NULL, ts INTEGER NOT NULL);
//! CREATE INDEX idx_urlmap_url  ON urlmap(url);
//! CREATE INDEX idx_urlmap_sha1 ON urlmap(sha1);
//! ```
//!
//! # Concurrency
//!
//! All writes go through a single async mutex, so concurrent requests never
//! race on the SQLite write lock. Reads use the pool directly and rely on
//! WAL isolation.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use std::path::Path;
use tokio::sync::Mutex;

use crate::db;

/// Destination for provenance records.
///
/// The spool service only needs to append; lookups are specific to the
/// concrete store.
#[async_trait]
pub trait ProvenanceSink: Send + Sync {
    /// Append a `(url, digest, ts)` association.
    async fn record(&self, url: &str, digest: &str, ts: DateTime<Utc>) -> Result<()>;
}

/// One row of the provenance map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProvenanceRecord {
    pub url: String,
    pub sha1: String,
    /// Unix timestamp in seconds.
    pub ts: i64,
}

/// SQLite-backed provenance map.
pub struct UrlMap {
    pool: SqlitePool,
    write_lock: Mutex<()>,
}

impl UrlMap {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            write_lock: Mutex::new(()),
        }
    }

    /// Open (or create) the database at `path` and ensure the schema exists.
    pub async fn open(path: &Path) -> Result<Self> {
        let pool = db::connect(path).await?;
        let map = Self::new(pool);
        map.ensure_schema().await?;
        Ok(map)
    }

    /// Create the table and indexes if they are missing. Safe to call on
    /// every startup.
    pub async fn ensure_schema(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS urlmap (
                url TEXT NOT NULL,
                sha1 TEXT NOT NULL,
                ts INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_urlmap_url ON urlmap(url)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_urlmap_sha1 ON urlmap(sha1)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// All rows recorded for `url`, oldest first.
    pub async fn by_url(&self, url: &str) -> Result<Vec<ProvenanceRecord>> {
        let rows: Vec<(String, String, i64)> =
            sqlx::query_as("SELECT url, sha1, ts FROM urlmap WHERE url = ? ORDER BY ts, rowid")
                .bind(url)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(into_record).collect())
    }

    /// All rows recorded for the SHA-1 `digest`, oldest first.
    pub async fn by_digest(&self, digest: &str) -> Result<Vec<ProvenanceRecord>> {
        let rows: Vec<(String, String, i64)> =
            sqlx::query_as("SELECT url, sha1, ts FROM urlmap WHERE sha1 = ? ORDER BY ts, rowid")
                .bind(digest)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(into_record).collect())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn into_record((url, sha1, ts): (String, String, i64)) -> ProvenanceRecord {
    ProvenanceRecord { url, sha1, ts }
}

#[async_trait]
impl ProvenanceSink for UrlMap {
    async fn record(&self, url: &str, digest: &str, ts: DateTime<Utc>) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        sqlx::query("INSERT INTO urlmap (url, sha1, ts) VALUES (?, ?, ?)")
            .bind(url)
            .bind(digest)
            .bind(ts.timestamp())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
