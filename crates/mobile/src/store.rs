//! Local persistent store: job read cache + durable outbox, in SQLite.
//!
//! `MobileStore` is the only component that touches the storage layer. It is
//! an explicit handle constructed once during app initialization and injected
//! into every consumer — there is no module-level database singleton. The
//! handle is cheap to clone and safe to share across tasks.
//!
//! The `jobs` cache and the `outbox` queue are independent: draining the
//! outbox never touches `jobs`, refreshing the cache never touches `outbox`.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use fieldserve_core::JobId;
use fieldserve_core::JobStatus;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use thiserror::Error;

use crate::types::{CachedJob, FailedMutation, OutboxEntry, OutboxMethod, SyncStatus};

/// Storage-layer error.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt row in {table}: {detail}")]
    Corrupt { table: &'static str, detail: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    fn corrupt(table: &'static str, detail: impl Into<String>) -> Self {
        Self::Corrupt {
            table,
            detail: detail.into(),
        }
    }
}

/// SQLite-backed store for the job cache, the outbox, and the failed-mutation
/// dead letters.
#[derive(Debug, Clone)]
pub struct MobileStore {
    pool: SqlitePool,
}

impl MobileStore {
    /// Open (creating if missing) the database at `path` and initialize the
    /// schema.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Open an in-memory database (tests, diagnostics).
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;

        // A single connection: every pooled connection would otherwise get
        // its own private in-memory database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Create the schema. Idempotent; safe to call redundantly.
    pub async fn init_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                id           TEXT PRIMARY KEY,
                scheduled_at TEXT NOT NULL,
                status       TEXT NOT NULL,
                description  TEXT NOT NULL,
                client_name  TEXT NOT NULL,
                address      TEXT NOT NULL,
                details      TEXT NOT NULL,
                sync_status  TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS outbox (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                url        TEXT NOT NULL,
                method     TEXT NOT NULL,
                body       TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS failed_mutations (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                url         TEXT NOT NULL,
                method      TEXT NOT NULL,
                body        TEXT NOT NULL,
                status_code INTEGER NULL,
                detail      TEXT NOT NULL,
                failed_at   TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ------------------------------------------------------------------
    // Job cache
    // ------------------------------------------------------------------

    /// Insert or overwrite a single cached job row.
    pub async fn upsert_job(&self, job: &CachedJob) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO jobs (id, scheduled_at, status, description, client_name, address, details, sync_status)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(id) DO UPDATE SET
                scheduled_at = excluded.scheduled_at,
                status       = excluded.status,
                description  = excluded.description,
                client_name  = excluded.client_name,
                address      = excluded.address,
                details      = excluded.details,
                sync_status  = excluded.sync_status
            "#,
        )
        .bind(job.id.to_string())
        .bind(job.scheduled_at.to_rfc3339())
        .bind(job.status.as_str())
        .bind(&job.description)
        .bind(&job.client_name)
        .bind(&job.address)
        .bind(job.details.to_string())
        .bind(job.sync_status.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Fetch a single cached job.
    pub async fn job(&self, id: JobId) -> Result<Option<CachedJob>, StoreError> {
        let row = sqlx::query("SELECT * FROM jobs WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| row_to_job(&r)).transpose()
    }

    /// All cached jobs, soonest first.
    pub async fn cached_jobs(&self) -> Result<Vec<CachedJob>, StoreError> {
        let rows = sqlx::query("SELECT * FROM jobs ORDER BY scheduled_at ASC, id ASC")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_job).collect()
    }

    /// Update a cached job's status and sync marker (no-op if not cached).
    pub async fn update_job_status(
        &self,
        id: JobId,
        status: JobStatus,
        sync_status: SyncStatus,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE jobs SET status = ?2, sync_status = ?3 WHERE id = ?1")
            .bind(id.to_string())
            .bind(status.as_str())
            .bind(sync_status.as_str())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Wholesale replacement of the server-confirmed cache rows.
    ///
    /// Deletes every `synced` row and inserts the fresh set inside a single
    /// transaction, so a crash mid-operation cannot leave the cache
    /// half-replaced. Rows marked `dirty` survive the sweep; a fresh row
    /// colliding with a surviving dirty row is skipped (the local edit wins
    /// until its queued mutation is confirmed).
    pub async fn replace_synced_jobs(&self, fresh: &[CachedJob]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM jobs WHERE sync_status = 'synced'")
            .execute(&mut *tx)
            .await?;

        for job in fresh {
            sqlx::query(
                r#"
                INSERT INTO jobs (id, scheduled_at, status, description, client_name, address, details, sync_status)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                ON CONFLICT(id) DO NOTHING
                "#,
            )
            .bind(job.id.to_string())
            .bind(job.scheduled_at.to_rfc3339())
            .bind(job.status.as_str())
            .bind(&job.description)
            .bind(&job.client_name)
            .bind(&job.address)
            .bind(job.details.to_string())
            .bind(SyncStatus::Synced.as_str())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Outbox
    // ------------------------------------------------------------------

    /// Append a mutation to the outbox. Returns the stored entry.
    pub async fn enqueue_mutation(
        &self,
        url: &str,
        method: OutboxMethod,
        body: &Value,
    ) -> Result<OutboxEntry, StoreError> {
        let created_at = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO outbox (url, method, body, created_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(url)
        .bind(method.as_str())
        .bind(body.to_string())
        .bind(created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(OutboxEntry {
            id: result.last_insert_rowid(),
            url: url.to_string(),
            method,
            body: body.clone(),
            created_at,
        })
    }

    /// All pending mutations, oldest first (FIFO; id breaks same-instant
    /// ties).
    pub async fn pending_mutations(&self) -> Result<Vec<OutboxEntry>, StoreError> {
        let rows = sqlx::query("SELECT * FROM outbox ORDER BY created_at ASC, id ASC")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_entry).collect()
    }

    /// Remove a delivered (or dead-lettered) entry.
    pub async fn delete_mutation(&self, id: i64) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM outbox WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Number of pending mutations (the UI badge).
    pub async fn pending_count(&self) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM outbox")
            .fetch_one(&self.pool)
            .await?;

        Ok(count as u64)
    }

    // ------------------------------------------------------------------
    // Failed mutations (dead letters)
    // ------------------------------------------------------------------

    /// Park a definitively rejected entry for inspection.
    pub async fn record_failed(
        &self,
        entry: &OutboxEntry,
        status_code: Option<u16>,
        detail: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO failed_mutations (url, method, body, status_code, detail, failed_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&entry.url)
        .bind(entry.method.as_str())
        .bind(entry.body.to_string())
        .bind(status_code.map(i64::from))
        .bind(detail)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// All parked mutations, oldest first.
    pub async fn failed_mutations(&self) -> Result<Vec<FailedMutation>, StoreError> {
        let rows = sqlx::query("SELECT * FROM failed_mutations ORDER BY failed_at ASC, id ASC")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_failed).collect()
    }

    /// Move a parked mutation back to the tail of the outbox (after the
    /// technician corrected whatever the server rejected).
    pub async fn retry_failed(&self, id: i64) -> Result<Option<OutboxEntry>, StoreError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT * FROM failed_mutations WHERE id = ?1")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let failed = row_to_failed(&row)?;

        let created_at = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO outbox (url, method, body, created_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(&failed.url)
        .bind(failed.method.as_str())
        .bind(failed.body.to_string())
        .bind(created_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM failed_mutations WHERE id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(Some(OutboxEntry {
            id: result.last_insert_rowid(),
            url: failed.url,
            method: failed.method,
            body: failed.body,
            created_at,
        }))
    }

    /// Drop a parked mutation for good.
    pub async fn discard_failed(&self, id: i64) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM failed_mutations WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

// ----------------------------------------------------------------------
// Row mapping
// ----------------------------------------------------------------------

fn parse_timestamp(table: &'static str, raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::corrupt(table, format!("invalid timestamp {raw:?}: {e}")))
}

fn row_to_job(row: &SqliteRow) -> Result<CachedJob, StoreError> {
    let id_str: String = row.try_get("id")?;
    let id = id_str
        .parse::<JobId>()
        .map_err(|e| StoreError::corrupt("jobs", e.to_string()))?;

    let scheduled_at = parse_timestamp("jobs", &row.try_get::<String, _>("scheduled_at")?)?;

    let status_str: String = row.try_get("status")?;
    let status = status_str
        .parse::<JobStatus>()
        .map_err(|e| StoreError::corrupt("jobs", e.to_string()))?;

    let details_str: String = row.try_get("details")?;
    let details: Value = serde_json::from_str(&details_str)
        .map_err(|e| StoreError::corrupt("jobs", format!("invalid details json: {e}")))?;

    let sync_status_str: String = row.try_get("sync_status")?;
    let sync_status = match sync_status_str.as_str() {
        "synced" => SyncStatus::Synced,
        "dirty" => SyncStatus::Dirty,
        other => {
            return Err(StoreError::corrupt(
                "jobs",
                format!("unknown sync status {other:?}"),
            ));
        }
    };

    Ok(CachedJob {
        id,
        scheduled_at,
        status,
        description: row.try_get("description")?,
        client_name: row.try_get("client_name")?,
        address: row.try_get("address")?,
        details,
        sync_status,
    })
}

fn row_to_entry(row: &SqliteRow) -> Result<OutboxEntry, StoreError> {
    let method_str: String = row.try_get("method")?;
    let method = method_str
        .parse::<OutboxMethod>()
        .map_err(|e| StoreError::corrupt("outbox", e.to_string()))?;

    let body_str: String = row.try_get("body")?;
    let body: Value = serde_json::from_str(&body_str)
        .map_err(|e| StoreError::corrupt("outbox", format!("invalid body json: {e}")))?;

    Ok(OutboxEntry {
        id: row.try_get("id")?,
        url: row.try_get("url")?,
        method,
        body,
        created_at: parse_timestamp("outbox", &row.try_get::<String, _>("created_at")?)?,
    })
}

fn row_to_failed(row: &SqliteRow) -> Result<FailedMutation, StoreError> {
    let method_str: String = row.try_get("method")?;
    let method = method_str
        .parse::<OutboxMethod>()
        .map_err(|e| StoreError::corrupt("failed_mutations", e.to_string()))?;

    let body_str: String = row.try_get("body")?;
    let body: Value = serde_json::from_str(&body_str)
        .map_err(|e| StoreError::corrupt("failed_mutations", format!("invalid body json: {e}")))?;

    let status_code: Option<i64> = row.try_get("status_code")?;

    Ok(FailedMutation {
        id: row.try_get("id")?,
        url: row.try_get("url")?,
        method,
        body,
        status_code: status_code.map(|c| c as u16),
        detail: row.try_get("detail")?,
        failed_at: parse_timestamp("failed_mutations", &row.try_get::<String, _>("failed_at")?)?,
    })
}
