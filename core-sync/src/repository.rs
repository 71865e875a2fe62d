//! # Sync Job Repository
//!
//! Persists the history of reconciliation passes.
//!
//! ## Overview
//!
//! One row per pass, written when the pass starts and rewritten when it
//! reaches a terminal phase:
//! - Creating and updating jobs
//! - Paged history, most recent first
//! - Latest pass of a `(vendor, kind, account, region)` scope

use crate::{Result, SyncError, SyncJob, SyncJobId, SyncPhase, SyncStats};
use async_trait::async_trait;
use bridge_traits::resource::{ResourceKind, SyncScope, Vendor};
use core_inventory::repositories::{Page, PageRequest};
use sqlx::{FromRow, SqlitePool};

const SELECT_JOB: &str = r#"
    SELECT id, vendor, kind, account_id, region, phase,
           fetched, created, updated, deleted, unchanged,
           error_message, started_at, completed_at, created_at
    FROM sync_jobs
"#;

// ============================================================================
// Repository Trait
// ============================================================================

#[async_trait]
pub trait SyncJobRepository: Send + Sync {
    async fn insert(&self, job: &SyncJob) -> Result<()>;

    /// Rewrite phase, stats and timestamps of an existing job
    ///
    /// # Errors
    ///
    /// Returns `Database` if the job does not exist
    async fn update(&self, job: &SyncJob) -> Result<()>;

    async fn find_by_id(&self, id: &SyncJobId) -> Result<Option<SyncJob>>;

    /// Job history across all scopes, most recent first
    async fn list_recent(&self, page: PageRequest) -> Result<Page<SyncJob>>;

    /// Most recent pass of `kind` over `scope`
    async fn latest_for_scope(&self, kind: ResourceKind, scope: &SyncScope)
        -> Result<Option<SyncJob>>;
}

// ============================================================================
// SQLite Implementation
// ============================================================================

/// SQLite implementation of SyncJobRepository
pub struct SqliteSyncJobRepository {
    pool: SqlitePool,
}

impl SqliteSyncJobRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct SyncJobRow {
    id: String,
    vendor: String,
    kind: String,
    account_id: String,
    region: String,
    phase: String,
    fetched: i64,
    created: i64,
    updated: i64,
    deleted: i64,
    unchanged: i64,
    error_message: Option<String>,
    started_at: Option<i64>,
    completed_at: Option<i64>,
    created_at: i64,
}

impl TryFrom<SyncJobRow> for SyncJob {
    type Error = SyncError;

    fn try_from(row: SyncJobRow) -> Result<Self> {
        let vendor: Vendor = row.vendor.parse().map_err(SyncError::Database)?;
        let kind: ResourceKind = row.kind.parse().map_err(SyncError::Database)?;
        let phase: SyncPhase = row.phase.parse()?;

        Ok(SyncJob {
            id: SyncJobId::from_string(&row.id)?,
            vendor,
            kind,
            account_id: row.account_id,
            region: row.region,
            phase,
            stats: SyncStats {
                fetched: row.fetched.max(0) as u64,
                created: row.created.max(0) as u64,
                updated: row.updated.max(0) as u64,
                deleted: row.deleted.max(0) as u64,
                unchanged: row.unchanged.max(0) as u64,
            },
            error_message: row.error_message,
            created_at: row.created_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
        })
    }
}

fn db_err(e: sqlx::Error) -> SyncError {
    SyncError::Database(e.to_string())
}

#[async_trait]
impl SyncJobRepository for SqliteSyncJobRepository {
    async fn insert(&self, job: &SyncJob) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_jobs (
                id, vendor, kind, account_id, region, phase,
                fetched, created, updated, deleted, unchanged,
                error_message, started_at, completed_at, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(job.id.as_str())
        .bind(job.vendor.as_str())
        .bind(job.kind.as_str())
        .bind(&job.account_id)
        .bind(&job.region)
        .bind(job.phase.as_str())
        .bind(job.stats.fetched as i64)
        .bind(job.stats.created as i64)
        .bind(job.stats.updated as i64)
        .bind(job.stats.deleted as i64)
        .bind(job.stats.unchanged as i64)
        .bind(&job.error_message)
        .bind(job.started_at)
        .bind(job.completed_at)
        .bind(job.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn update(&self, job: &SyncJob) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE sync_jobs SET
                phase = ?,
                fetched = ?,
                created = ?,
                updated = ?,
                deleted = ?,
                unchanged = ?,
                error_message = ?,
                started_at = ?,
                completed_at = ?
            WHERE id = ?
            "#,
        )
        .bind(job.phase.as_str())
        .bind(job.stats.fetched as i64)
        .bind(job.stats.created as i64)
        .bind(job.stats.updated as i64)
        .bind(job.stats.deleted as i64)
        .bind(job.stats.unchanged as i64)
        .bind(&job.error_message)
        .bind(job.started_at)
        .bind(job.completed_at)
        .bind(job.id.as_str())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(SyncError::Database(format!("Sync job {} not found", job.id)));
        }

        Ok(())
    }

    async fn find_by_id(&self, id: &SyncJobId) -> Result<Option<SyncJob>> {
        let row = sqlx::query_as::<_, SyncJobRow>(&format!("{} WHERE id = ?", SELECT_JOB))
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        row.map(SyncJob::try_from).transpose()
    }

    async fn list_recent(&self, page: PageRequest) -> Result<Page<SyncJob>> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sync_jobs")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;

        let rows = sqlx::query_as::<_, SyncJobRow>(&format!(
            "{} ORDER BY created_at DESC, rowid DESC LIMIT ? OFFSET ?",
            SELECT_JOB
        ))
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let items = rows
            .into_iter()
            .map(SyncJob::try_from)
            .collect::<Result<Vec<_>>>()?;

        Ok(Page::new(items, total.max(0) as u64, page))
    }

    async fn latest_for_scope(
        &self,
        kind: ResourceKind,
        scope: &SyncScope,
    ) -> Result<Option<SyncJob>> {
        let row = sqlx::query_as::<_, SyncJobRow>(&format!(
            "{} WHERE vendor = ? AND kind = ? AND account_id = ? AND region = ? \
             ORDER BY created_at DESC, rowid DESC LIMIT 1",
            SELECT_JOB
        ))
        .bind(scope.vendor.as_str())
        .bind(kind.as_str())
        .bind(&scope.account_id)
        .bind(&scope.region)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(SyncJob::try_from).transpose()
    }
}

// ============================================================================
// Tests
// ============================================================================
