//! Durable record of sync runs, supporting status polling.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::models::{Provider, SyncRunStatus, SyncType};

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct SyncLogEntry {
    pub id: Uuid,
    pub tenant_id: String,
    pub provider: Provider,
    pub sync_type: SyncType,
    pub status: SyncRunStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i32>,
    pub payments_attempted: i32,
    pub payments_succeeded: i32,
    pub payments_failed: i32,
    pub error_message: Option<String>,
    pub error_details: Option<JsonValue>,
    pub range_start: Option<DateTime<Utc>>,
    pub range_end: Option<DateTime<Utc>>,
    pub triggered_by: Option<Uuid>,
}

const SELECT_COLUMNS: &str = r#"
    id, tenant_id, provider, sync_type, status, started_at, completed_at,
    duration_seconds, payments_attempted, payments_succeeded, payments_failed,
    error_message, error_details, range_start, range_end, triggered_by
"#;

/// Open a run in `in_progress`
pub async fn create(
    pool: &PgPool,
    tenant_id: &str,
    provider: Provider,
    sync_type: SyncType,
    triggered_by: Option<Uuid>,
) -> Result<Uuid, sqlx::Error> {
    sqlx::query_scalar::<_, Uuid>(
        r#"
        INSERT INTO accounting_sync_logs (tenant_id, provider, sync_type, triggered_by)
        VALUES ($1, $2, $3, $4)
        RETURNING id
        "#,
    )
    .bind(tenant_id)
    .bind(provider)
    .bind(sync_type)
    .bind(triggered_by)
    .fetch_one(pool)
    .await
}

/// Terminal values for a finished run
#[derive(Debug)]
pub struct RunTotals {
    pub status: SyncRunStatus,
    pub attempted: i32,
    pub succeeded: i32,
    pub failed: i32,
    pub error_message: Option<String>,
    pub error_details: Option<JsonValue>,
}

/// The single terminal update for a run.
///
/// Guarded on `status = 'in_progress'` so a duplicate finalize is a no-op
/// rather than a mutation of a terminal row.
pub async fn finalize(pool: &PgPool, id: Uuid, totals: RunTotals) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE accounting_sync_logs
        SET status = $2,
            payments_attempted = $3,
            payments_succeeded = $4,
            payments_failed = $5,
            error_message = $6,
            error_details = $7,
            completed_at = now(),
            duration_seconds = EXTRACT(EPOCH FROM (now() - started_at))::INTEGER
        WHERE id = $1 AND status = 'in_progress'
        "#,
    )
    .bind(id)
    .bind(totals.status)
    .bind(totals.attempted)
    .bind(totals.succeeded)
    .bind(totals.failed)
    .bind(totals.error_message)
    .bind(totals.error_details)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<SyncLogEntry>, sqlx::Error> {
    let sql = format!(
        "SELECT {} FROM accounting_sync_logs WHERE id = $1",
        SELECT_COLUMNS
    );

    sqlx::query_as::<_, SyncLogEntry>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
}
