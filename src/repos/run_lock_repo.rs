//! Mutual exclusion for sync runs. One lock row per (tenant, provider),
//! held for the duration of a run.

use sqlx::PgPool;
use uuid::Uuid;

use crate::models::Provider;

/// Try to take the run lock. Returns false when another run holds it.
pub async fn try_acquire(
    pool: &PgPool,
    tenant_id: &str,
    provider: Provider,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO accounting_sync_run_locks (tenant_id, provider)
        VALUES ($1, $2)
        ON CONFLICT (tenant_id, provider) DO NOTHING
        "#,
    )
    .bind(tenant_id)
    .bind(provider)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Record which run holds the lock, once the log row exists
pub async fn attach_log(
    pool: &PgPool,
    tenant_id: &str,
    provider: Provider,
    sync_log_id: Uuid,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE accounting_sync_run_locks
        SET sync_log_id = $3
        WHERE tenant_id = $1 AND provider = $2
        "#,
    )
    .bind(tenant_id)
    .bind(provider)
    .bind(sync_log_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn release(
    pool: &PgPool,
    tenant_id: &str,
    provider: Provider,
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM accounting_sync_run_locks WHERE tenant_id = $1 AND provider = $2")
        .bind(tenant_id)
        .bind(provider)
        .execute(pool)
        .await?;
    Ok(())
}
