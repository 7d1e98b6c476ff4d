//! Reads and sync-flag updates on the payments table.
//!
//! The table is owned by the payments subsystem; this service only consumes
//! rows and flips its own per-provider synced flags.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::models::Provider;

/// Payment record as consumed by the sync engine
#[derive(Debug, Clone, FromRow)]
pub struct PaymentRow {
    pub id: Uuid,
    pub tenant_id: String,
    pub amount_minor: i64,
    pub currency: String,
    pub status: String,
    pub payment_type: String,
    pub service_type: Option<String>,
    pub description: Option<String>,
    pub accounting_synced_qb: bool,
    pub accounting_synced_xero: bool,
    pub last_sync_attempt_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Column holding the synced flag for a provider
fn synced_flag_column(provider: Provider) -> &'static str {
    match provider {
        Provider::Quickbooks => "accounting_synced_qb",
        Provider::Xero => "accounting_synced_xero",
    }
}

/// Fetch up to `limit` payments eligible for sync to the given provider.
///
/// Oldest-first, so a run cut short shrinks the backlog from the front
/// rather than leaving gaps.
pub async fn find_unsynced(
    pool: &PgPool,
    tenant_id: &str,
    provider: Provider,
    limit: i64,
) -> Result<Vec<PaymentRow>, sqlx::Error> {
    let sql = format!(
        r#"
        SELECT id, tenant_id, amount_minor, currency, status, payment_type,
               service_type, description, accounting_synced_qb,
               accounting_synced_xero, last_sync_attempt_at, created_at
        FROM payments
        WHERE tenant_id = $1
          AND status IN ('succeeded', 'refunded')
          AND {} = FALSE
        ORDER BY created_at ASC
        LIMIT $2
        "#,
        synced_flag_column(provider)
    );

    sqlx::query_as::<_, PaymentRow>(&sql)
        .bind(tenant_id)
        .bind(limit)
        .fetch_all(pool)
        .await
}

/// Flip the provider synced flag within the posting transaction
pub async fn mark_synced_tx(
    tx: &mut Transaction<'_, Postgres>,
    payment_id: Uuid,
    provider: Provider,
) -> Result<(), sqlx::Error> {
    let sql = format!(
        "UPDATE payments SET {} = TRUE, last_sync_attempt_at = now() WHERE id = $1",
        synced_flag_column(provider)
    );

    sqlx::query(&sql).bind(payment_id).execute(&mut **tx).await?;
    Ok(())
}

/// Record that a sync was attempted for a payment that did not post
pub async fn touch_sync_attempt(pool: &PgPool, payment_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE payments SET last_sync_attempt_at = now() WHERE id = $1")
        .bind(payment_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Check a single payment's synced flag (used by tests and status tooling)
pub async fn is_synced(
    pool: &PgPool,
    payment_id: Uuid,
    provider: Provider,
) -> Result<bool, sqlx::Error> {
    let sql = format!(
        "SELECT {} FROM payments WHERE id = $1",
        synced_flag_column(provider)
    );

    sqlx::query_scalar::<_, bool>(&sql)
        .bind(payment_id)
        .fetch_one(pool)
        .await
}
