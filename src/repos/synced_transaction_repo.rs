//! The idempotency ledger: one row per (payment, provider) successfully
//! posted. A row here is definitive proof the payment reached the external
//! ledger, independent of the payment table's synced flag.

use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::models::Provider;

#[derive(Debug, Clone, FromRow)]
pub struct SyncedTransaction {
    pub id: Uuid,
    pub tenant_id: String,
    pub provider: Provider,
    pub payment_id: Uuid,
    pub external_transaction_id: String,
    pub external_transaction_number: Option<String>,
    pub sync_log_id: Option<Uuid>,
    pub synced_amount_minor: i64,
}

#[derive(Debug)]
pub struct NewSyncedTransaction<'a> {
    pub tenant_id: &'a str,
    pub provider: Provider,
    pub payment_id: Uuid,
    pub external_transaction_id: &'a str,
    pub external_transaction_number: Option<&'a str>,
    pub sync_log_id: Uuid,
    pub synced_amount_minor: i64,
}

/// Insert a ledger row within the posting transaction.
///
/// The (payment_id, provider) unique constraint rejects a double post.
pub async fn insert_tx(
    tx: &mut Transaction<'_, Postgres>,
    row: NewSyncedTransaction<'_>,
) -> Result<Uuid, sqlx::Error> {
    sqlx::query_scalar::<_, Uuid>(
        r#"
        INSERT INTO accounting_synced_transactions
            (tenant_id, provider, payment_id, external_transaction_id,
             external_transaction_number, sync_log_id, synced_amount_minor)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING id
        "#,
    )
    .bind(row.tenant_id)
    .bind(row.provider)
    .bind(row.payment_id)
    .bind(row.external_transaction_id)
    .bind(row.external_transaction_number)
    .bind(row.sync_log_id)
    .bind(row.synced_amount_minor)
    .fetch_one(&mut **tx)
    .await
}

/// Fetch the ledger row for a payment, if it was ever posted
pub async fn find_by_payment(
    pool: &PgPool,
    payment_id: Uuid,
    provider: Provider,
) -> Result<Option<SyncedTransaction>, sqlx::Error> {
    sqlx::query_as::<_, SyncedTransaction>(
        r#"
        SELECT id, tenant_id, provider, payment_id, external_transaction_id,
               external_transaction_number, sync_log_id, synced_amount_minor
        FROM accounting_synced_transactions
        WHERE payment_id = $1 AND provider = $2
        "#,
    )
    .bind(payment_id)
    .bind(provider)
    .fetch_optional(pool)
    .await
}

pub async fn exists(
    pool: &PgPool,
    payment_id: Uuid,
    provider: Provider,
) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar::<_, bool>(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM accounting_synced_transactions
            WHERE payment_id = $1 AND provider = $2
        )
        "#,
    )
    .bind(payment_id)
    .bind(provider)
    .fetch_one(pool)
    .await
}

pub async fn count_for_tenant(
    pool: &PgPool,
    tenant_id: &str,
    provider: Provider,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*) FROM accounting_synced_transactions
        WHERE tenant_id = $1 AND provider = $2
        "#,
    )
    .bind(tenant_id)
    .bind(provider)
    .fetch_one(pool)
    .await
}
