//! Persistence for (tenant, provider) accounting integrations.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::models::{IntegrationStatus, Provider, SyncRunStatus};

/// One connected accounting provider for a tenant
#[derive(Debug, Clone, FromRow)]
pub struct Integration {
    pub id: Uuid,
    pub tenant_id: String,
    pub provider: Provider,
    pub status: IntegrationStatus,
    pub access_token_enc: Option<String>,
    pub refresh_token_enc: Option<String>,
    pub token_expires_at: Option<DateTime<Utc>>,
    pub external_company_id: Option<String>,
    pub external_company_name: Option<String>,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub last_sync_status: Option<SyncRunStatus>,
    pub last_sync_error: Option<String>,
    pub auto_sync_enabled: bool,
    pub sync_frequency: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Token material and company metadata stored on a successful OAuth callback
#[derive(Debug)]
pub struct ConnectedIntegration<'a> {
    pub tenant_id: &'a str,
    pub provider: Provider,
    pub access_token_enc: &'a str,
    pub refresh_token_enc: &'a str,
    pub token_expires_at: DateTime<Utc>,
    pub external_company_id: &'a str,
    pub external_company_name: &'a str,
}

const SELECT_COLUMNS: &str = r#"
    id, tenant_id, provider, status, access_token_enc, refresh_token_enc,
    token_expires_at, external_company_id, external_company_name,
    last_sync_at, last_sync_status, last_sync_error, auto_sync_enabled,
    sync_frequency, created_at, updated_at
"#;

pub async fn find(
    pool: &PgPool,
    tenant_id: &str,
    provider: Provider,
) -> Result<Option<Integration>, sqlx::Error> {
    let sql = format!(
        "SELECT {} FROM accounting_integrations WHERE tenant_id = $1 AND provider = $2",
        SELECT_COLUMNS
    );

    sqlx::query_as::<_, Integration>(&sql)
        .bind(tenant_id)
        .bind(provider)
        .fetch_optional(pool)
        .await
}

/// Upsert keyed on (tenant, provider): re-connecting replaces token material
/// and reactivates the row.
pub async fn upsert_connected(
    pool: &PgPool,
    params: ConnectedIntegration<'_>,
) -> Result<Integration, sqlx::Error> {
    let sql = format!(
        r#"
        INSERT INTO accounting_integrations
            (tenant_id, provider, status, access_token_enc, refresh_token_enc,
             token_expires_at, external_company_id, external_company_name)
        VALUES ($1, $2, 'active', $3, $4, $5, $6, $7)
        ON CONFLICT (tenant_id, provider) DO UPDATE SET
            status = 'active',
            access_token_enc = EXCLUDED.access_token_enc,
            refresh_token_enc = EXCLUDED.refresh_token_enc,
            token_expires_at = EXCLUDED.token_expires_at,
            external_company_id = EXCLUDED.external_company_id,
            external_company_name = EXCLUDED.external_company_name,
            last_sync_error = NULL,
            updated_at = now()
        RETURNING {}
        "#,
        SELECT_COLUMNS
    );

    sqlx::query_as::<_, Integration>(&sql)
        .bind(params.tenant_id)
        .bind(params.provider)
        .bind(params.access_token_enc)
        .bind(params.refresh_token_enc)
        .bind(params.token_expires_at)
        .bind(params.external_company_id)
        .bind(params.external_company_name)
        .fetch_one(pool)
        .await
}

/// Persist rotated tokens after a refresh
pub async fn update_tokens(
    pool: &PgPool,
    id: Uuid,
    access_token_enc: &str,
    refresh_token_enc: &str,
    token_expires_at: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE accounting_integrations
        SET access_token_enc = $2,
            refresh_token_enc = $3,
            token_expires_at = $4,
            status = 'active',
            updated_at = now()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(access_token_enc)
    .bind(refresh_token_enc)
    .bind(token_expires_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Soft delete: tokens are nulled, history fields (company name/id) survive
pub async fn mark_disconnected(pool: &PgPool, id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE accounting_integrations
        SET status = 'disconnected',
            access_token_enc = NULL,
            refresh_token_enc = NULL,
            token_expires_at = NULL,
            updated_at = now()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Transition the integration after a failed token refresh or similar fault
pub async fn set_status(
    pool: &PgPool,
    id: Uuid,
    status: IntegrationStatus,
    last_error: Option<&str>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE accounting_integrations
        SET status = $2, last_sync_error = $3, updated_at = now()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(status)
    .bind(last_error)
    .execute(pool)
    .await?;
    Ok(())
}

/// Record the terminal outcome of a sync run on the parent integration
pub async fn record_sync_outcome(
    pool: &PgPool,
    id: Uuid,
    status: SyncRunStatus,
    error: Option<&str>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE accounting_integrations
        SET last_sync_at = now(),
            last_sync_status = $2,
            last_sync_error = $3,
            updated_at = now()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(status)
    .bind(error)
    .execute(pool)
    .await?;
    Ok(())
}
