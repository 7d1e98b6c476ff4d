//! Persisted CSRF state for the OAuth connect flow. A state row is consumed
//! exactly once by the callback.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::models::Provider;

#[derive(Debug, Clone, FromRow)]
pub struct OAuthState {
    pub state: String,
    pub tenant_id: String,
    pub provider: Provider,
    pub redirect_url: String,
    pub user_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

pub async fn insert(
    pool: &PgPool,
    state: &str,
    tenant_id: &str,
    provider: Provider,
    redirect_url: &str,
    user_id: Option<Uuid>,
    expires_at: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO accounting_oauth_states
            (state, tenant_id, provider, redirect_url, user_id, expires_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(state)
    .bind(tenant_id)
    .bind(provider)
    .bind(redirect_url)
    .bind(user_id)
    .bind(expires_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Delete and return the state row. A second callback with the same state
/// gets nothing.
pub async fn consume(pool: &PgPool, state: &str) -> Result<Option<OAuthState>, sqlx::Error> {
    sqlx::query_as::<_, OAuthState>(
        r#"
        DELETE FROM accounting_oauth_states
        WHERE state = $1
        RETURNING state, tenant_id, provider, redirect_url, user_id, created_at, expires_at
        "#,
    )
    .bind(state)
    .fetch_optional(pool)
    .await
}

/// Housekeeping for states that were never redeemed
pub async fn purge_expired(pool: &PgPool) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM accounting_oauth_states WHERE expires_at < now()")
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
