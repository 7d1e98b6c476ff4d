//! Access-token freshness for sync runs.
//!
//! Tokens are decrypted on demand and refreshed proactively when the
//! remaining lifetime is under a safety margin. A refresh is attempted at
//! most once per call; a rejected refresh marks the integration expired,
//! a transient refresh fault marks it error.

use chrono::{Duration, Utc};
use sqlx::PgPool;

use crate::error::{SyncError, SyncResult};
use crate::models::IntegrationStatus;
use crate::providers::AccountingProvider;
use crate::repos::integration_repo::{self, Integration};
use crate::vault::TokenVault;

/// Remaining lifetime below which the access token is refreshed
pub const REFRESH_MARGIN: Duration = Duration::seconds(300);

/// Return a usable plaintext access token for the integration, refreshing
/// and re-persisting token material if the cached one is near expiry.
pub async fn ensure_access_token(
    pool: &PgPool,
    vault: &TokenVault,
    adapter: &dyn AccountingProvider,
    integration: &Integration,
) -> SyncResult<String> {
    let provider = integration.provider;

    let access_enc = integration.access_token_enc.as_deref().ok_or_else(|| {
        SyncError::TokenRefreshFailed {
            provider,
            message: "integration has no stored access token".to_string(),
        }
    })?;
    let refresh_enc = integration.refresh_token_enc.as_deref().ok_or_else(|| {
        SyncError::TokenRefreshFailed {
            provider,
            message: "integration has no stored refresh token".to_string(),
        }
    })?;

    let fresh_enough = integration
        .token_expires_at
        .map(|expires_at| expires_at - Utc::now() > REFRESH_MARGIN)
        .unwrap_or(false);

    if fresh_enough {
        return Ok(vault.decrypt(access_enc)?);
    }

    tracing::info!(
        provider = %provider,
        tenant_id = %integration.tenant_id,
        "Access token near expiry, refreshing"
    );

    let refresh_token = vault.decrypt(refresh_enc)?;
    let tokens = match adapter.refresh_token(&refresh_token).await {
        Ok(tokens) => tokens,
        Err(e) => {
            // A rejected grant means the user must re-authorize; anything
            // else (network fault, provider outage) may clear on its own.
            let status = if e.is_client_error() {
                IntegrationStatus::Expired
            } else {
                IntegrationStatus::Error
            };
            let message = e.to_string();
            integration_repo::set_status(pool, integration.id, status, Some(&message)).await?;
            return Err(SyncError::TokenRefreshFailed { provider, message });
        }
    };

    let access_enc = vault.encrypt(&tokens.access_token)?;
    let refresh_enc = vault.encrypt(&tokens.refresh_token)?;
    integration_repo::update_tokens(
        pool,
        integration.id,
        &access_enc,
        &refresh_enc,
        tokens.expires_at,
    )
    .await?;

    Ok(tokens.access_token)
}
