//! OAuth connect/disconnect flows.
//!
//! Connect issues a persisted CSRF state and hands the caller the provider
//! authorization URL; the callback consumes the state exactly once,
//! exchanges the code, and upserts the integration with vault-encrypted
//! tokens. Disconnect prioritises removing local access: remote revocation
//! is best-effort and never blocks de-registration.

use chrono::{Duration, Utc};
use rand::RngCore;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{SyncError, SyncResult};
use crate::models::Provider;
use crate::providers::ProviderRegistry;
use crate::repos::{integration_repo, oauth_state_repo};
use crate::vault::TokenVault;

/// CSRF state token length in bytes (hex-encoded on the wire)
const STATE_LENGTH: usize = 32;

/// How long an issued state stays redeemable
const STATE_LIFETIME_MINUTES: i64 = 10;

/// Result of initiating a connect flow
#[derive(Debug)]
pub struct ConnectInitiation {
    pub authorization_url: String,
    pub state: String,
}

/// Result of a successful OAuth callback
#[derive(Debug)]
pub struct CallbackOutcome {
    pub tenant_id: String,
    pub provider: Provider,
    pub company_name: String,
    /// Front-end URL the browser should be sent back to
    pub redirect_url: String,
}

/// Begin the OAuth connect flow for a tenant and provider
pub async fn initiate_connect(
    pool: &PgPool,
    registry: &ProviderRegistry,
    tenant_id: &str,
    provider: Provider,
    redirect_url: &str,
    user_id: Option<Uuid>,
) -> SyncResult<ConnectInitiation> {
    let adapter = registry.get(provider).ok_or_else(|| {
        SyncError::Configuration(format!("provider {} is not configured", provider))
    })?;

    // Housekeeping: drop states that were issued but never redeemed
    match oauth_state_repo::purge_expired(pool).await {
        Ok(0) => {}
        Ok(purged) => tracing::debug!(purged, "Purged expired OAuth states"),
        Err(e) => tracing::warn!(error = %e, "Failed to purge expired OAuth states"),
    }

    let mut state_bytes = [0u8; STATE_LENGTH];
    rand::rngs::OsRng.fill_bytes(&mut state_bytes);
    let state = hex::encode(state_bytes);

    let expires_at = Utc::now() + Duration::minutes(STATE_LIFETIME_MINUTES);
    oauth_state_repo::insert(pool, &state, tenant_id, provider, redirect_url, user_id, expires_at)
        .await?;

    let authorization_url = adapter.authorization_url(&state, adapter.oauth_redirect_uri());

    tracing::info!(
        provider = %provider,
        tenant_id = %tenant_id,
        "OAuth connect initiated"
    );

    Ok(ConnectInitiation {
        authorization_url,
        state,
    })
}

/// Handle the provider redirect back to this service.
///
/// The state must match a persisted, unexpired row; it is deleted on first
/// use so a replayed callback is rejected.
pub async fn handle_callback(
    pool: &PgPool,
    vault: &TokenVault,
    registry: &ProviderRegistry,
    code: &str,
    state: &str,
    realm_id: Option<&str>,
) -> SyncResult<CallbackOutcome> {
    let state_row = oauth_state_repo::consume(pool, state)
        .await?
        .ok_or(SyncError::InvalidState)?;

    if state_row.expires_at < Utc::now() {
        return Err(SyncError::InvalidState);
    }

    let provider = state_row.provider;
    let adapter = registry.get(provider).ok_or_else(|| {
        SyncError::Configuration(format!("provider {} is not configured", provider))
    })?;

    let tokens = adapter
        .exchange_code(code, adapter.oauth_redirect_uri())
        .await
        .map_err(|e| SyncError::OAuthExchangeFailed {
            provider,
            message: e.to_string(),
        })?;

    let company = adapter
        .fetch_company_info(&tokens.access_token, realm_id)
        .await?;

    let access_enc = vault.encrypt(&tokens.access_token)?;
    let refresh_enc = vault.encrypt(&tokens.refresh_token)?;

    integration_repo::upsert_connected(
        pool,
        integration_repo::ConnectedIntegration {
            tenant_id: &state_row.tenant_id,
            provider,
            access_token_enc: &access_enc,
            refresh_token_enc: &refresh_enc,
            token_expires_at: tokens.expires_at,
            external_company_id: &company.company_id,
            external_company_name: &company.company_name,
        },
    )
    .await?;

    tracing::info!(
        provider = %provider,
        tenant_id = %state_row.tenant_id,
        company = %company.company_name,
        "Accounting integration connected"
    );

    Ok(CallbackOutcome {
        tenant_id: state_row.tenant_id,
        provider,
        company_name: company.company_name,
        redirect_url: state_row.redirect_url,
    })
}

/// Disconnect a provider. The local record is the source of truth for
/// "are we still connected"; revocation failures are logged and swallowed.
pub async fn disconnect(
    pool: &PgPool,
    vault: &TokenVault,
    registry: &ProviderRegistry,
    tenant_id: &str,
    provider: Provider,
) -> SyncResult<()> {
    let integration = integration_repo::find(pool, tenant_id, provider)
        .await?
        .ok_or_else(|| SyncError::IntegrationNotActive {
            tenant_id: tenant_id.to_string(),
            provider,
        })?;

    if let (Some(adapter), Some(refresh_enc)) =
        (registry.get(provider), integration.refresh_token_enc.as_deref())
    {
        match vault.decrypt(refresh_enc) {
            Ok(refresh_token) => {
                if let Err(e) = adapter.revoke_token(&refresh_token).await {
                    tracing::warn!(
                        provider = %provider,
                        tenant_id = %tenant_id,
                        error = %e,
                        "Remote token revocation failed; proceeding with local disconnect"
                    );
                }
            }
            Err(e) => {
                tracing::warn!(
                    provider = %provider,
                    tenant_id = %tenant_id,
                    error = %e,
                    "Could not decrypt stored token; skipping remote revocation"
                );
            }
        }
    }

    integration_repo::mark_disconnected(pool, integration.id).await?;

    tracing::info!(
        provider = %provider,
        tenant_id = %tenant_id,
        "Accounting integration disconnected"
    );

    Ok(())
}
