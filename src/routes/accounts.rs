//! Chart-of-accounts listing for the mapping configuration UI.

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;

use crate::error::SyncError;
use crate::models::{IntegrationStatus, Provider};
use crate::providers::LedgerAccount;
use crate::repos::integration_repo;
use crate::services::token_service;
use crate::state::AppState;

use super::ApiError;

#[derive(Debug, Deserialize)]
pub struct AccountsQuery {
    pub tenant_id: String,
    pub provider: String,
}

/// Handler for GET /api/accounting/accounts
pub async fn get_accounts(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AccountsQuery>,
) -> Result<Json<Vec<LedgerAccount>>, ApiError> {
    let provider: Provider = query
        .provider
        .parse()
        .map_err(|_| SyncError::UnknownProvider(query.provider.clone()))?;

    let integration = integration_repo::find(&state.pool, &query.tenant_id, provider)
        .await
        .map_err(SyncError::from)?
        .filter(|i| i.status == IntegrationStatus::Active)
        .ok_or_else(|| SyncError::IntegrationNotActive {
            tenant_id: query.tenant_id.clone(),
            provider,
        })?;

    let adapter = state.registry.get(provider).ok_or_else(|| {
        SyncError::Configuration(format!("provider {} is not configured", provider))
    })?;

    let access_token =
        token_service::ensure_access_token(&state.pool, &state.vault, adapter.as_ref(), &integration)
            .await?;

    let company_ref = integration.external_company_id.as_deref().ok_or_else(|| {
        SyncError::Configuration("integration has no external company reference".to_string())
    })?;

    let accounts = adapter
        .fetch_chart_of_accounts(&access_token, company_ref)
        .await
        .map_err(SyncError::from)?;

    Ok(Json(accounts))
}
