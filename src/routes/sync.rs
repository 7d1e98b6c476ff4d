//! Manual sync trigger and status polling.

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::SyncError;
use crate::models::{Provider, SyncType};
use crate::repos::sync_log_repo::{self, SyncLogEntry};
use crate::services::sync_service::{self, SyncOutcome, SyncRequest};
use crate::state::AppState;

use super::ApiError;

/// Default and maximum batch sizes for one run
const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 500;

#[derive(Debug, Deserialize)]
pub struct ManualSyncRequest {
    pub tenant_id: String,
    pub provider: String,
    pub limit: Option<i64>,
    pub triggered_by: Option<Uuid>,
    /// Defaults to manual; an external scheduler passes "automatic"
    pub sync_type: Option<SyncType>,
}

/// Handler for POST /api/accounting/sync/manual
pub async fn run_manual_sync(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ManualSyncRequest>,
) -> Result<Json<SyncOutcome>, ApiError> {
    let provider: Provider = request
        .provider
        .parse()
        .map_err(|_| SyncError::UnknownProvider(request.provider.clone()))?;

    let limit = request
        .limit
        .unwrap_or(DEFAULT_LIMIT)
        .clamp(1, MAX_LIMIT);

    let outcome = sync_service::run_sync(
        &state.pool,
        &state.vault,
        &state.registry,
        SyncRequest {
            tenant_id: &request.tenant_id,
            provider,
            limit,
            sync_type: request.sync_type.unwrap_or(SyncType::Manual),
            triggered_by: request.triggered_by,
        },
    )
    .await?;

    Ok(Json(outcome))
}

#[derive(Debug, Deserialize)]
pub struct SyncStatusQuery {
    pub sync_log_id: Uuid,
}

/// Handler for GET /api/accounting/sync/status
pub async fn get_sync_status(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SyncStatusQuery>,
) -> Result<Json<SyncLogEntry>, ApiError> {
    let entry = sync_log_repo::find_by_id(&state.pool, query.sync_log_id)
        .await
        .map_err(SyncError::from)?
        .ok_or(SyncError::SyncLogNotFound(query.sync_log_id))?;

    Ok(Json(entry))
}
