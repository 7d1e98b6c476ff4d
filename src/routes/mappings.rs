//! Pre-run mapping validation for the settings UI.

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::SyncError;
use crate::models::{Provider, RevenueCategory};
use crate::repos::mapping_repo;
use crate::state::AppState;

use super::ApiError;

#[derive(Debug, Deserialize)]
pub struct MappingValidationQuery {
    pub tenant_id: String,
    pub provider: String,
}

#[derive(Debug, Serialize)]
pub struct MappingValidationResponse {
    pub valid: bool,
    pub missing: Vec<RevenueCategory>,
}

/// Handler for GET /api/accounting/mappings/validate.
///
/// Lets a caller fail fast with an itemized list of unmapped categories
/// before kicking off a bulk sync, instead of discovering gaps mid-batch.
pub async fn validate_mappings(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MappingValidationQuery>,
) -> Result<Json<MappingValidationResponse>, ApiError> {
    let provider: Provider = query
        .provider
        .parse()
        .map_err(|_| SyncError::UnknownProvider(query.provider.clone()))?;

    let validation = mapping_repo::validate(
        &state.pool,
        &query.tenant_id,
        provider,
        &RevenueCategory::all(),
    )
    .await
    .map_err(SyncError::from)?;

    Ok(Json(MappingValidationResponse {
        valid: validation.valid,
        missing: validation.missing,
    }))
}
