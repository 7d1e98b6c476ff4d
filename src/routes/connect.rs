//! Connect/disconnect endpoint for accounting providers.

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::SyncError;
use crate::models::Provider;
use crate::services::connection_service;
use crate::state::AppState;

use super::ApiError;

#[derive(Debug, Deserialize)]
pub struct ConnectRequest {
    pub action: String,
    pub provider: String,
    pub tenant_id: String,
    /// Front-end URL to return the browser to after the OAuth flow
    pub redirect_url: Option<String>,
    pub user_id: Option<Uuid>,
}

/// Handler for POST /api/accounting/connect
pub async fn connect(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ConnectRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let provider: Provider = request
        .provider
        .parse()
        .map_err(|_| SyncError::UnknownProvider(request.provider.clone()))?;

    match request.action.as_str() {
        "connect" => {
            let redirect_url = request.redirect_url.as_deref().ok_or_else(|| {
                ApiError::bad_request("invalid_request", "redirect_url is required for connect")
            })?;

            let initiation = connection_service::initiate_connect(
                &state.pool,
                &state.registry,
                &request.tenant_id,
                provider,
                redirect_url,
                request.user_id,
            )
            .await?;

            Ok(Json(serde_json::json!({
                "authorization_url": initiation.authorization_url,
                "state": initiation.state,
            })))
        }
        "disconnect" => {
            connection_service::disconnect(
                &state.pool,
                &state.vault,
                &state.registry,
                &request.tenant_id,
                provider,
            )
            .await?;

            Ok(Json(serde_json::json!({ "success": true })))
        }
        other => Err(ApiError::bad_request(
            "invalid_request",
            format!("unknown action: {}", other),
        )),
    }
}
