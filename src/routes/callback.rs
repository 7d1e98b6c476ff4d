//! OAuth callback endpoint.
//!
//! The caller here is a browser mid-redirect, not an API client, so this
//! route never returns JSON errors; it redirects to the front end with an
//! error flag instead.

use axum::extract::{Query, State};
use axum::response::Redirect;
use serde::Deserialize;
use std::sync::Arc;

use crate::services::connection_service;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    /// QuickBooks realm id; absent for Xero
    #[serde(rename = "realmId")]
    pub realm_id: Option<String>,
    /// Providers redirect with an error code when the user denies consent
    pub error: Option<String>,
}

/// Handler for GET /api/accounting/callback
pub async fn callback(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CallbackQuery>,
) -> Redirect {
    if let Some(provider_error) = &query.error {
        tracing::warn!(error = %provider_error, "OAuth consent denied or failed");
        return error_redirect(&state.settings_url, "consent_denied");
    }

    let (code, oauth_state) = match (&query.code, &query.state) {
        (Some(code), Some(oauth_state)) => (code, oauth_state),
        _ => {
            tracing::warn!("OAuth callback missing code or state");
            return error_redirect(&state.settings_url, "missing_parameters");
        }
    };

    match connection_service::handle_callback(
        &state.pool,
        &state.vault,
        &state.registry,
        code,
        oauth_state,
        query.realm_id.as_deref(),
    )
    .await
    {
        Ok(outcome) => {
            let separator = if outcome.redirect_url.contains('?') { '&' } else { '?' };
            Redirect::to(&format!(
                "{}{}connected={}",
                outcome.redirect_url,
                separator,
                outcome.provider
            ))
        }
        Err(e) => {
            tracing::error!(error = %e, "OAuth callback failed");
            error_redirect(&state.settings_url, "connect_failed")
        }
    }
}

fn error_redirect(settings_url: &str, code: &str) -> Redirect {
    let separator = if settings_url.contains('?') { '&' } else { '?' };
    Redirect::to(&format!("{}{}error={}", settings_url, separator, code))
}
