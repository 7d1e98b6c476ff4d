pub mod accounts;
pub mod callback;
pub mod connect;
pub mod health;
pub mod mappings;
pub mod sync;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::error::SyncError;

/// JSON error body returned by the API
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

/// Error response wrapper for proper HTTP error handling
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub error: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(error: &'static str, message: impl Into<String>) -> Self {
        ApiError {
            status: StatusCode::BAD_REQUEST,
            error,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.error.to_string(),
            message: self.message,
        });
        (self.status, body).into_response()
    }
}

impl From<SyncError> for ApiError {
    fn from(e: SyncError) -> Self {
        match &e {
            SyncError::UnknownProvider(_) => ApiError {
                status: StatusCode::BAD_REQUEST,
                error: "invalid_provider",
                message: e.to_string(),
            },
            SyncError::IntegrationNotActive { .. } => ApiError {
                status: StatusCode::BAD_REQUEST,
                error: "integration_not_active",
                message: e.to_string(),
            },
            SyncError::SyncAlreadyInProgress { .. } => ApiError {
                status: StatusCode::CONFLICT,
                error: "sync_in_progress",
                message: e.to_string(),
            },
            SyncError::InvalidState => ApiError {
                status: StatusCode::BAD_REQUEST,
                error: "invalid_state",
                message: e.to_string(),
            },
            SyncError::MappingMissing { .. } => ApiError {
                status: StatusCode::BAD_REQUEST,
                error: "mapping_missing",
                message: e.to_string(),
            },
            SyncError::SyncLogNotFound(_) => ApiError {
                status: StatusCode::NOT_FOUND,
                error: "not_found",
                message: e.to_string(),
            },
            SyncError::OAuthExchangeFailed { .. }
            | SyncError::TokenRefreshFailed { .. }
            | SyncError::Provider(_) => ApiError {
                status: StatusCode::BAD_GATEWAY,
                error: "provider_error",
                message: e.to_string(),
            },
            // Internal detail stays in the logs, not the response
            SyncError::Configuration(_)
            | SyncError::Vault(_)
            | SyncError::Database(_)
            | SyncError::PostingFailed { .. } => {
                tracing::error!(error = %e, "Internal error handling API request");
                ApiError {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    error: "internal_error",
                    message: "Internal server error".to_string(),
                }
            }
        }
    }
}
