use thiserror::Error;
use uuid::Uuid;

use crate::models::Provider;
use crate::providers::error::ProviderError;
use crate::vault::VaultError;

/// Errors surfaced by the accounting sync service.
///
/// Precondition failures propagate synchronously to the caller; per-payment
/// failures inside a sync run are captured as data in the run outcome and
/// never cross this boundary.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("No active {provider} integration for tenant {tenant_id}")]
    IntegrationNotActive { tenant_id: String, provider: Provider },

    #[error("A {provider} sync is already in progress for tenant {tenant_id}")]
    SyncAlreadyInProgress { tenant_id: String, provider: Provider },

    #[error("OAuth code exchange with {provider} failed: {message}")]
    OAuthExchangeFailed { provider: Provider, message: String },

    #[error("Token refresh with {provider} failed: {message}")]
    TokenRefreshFailed { provider: Provider, message: String },

    #[error("Ledger posting failed for payment {payment_id}: {message}")]
    PostingFailed { payment_id: Uuid, message: String },

    #[error("No active account mapping for {provider} categories: {missing:?}")]
    MappingMissing { provider: Provider, missing: Vec<String> },

    #[error("OAuth state is missing, expired, or does not match")]
    InvalidState,

    #[error("Sync log not found: {0}")]
    SyncLogNotFound(Uuid),

    #[error(transparent)]
    Vault(#[from] VaultError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type SyncResult<T> = Result<T, SyncError>;
