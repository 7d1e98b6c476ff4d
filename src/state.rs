use sqlx::PgPool;

use crate::providers::ProviderRegistry;
use crate::vault::TokenVault;

/// Shared application state injected into every handler
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub vault: TokenVault,
    pub registry: ProviderRegistry,
    /// Front-end URL the OAuth callback falls back to when no stored
    /// redirect is available
    pub settings_url: String,
}
