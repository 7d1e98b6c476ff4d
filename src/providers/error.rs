use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("HTTP error: {0}")]
    HttpError(String),

    /// Non-2xx from the provider. The raw body is kept for operator
    /// diagnosis and must not be shown to end users.
    #[error("API error (status {status_code}): {body}")]
    ApiError { status_code: u16, body: String },

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Missing external company reference for this call")]
    MissingCompanyRef,
}

impl ProviderError {
    /// Check if this is a client error (4xx): the provider understood the
    /// request and rejected it, so retrying the same call will not help.
    pub fn is_client_error(&self) -> bool {
        matches!(self, ProviderError::ApiError { status_code, .. } if (400..500).contains(status_code))
    }
}
