use std::env;

/// OAuth client credentials for one provider
#[derive(Debug, Clone)]
pub struct ProviderCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

/// Application configuration parsed from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    /// Hex-encoded 32-byte master secret for the token vault
    pub token_encryption_key: String,
    /// Front-end URL the OAuth callback redirects to
    pub settings_url: String,
    pub quickbooks: Option<ProviderCredentials>,
    pub xero: Option<ProviderCredentials>,
    /// Use provider sandbox endpoints when true
    pub sandbox: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let database_url = env::var("DATABASE_URL")
            .map_err(|_| "DATABASE_URL must be set".to_string())?;

        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        let port: u16 = env::var("PORT")
            .unwrap_or_else(|_| "8094".to_string())
            .parse()
            .map_err(|_| "PORT must be a valid u16".to_string())?;

        let token_encryption_key = env::var("TOKEN_ENCRYPTION_KEY")
            .map_err(|_| "TOKEN_ENCRYPTION_KEY must be set".to_string())?;

        let settings_url = env::var("ACCOUNTING_SETTINGS_URL")
            .unwrap_or_else(|_| "http://localhost:3000/settings/accounting".to_string());

        let sandbox = env::var("ACCOUNTING_SANDBOX")
            .unwrap_or_else(|_| "false".to_string())
            .parse::<bool>()
            .unwrap_or(false);

        Ok(Config {
            database_url,
            host,
            port,
            token_encryption_key,
            settings_url,
            quickbooks: Self::provider_credentials("QUICKBOOKS"),
            xero: Self::provider_credentials("XERO"),
            sandbox,
        })
    }

    /// Read one provider's OAuth credentials; a provider with incomplete
    /// credentials is simply not offered
    fn provider_credentials(prefix: &str) -> Option<ProviderCredentials> {
        let client_id = env::var(format!("{}_CLIENT_ID", prefix)).ok()?;
        let client_secret = env::var(format!("{}_CLIENT_SECRET", prefix)).ok()?;
        let redirect_uri = env::var(format!("{}_REDIRECT_URI", prefix)).ok()?;
        Some(ProviderCredentials {
            client_id,
            client_secret,
            redirect_uri,
        })
    }
}
