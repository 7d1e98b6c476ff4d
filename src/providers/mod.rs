pub mod error;
pub mod quickbooks;
pub mod xero;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::Config;
use crate::models::{Provider, RevenueCategory};
use error::ProviderError;
use quickbooks::QuickBooksClient;
use xero::XeroClient;

/// Tokens returned by a provider's OAuth endpoints
#[derive(Debug, Clone)]
pub struct TokenSet {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

/// Display metadata for the connected company/organisation
#[derive(Debug, Clone)]
pub struct CompanyInfo {
    pub company_id: String,
    pub company_name: String,
}

/// One entry from the provider's chart of accounts
#[derive(Debug, Clone, Serialize)]
pub struct LedgerAccount {
    pub id: String,
    pub name: String,
    pub code: Option<String>,
    pub account_type: Option<String>,
}

/// A categorized payment ready to post to the external ledger
#[derive(Debug, Clone)]
pub struct LedgerEntry {
    pub category: RevenueCategory,
    pub amount_minor: i64,
    pub currency: String,
    pub description: String,
    pub account_id: String,
    pub account_code: Option<String>,
    pub txn_date: NaiveDate,
    /// Local payment id, recorded on the external document for reconciliation
    pub reference: String,
}

/// Result of a successful ledger posting
#[derive(Debug, Clone)]
pub struct PostedEntry {
    pub external_id: String,
    pub doc_number: Option<String>,
}

/// Uniform interface over each provider's OAuth and ledger REST APIs
#[async_trait]
pub trait AccountingProvider: Send + Sync {
    fn provider(&self) -> Provider;

    /// The registered OAuth redirect URI (this service's callback endpoint)
    fn oauth_redirect_uri(&self) -> &str;

    /// Build the provider authorization URL for the OAuth connect flow
    fn authorization_url(&self, state: &str, redirect_uri: &str) -> String;

    /// Exchange an authorization code for tokens
    async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenSet, ProviderError>;

    /// Exchange a refresh token for fresh tokens
    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenSet, ProviderError>;

    /// Revoke a token. Best-effort from the caller's perspective.
    async fn revoke_token(&self, token: &str) -> Result<(), ProviderError>;

    /// Fetch company/organisation display metadata.
    ///
    /// QuickBooks needs the realm id from the OAuth callback; Xero resolves
    /// its tenant from the connections endpoint and ignores `company_ref`.
    async fn fetch_company_info(
        &self,
        access_token: &str,
        company_ref: Option<&str>,
    ) -> Result<CompanyInfo, ProviderError>;

    /// Fetch the chart of accounts for mapping configuration
    async fn fetch_chart_of_accounts(
        &self,
        access_token: &str,
        company_ref: &str,
    ) -> Result<Vec<LedgerAccount>, ProviderError>;

    /// Post one ledger entry (sales receipt/invoice for revenue, credit
    /// memo/credit note for refunds)
    async fn post_ledger_entry(
        &self,
        access_token: &str,
        company_ref: &str,
        entry: &LedgerEntry,
    ) -> Result<PostedEntry, ProviderError>;
}

/// The providers this deployment is configured for
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    inner: HashMap<Provider, Arc<dyn AccountingProvider>>,
}

impl ProviderRegistry {
    pub fn from_config(config: &Config) -> Self {
        let mut inner: HashMap<Provider, Arc<dyn AccountingProvider>> = HashMap::new();

        if let Some(creds) = &config.quickbooks {
            match QuickBooksClient::new(creds.clone(), config.sandbox) {
                Ok(client) => {
                    inner.insert(Provider::Quickbooks, Arc::new(client));
                }
                Err(e) => tracing::error!("Failed to build QuickBooks client: {}", e),
            }
        }

        if let Some(creds) = &config.xero {
            match XeroClient::new(creds.clone()) {
                Ok(client) => {
                    inner.insert(Provider::Xero, Arc::new(client));
                }
                Err(e) => tracing::error!("Failed to build Xero client: {}", e),
            }
        }

        ProviderRegistry { inner }
    }

    /// Register a provider implementation (used by tests to inject fakes)
    pub fn register(&mut self, adapter: Arc<dyn AccountingProvider>) {
        self.inner.insert(adapter.provider(), adapter);
    }

    pub fn get(&self, provider: Provider) -> Option<Arc<dyn AccountingProvider>> {
        self.inner.get(&provider).cloned()
    }
}

/// Convert minor units to the decimal major-unit amount providers expect
pub(crate) fn amount_major(amount_minor: i64) -> f64 {
    amount_minor as f64 / 100.0
}
