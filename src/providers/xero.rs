//! Xero adapter.
//!
//! Revenue categories post as authorised ACCREC invoices, refunds as
//! ACCRECCREDIT credit notes. API calls carry the `xero-tenant-id` header
//! resolved from the connections endpoint at connect time.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::error::ProviderError;
use super::{
    amount_major, AccountingProvider, CompanyInfo, LedgerAccount, LedgerEntry, PostedEntry,
    TokenSet,
};
use crate::config::ProviderCredentials;
use crate::models::{Provider, RevenueCategory};

const AUTHORIZATION_ENDPOINT: &str = "https://login.xero.com/identity/connect/authorize";
const TOKEN_ENDPOINT: &str = "https://identity.xero.com/connect/token";
const REVOKE_ENDPOINT: &str = "https://identity.xero.com/connect/revocation";
const CONNECTIONS_ENDPOINT: &str = "https://api.xero.com/connections";
const API_BASE: &str = "https://api.xero.com/api.xro/2.0";
const SCOPE: &str = "offline_access accounting.transactions accounting.settings";

/// Counterparty recorded on generated documents; gym sales have no per-sale
/// Xero contact.
const SALES_CONTACT_NAME: &str = "Walk-in / Online Sales";

#[derive(Debug, Deserialize)]
struct XeroTokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
}

#[derive(Debug, Deserialize)]
struct XeroConnection {
    #[serde(rename = "tenantId")]
    tenant_id: String,
    #[serde(rename = "tenantName")]
    tenant_name: Option<String>,
}

#[derive(Debug, Serialize)]
struct XeroContact {
    #[serde(rename = "Name")]
    name: String,
}

#[derive(Debug, Serialize)]
struct XeroLineItem {
    #[serde(rename = "Description")]
    description: String,
    #[serde(rename = "Quantity")]
    quantity: f64,
    #[serde(rename = "UnitAmount")]
    unit_amount: f64,
    #[serde(rename = "AccountCode", skip_serializing_if = "Option::is_none")]
    account_code: Option<String>,
}

#[derive(Debug, Serialize)]
struct XeroDocumentRequest {
    #[serde(rename = "Type")]
    doc_type: String,
    #[serde(rename = "Contact")]
    contact: XeroContact,
    #[serde(rename = "Date")]
    date: String,
    #[serde(rename = "Status")]
    status: String,
    #[serde(rename = "Reference")]
    reference: String,
    #[serde(rename = "LineItems")]
    line_items: Vec<XeroLineItem>,
}

#[derive(Debug, Deserialize)]
struct XeroInvoicesEnvelope {
    #[serde(rename = "Invoices")]
    invoices: Vec<XeroInvoice>,
}

#[derive(Debug, Deserialize)]
struct XeroInvoice {
    #[serde(rename = "InvoiceID")]
    invoice_id: String,
    #[serde(rename = "InvoiceNumber")]
    invoice_number: Option<String>,
}

#[derive(Debug, Deserialize)]
struct XeroCreditNotesEnvelope {
    #[serde(rename = "CreditNotes")]
    credit_notes: Vec<XeroCreditNote>,
}

#[derive(Debug, Deserialize)]
struct XeroCreditNote {
    #[serde(rename = "CreditNoteID")]
    credit_note_id: String,
    #[serde(rename = "CreditNoteNumber")]
    credit_note_number: Option<String>,
}

#[derive(Debug, Deserialize)]
struct XeroAccountsEnvelope {
    #[serde(rename = "Accounts")]
    accounts: Vec<XeroAccount>,
}

#[derive(Debug, Deserialize)]
struct XeroAccount {
    #[serde(rename = "AccountID")]
    account_id: String,
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Code")]
    code: Option<String>,
    #[serde(rename = "Type")]
    account_type: Option<String>,
}

/// Xero API client
#[derive(Clone)]
pub struct XeroClient {
    creds: ProviderCredentials,
    http_client: Client,
}

impl XeroClient {
    pub fn new(creds: ProviderCredentials) -> Result<Self, ProviderError> {
        let http_client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| ProviderError::ConfigError(format!("failed to build HTTP client: {}", e)))?;

        Ok(XeroClient { creds, http_client })
    }

    async fn token_request(&self, params: &[(&str, &str)]) -> Result<TokenSet, ProviderError> {
        let response = self
            .http_client
            .post(TOKEN_ENDPOINT)
            .basic_auth(&self.creds.client_id, Some(&self.creds.client_secret))
            .form(params)
            .send()
            .await
            .map_err(|e| ProviderError::HttpError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(ProviderError::ApiError {
                status_code: status.as_u16(),
                body,
            });
        }

        let tokens: XeroTokenResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::ParseError(e.to_string()))?;

        Ok(TokenSet {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            expires_at: Utc::now() + Duration::seconds(tokens.expires_in),
        })
    }

    async fn api_get<T: serde::de::DeserializeOwned>(
        &self,
        access_token: &str,
        tenant_id: &str,
        path: &str,
    ) -> Result<T, ProviderError> {
        let url = format!("{}{}", API_BASE, path);
        let response = self
            .http_client
            .get(&url)
            .bearer_auth(access_token)
            .header("xero-tenant-id", tenant_id)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| ProviderError::HttpError(e.to_string()))?;

        Self::handle_response(response).await
    }

    async fn api_post<T: serde::de::DeserializeOwned, B: serde::Serialize>(
        &self,
        access_token: &str,
        tenant_id: &str,
        path: &str,
        body: &B,
    ) -> Result<T, ProviderError> {
        let url = format!("{}{}", API_BASE, path);
        let response = self
            .http_client
            .post(&url)
            .bearer_auth(access_token)
            .header("xero-tenant-id", tenant_id)
            .header("Accept", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| ProviderError::HttpError(e.to_string()))?;

        Self::handle_response(response).await
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ProviderError> {
        let status = response.status();

        if status.is_success() {
            response
                .json::<T>()
                .await
                .map_err(|e| ProviderError::ParseError(e.to_string()))
        } else {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            Err(ProviderError::ApiError {
                status_code: status.as_u16(),
                body,
            })
        }
    }

    fn document_request(entry: &LedgerEntry, doc_type: &str) -> XeroDocumentRequest {
        XeroDocumentRequest {
            doc_type: doc_type.to_string(),
            contact: XeroContact {
                name: SALES_CONTACT_NAME.to_string(),
            },
            date: entry.txn_date.format("%Y-%m-%d").to_string(),
            status: "AUTHORISED".to_string(),
            reference: entry.reference.clone(),
            line_items: vec![XeroLineItem {
                description: entry.description.clone(),
                quantity: 1.0,
                unit_amount: amount_major(entry.amount_minor),
                account_code: entry.account_code.clone(),
            }],
        }
    }
}

#[async_trait]
impl AccountingProvider for XeroClient {
    fn provider(&self) -> Provider {
        Provider::Xero
    }

    fn oauth_redirect_uri(&self) -> &str {
        &self.creds.redirect_uri
    }

    fn authorization_url(&self, state: &str, redirect_uri: &str) -> String {
        format!(
            "{}?response_type=code&client_id={}&redirect_uri={}&scope={}&state={}",
            AUTHORIZATION_ENDPOINT,
            urlencoding::encode(&self.creds.client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(SCOPE),
            urlencoding::encode(state),
        )
    }

    async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenSet, ProviderError> {
        self.token_request(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
        ])
        .await
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenSet, ProviderError> {
        self.token_request(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ])
        .await
    }

    async fn revoke_token(&self, token: &str) -> Result<(), ProviderError> {
        let response = self
            .http_client
            .post(REVOKE_ENDPOINT)
            .basic_auth(&self.creds.client_id, Some(&self.creds.client_secret))
            .form(&[("token", token)])
            .send()
            .await
            .map_err(|e| ProviderError::HttpError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::ApiError {
                status_code: status.as_u16(),
                body,
            });
        }
        Ok(())
    }

    async fn fetch_company_info(
        &self,
        access_token: &str,
        _company_ref: Option<&str>,
    ) -> Result<CompanyInfo, ProviderError> {
        let response = self
            .http_client
            .get(CONNECTIONS_ENDPOINT)
            .bearer_auth(access_token)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| ProviderError::HttpError(e.to_string()))?;

        let connections: Vec<XeroConnection> = Self::handle_response(response).await?;
        let connection = connections
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::ParseError("no Xero connections returned".to_string()))?;

        Ok(CompanyInfo {
            company_id: connection.tenant_id,
            company_name: connection
                .tenant_name
                .unwrap_or_else(|| "Xero organisation".to_string()),
        })
    }

    async fn fetch_chart_of_accounts(
        &self,
        access_token: &str,
        company_ref: &str,
    ) -> Result<Vec<LedgerAccount>, ProviderError> {
        let envelope: XeroAccountsEnvelope = self
            .api_get(access_token, company_ref, "/Accounts?where=Type%3D%3D%22REVENUE%22")
            .await?;

        Ok(envelope
            .accounts
            .into_iter()
            .map(|a| LedgerAccount {
                id: a.account_id,
                name: a.name,
                code: a.code,
                account_type: a.account_type,
            })
            .collect())
    }

    async fn post_ledger_entry(
        &self,
        access_token: &str,
        company_ref: &str,
        entry: &LedgerEntry,
    ) -> Result<PostedEntry, ProviderError> {
        if entry.category == RevenueCategory::Refund {
            let request = Self::document_request(entry, "ACCRECCREDIT");
            let envelope: XeroCreditNotesEnvelope = self
                .api_post(access_token, company_ref, "/CreditNotes", &request)
                .await?;
            let note = envelope.credit_notes.into_iter().next().ok_or_else(|| {
                ProviderError::ParseError("empty CreditNotes response".to_string())
            })?;
            Ok(PostedEntry {
                external_id: note.credit_note_id,
                doc_number: note.credit_note_number,
            })
        } else {
            let request = Self::document_request(entry, "ACCREC");
            let envelope: XeroInvoicesEnvelope = self
                .api_post(access_token, company_ref, "/Invoices", &request)
                .await?;
            let invoice = envelope
                .invoices
                .into_iter()
                .next()
                .ok_or_else(|| ProviderError::ParseError("empty Invoices response".to_string()))?;
            Ok(PostedEntry {
                external_id: invoice.invoice_id,
                doc_number: invoice.invoice_number,
            })
        }
    }
}
