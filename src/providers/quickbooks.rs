//! QuickBooks Online adapter.
//!
//! Revenue categories post as Sales Receipts, refunds as Credit Memos.

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

const AUTHORIZATION_ENDPOINT: &str = "https://appcenter.intuit.com/connect/oauth2";
const TOKEN_ENDPOINT: &str = "https://oauth.platform.intuit.com/oauth2/v1/tokens/bearer";
const REVOKE_ENDPOINT: &str = "https://developer.api.intuit.com/v2/oauth2/tokens/revoke";
const SCOPE: &str = "com.intuit.quickbooks.accounting";

#[derive(Debug, Deserialize)]
struct QbTokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
}

#[derive(Debug, Serialize)]
struct QbEntityRef {
    value: String,
}

#[derive(Debug, Serialize)]
struct QbSalesItemLineDetail {
    #[serde(rename = "ItemRef")]
    item_ref: QbEntityRef,
}

#[derive(Debug, Serialize)]
struct QbLine {
    #[serde(rename = "Amount")]
    amount: f64,
    #[serde(rename = "DetailType")]
    detail_type: String,
    #[serde(rename = "Description")]
    description: String,
    #[serde(rename = "SalesItemLineDetail")]
    sales_item_line_detail: QbSalesItemLineDetail,
}

#[derive(Debug, Serialize)]
struct QbTransactionRequest {
    #[serde(rename = "TxnDate")]
    txn_date: String,
    #[serde(rename = "PaymentRefNum", skip_serializing_if = "Option::is_none")]
    payment_ref_num: Option<String>,
    #[serde(rename = "Line")]
    line: Vec<QbLine>,
}

#[derive(Debug, Deserialize)]
struct QbDocument {
    #[serde(rename = "Id")]
    id: String,
    #[serde(rename = "DocNumber")]
    doc_number: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QbSalesReceiptEnvelope {
    #[serde(rename = "SalesReceipt")]
    sales_receipt: QbDocument,
}

#[derive(Debug, Deserialize)]
struct QbCreditMemoEnvelope {
    #[serde(rename = "CreditMemo")]
    credit_memo: QbDocument,
}

#[derive(Debug, Deserialize)]
struct QbCompanyInfoEnvelope {
    #[serde(rename = "CompanyInfo")]
    company_info: QbCompanyInfo,
}

#[derive(Debug, Deserialize)]
struct QbCompanyInfo {
    #[serde(rename = "CompanyName")]
    company_name: String,
}

#[derive(Debug, Deserialize)]
struct QbAccountQueryEnvelope {
    #[serde(rename = "QueryResponse")]
    query_response: QbAccountQueryResponse,
}

#[derive(Debug, Deserialize, Default)]
struct QbAccountQueryResponse {
    #[serde(rename = "Account", default)]
    account: Vec<QbAccount>,
}

#[derive(Debug, Deserialize)]
struct QbAccount {
    #[serde(rename = "Id")]
    id: String,
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "AcctNum")]
    acct_num: Option<String>,
    #[serde(rename = "AccountType")]
    account_type: Option<String>,
}

/// QuickBooks Online API client
#[derive(Clone)]
pub struct QuickBooksClient {
    creds: ProviderCredentials,
    api_base: String,
    http_client: Client,
}

impl QuickBooksClient {
    pub fn new(creds: ProviderCredentials, sandbox: bool) -> Result<Self, ProviderError> {
        let http_client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| ProviderError::ConfigError(format!("failed to build HTTP client: {}", e)))?;

        let api_base = if sandbox {
            "https://sandbox-quickbooks.api.intuit.com".to_string()
        } else {
            "https://quickbooks.api.intuit.com".to_string()
        };

        Ok(QuickBooksClient {
            creds,
            api_base,
            http_client,
        })
    }

    /// Token endpoint call shared by code exchange and refresh
    async fn token_request(&self, params: &[(&str, &str)]) -> Result<TokenSet, ProviderError> {
        let response = self
            .http_client
            .post(TOKEN_ENDPOINT)
            .basic_auth(&self.creds.client_id, Some(&self.creds.client_secret))
            .header("Accept", "application/json")
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

        let tokens: QbTokenResponse = response
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
        path: &str,
    ) -> Result<T, ProviderError> {
        let url = format!("{}{}", self.api_base, path);
        let response = self
            .http_client
            .get(&url)
            .bearer_auth(access_token)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| ProviderError::HttpError(e.to_string()))?;

        Self::handle_response(response).await
    }

    async fn api_post<T: serde::de::DeserializeOwned, B: serde::Serialize>(
        &self,
        access_token: &str,
        path: &str,
        body: &B,
    ) -> Result<T, ProviderError> {
        let url = format!("{}{}", self.api_base, path);
        let response = self
            .http_client
            .post(&url)
            .bearer_auth(access_token)
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

    fn transaction_request(entry: &LedgerEntry) -> QbTransactionRequest {
        QbTransactionRequest {
            txn_date: entry.txn_date.format("%Y-%m-%d").to_string(),
            payment_ref_num: Some(entry.reference.clone()),
            line: vec![QbLine {
                amount: amount_major(entry.amount_minor),
                detail_type: "SalesItemLineDetail".to_string(),
                description: entry.description.clone(),
                sales_item_line_detail: QbSalesItemLineDetail {
                    item_ref: QbEntityRef {
                        value: entry.account_id.clone(),
                    },
                },
            }],
        }
    }
}

#[async_trait]
impl AccountingProvider for QuickBooksClient {
    fn provider(&self) -> Provider {
        Provider::Quickbooks
    }

    fn oauth_redirect_uri(&self) -> &str {
        &self.creds.redirect_uri
    }

    fn authorization_url(&self, state: &str, redirect_uri: &str) -> String {
        format!(
            "{}?client_id={}&response_type=code&scope={}&redirect_uri={}&state={}",
            AUTHORIZATION_ENDPOINT,
            urlencoding::encode(&self.creds.client_id),
            urlencoding::encode(SCOPE),
            urlencoding::encode(redirect_uri),
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
            .json(&serde_json::json!({ "token": token }))
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
        company_ref: Option<&str>,
    ) -> Result<CompanyInfo, ProviderError> {
        let realm_id = company_ref.ok_or(ProviderError::MissingCompanyRef)?;
        let path = format!("/v3/company/{}/companyinfo/{}", realm_id, realm_id);
        let envelope: QbCompanyInfoEnvelope = self.api_get(access_token, &path).await?;

        Ok(CompanyInfo {
            company_id: realm_id.to_string(),
            company_name: envelope.company_info.company_name,
        })
    }

    async fn fetch_chart_of_accounts(
        &self,
        access_token: &str,
        company_ref: &str,
    ) -> Result<Vec<LedgerAccount>, ProviderError> {
        let query = urlencoding::encode("select * from Account where AccountType = 'Income'");
        let path = format!("/v3/company/{}/query?query={}", company_ref, query);
        let envelope: QbAccountQueryEnvelope = self.api_get(access_token, &path).await?;

        Ok(envelope
            .query_response
            .account
            .into_iter()
            .map(|a| LedgerAccount {
                id: a.id,
                name: a.name,
                code: a.acct_num,
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
        let request = Self::transaction_request(entry);

        let document = if entry.category == RevenueCategory::Refund {
            let path = format!("/v3/company/{}/creditmemo", company_ref);
            let envelope: QbCreditMemoEnvelope =
                self.api_post(access_token, &path, &request).await?;
            envelope.credit_memo
        } else {
            let path = format!("/v3/company/{}/salesreceipt", company_ref);
            let envelope: QbSalesReceiptEnvelope =
                self.api_post(access_token, &path, &request).await?;
            envelope.sales_receipt
        };

        Ok(PostedEntry {
            external_id: document.id,
            doc_number: document.doc_number,
        })
    }
}
