//! Account mapping lookup: which external ledger account a revenue category
//! posts to, per tenant and provider.

use sqlx::{FromRow, PgPool};
use std::collections::HashMap;
use uuid::Uuid;

use crate::models::{Provider, RevenueCategory};

#[derive(Debug, Clone, FromRow)]
pub struct AccountMapping {
    pub id: Uuid,
    pub tenant_id: String,
    pub provider: Provider,
    pub category: RevenueCategory,
    pub external_account_id: String,
    pub external_account_name: String,
    pub external_account_code: Option<String>,
    pub is_active: bool,
}

/// Result of a pre-run mapping check
#[derive(Debug)]
pub struct MappingValidation {
    pub valid: bool,
    pub missing: Vec<RevenueCategory>,
}

const SELECT_COLUMNS: &str = r#"
    id, tenant_id, provider, category, external_account_id,
    external_account_name, external_account_code, is_active
"#;

pub async fn find_active(
    pool: &PgPool,
    tenant_id: &str,
    provider: Provider,
    category: RevenueCategory,
) -> Result<Option<AccountMapping>, sqlx::Error> {
    let sql = format!(
        r#"
        SELECT {}
        FROM accounting_account_mappings
        WHERE tenant_id = $1 AND provider = $2 AND category = $3 AND is_active = TRUE
        "#,
        SELECT_COLUMNS
    );

    sqlx::query_as::<_, AccountMapping>(&sql)
        .bind(tenant_id)
        .bind(provider)
        .bind(category)
        .fetch_optional(pool)
        .await
}

/// Load all active mappings for a provider, keyed by category.
///
/// The sync run resolves against this snapshot instead of querying per
/// payment.
pub async fn load_active(
    pool: &PgPool,
    tenant_id: &str,
    provider: Provider,
) -> Result<HashMap<RevenueCategory, AccountMapping>, sqlx::Error> {
    let sql = format!(
        r#"
        SELECT {}
        FROM accounting_account_mappings
        WHERE tenant_id = $1 AND provider = $2 AND is_active = TRUE
        "#,
        SELECT_COLUMNS
    );

    let rows = sqlx::query_as::<_, AccountMapping>(&sql)
        .bind(tenant_id)
        .bind(provider)
        .fetch_all(pool)
        .await?;

    Ok(rows.into_iter().map(|m| (m.category, m)).collect())
}

/// Fail fast before a bulk run when required categories are unmapped
pub async fn validate(
    pool: &PgPool,
    tenant_id: &str,
    provider: Provider,
    categories: &[RevenueCategory],
) -> Result<MappingValidation, sqlx::Error> {
    let active = load_active(pool, tenant_id, provider).await?;

    let missing: Vec<RevenueCategory> = categories
        .iter()
        .copied()
        .filter(|c| !active.contains_key(c))
        .collect();

    Ok(MappingValidation {
        valid: missing.is_empty(),
        missing,
    })
}
