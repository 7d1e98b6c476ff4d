use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supported accounting providers, matching the database accounting_provider enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "accounting_provider", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Quickbooks,
    Xero,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Quickbooks => "quickbooks",
            Provider::Xero => "xero",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "quickbooks" => Ok(Provider::Quickbooks),
            "xero" => Ok(Provider::Xero),
            other => Err(format!("unknown provider: {}", other)),
        }
    }
}

/// Integration lifecycle status, matching the database integration_status enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "integration_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum IntegrationStatus {
    Active,
    Disconnected,
    Error,
    Expired,
}

/// How a sync run was triggered, matching the database sync_type enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "sync_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SyncType {
    Manual,
    Automatic,
    Retry,
}

/// Terminal and in-flight states of a sync run, matching sync_run_status
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "sync_run_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SyncRunStatus {
    InProgress,
    Completed,
    Partial,
    Failed,
}

/// Semantic revenue bucket routing a payment to an external ledger account,
/// matching the database revenue_category enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "revenue_category", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RevenueCategory {
    DayPass,
    ServicePt,
    ServiceSpecialtyClass,
    ServiceSportsMassage,
    ServiceNutrition,
    ServicePhysio,
    Refund,
}

impl RevenueCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            RevenueCategory::DayPass => "day_pass",
            RevenueCategory::ServicePt => "service_pt",
            RevenueCategory::ServiceSpecialtyClass => "service_specialty_class",
            RevenueCategory::ServiceSportsMassage => "service_sports_massage",
            RevenueCategory::ServiceNutrition => "service_nutrition",
            RevenueCategory::ServicePhysio => "service_physio",
            RevenueCategory::Refund => "refund",
        }
    }

    /// All categories, in a stable order (used for mapping validation)
    pub fn all() -> [RevenueCategory; 7] {
        [
            RevenueCategory::DayPass,
            RevenueCategory::ServicePt,
            RevenueCategory::ServiceSpecialtyClass,
            RevenueCategory::ServiceSportsMassage,
            RevenueCategory::ServiceNutrition,
            RevenueCategory::ServicePhysio,
            RevenueCategory::Refund,
        ]
    }
}

impl fmt::Display for RevenueCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
