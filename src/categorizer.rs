//! Payment categorization: maps a raw payment record to a revenue category
//! and human-readable description.
//!
//! This function is total. Unrecognized shapes degrade to a documented
//! fallback category with a warning instead of failing, so one malformed
//! record never blocks the rest of a batch.

use crate::models::RevenueCategory;
use crate::repos::payment_repo::PaymentRow;

/// A payment with its resolved revenue bucket. Ephemeral, recomputed per run.
#[derive(Debug, Clone)]
pub struct CategorizedPayment {
    pub category: RevenueCategory,
    pub description: String,
    /// Set when a fallback rule fired; surfaced in the sync log
    pub fallback_warning: Option<String>,
}

/// Categorize a payment. First match wins:
/// refunded status, then day-pass, then service-booking dispatch on
/// service_type, then the day-pass fallback for anything else.
pub fn categorize(payment: &PaymentRow) -> CategorizedPayment {
    if payment.status == "refunded" {
        return CategorizedPayment {
            category: RevenueCategory::Refund,
            description: format!("Refund - {}", base_description(payment)),
            fallback_warning: None,
        };
    }

    match payment.payment_type.as_str() {
        "day-pass" => CategorizedPayment {
            category: RevenueCategory::DayPass,
            description: "Day pass".to_string(),
            fallback_warning: None,
        },
        "service-booking" => categorize_service(payment),
        other => CategorizedPayment {
            category: RevenueCategory::DayPass,
            description: base_description(payment),
            fallback_warning: Some(format!(
                "unknown payment_type '{}' for payment {}; falling back to day_pass",
                other, payment.id
            )),
        },
    }
}

fn categorize_service(payment: &PaymentRow) -> CategorizedPayment {
    let (category, description) = match payment.service_type.as_deref() {
        Some("pt") => (RevenueCategory::ServicePt, "Personal training session"),
        Some("specialty_class") => (RevenueCategory::ServiceSpecialtyClass, "Specialty class"),
        Some("sports_massage") => (RevenueCategory::ServiceSportsMassage, "Sports massage"),
        Some("nutrition") => (RevenueCategory::ServiceNutrition, "Nutrition consultation"),
        Some("physio") => (RevenueCategory::ServicePhysio, "Physiotherapy session"),
        other => {
            // Documented fallback: unknown service bookings book as PT
            // revenue. Likely misattribution, so it is always flagged.
            return CategorizedPayment {
                category: RevenueCategory::ServicePt,
                description: "Service booking".to_string(),
                fallback_warning: Some(format!(
                    "unknown service_type {:?} for payment {}; falling back to service_pt",
                    other, payment.id
                )),
            };
        }
    };

    CategorizedPayment {
        category,
        description: description.to_string(),
        fallback_warning: None,
    }
}

fn base_description(payment: &PaymentRow) -> String {
    payment
        .description
        .clone()
        .unwrap_or_else(|| format!("{} payment", payment.payment_type))
}
