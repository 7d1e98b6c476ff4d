//! The sync orchestrator.
//!
//! One run: verify the integration, take the per-(tenant, provider) run
//! lock, open a sync log, walk the unsynced backlog oldest-first, post each
//! payment independently, and finalize the log with aggregate counts. A
//! single payment's failure never aborts the batch; after the log row
//! exists, failures are data in the outcome rather than errors.

use serde::Serialize;
use serde_json::json;
use sqlx::PgPool;
use std::collections::HashMap;
use uuid::Uuid;

use crate::categorizer::categorize;
use crate::error::{SyncError, SyncResult};
use crate::models::{IntegrationStatus, Provider, RevenueCategory, SyncRunStatus, SyncType};
use crate::providers::{AccountingProvider, LedgerEntry, ProviderRegistry};
use crate::repos::integration_repo::Integration;
use crate::repos::payment_repo::PaymentRow;
use crate::repos::{
    integration_repo, mapping_repo, payment_repo, run_lock_repo, sync_log_repo,
    synced_transaction_repo,
};
use crate::repos::sync_log_repo::RunTotals;
use crate::repos::synced_transaction_repo::NewSyncedTransaction;
use crate::services::token_service;
use crate::vault::TokenVault;

/// Parameters for one sync run
#[derive(Debug)]
pub struct SyncRequest<'a> {
    pub tenant_id: &'a str,
    pub provider: Provider,
    pub limit: i64,
    pub sync_type: SyncType,
    pub triggered_by: Option<Uuid>,
}

/// Per-payment failure captured during a run
#[derive(Debug, Clone, Serialize)]
pub struct ItemError {
    pub payment_id: Uuid,
    pub error: String,
}

/// Aggregate result returned to the caller and recorded in the sync log
#[derive(Debug, Serialize)]
pub struct SyncOutcome {
    pub sync_log_id: Uuid,
    pub status: SyncRunStatus,
    pub attempted: i32,
    pub succeeded: i32,
    pub failed: i32,
    pub errors: Vec<ItemError>,
}

/// Terminal status from run counts
pub fn aggregate_status(attempted: i32, succeeded: i32, failed: i32) -> SyncRunStatus {
    if failed == 0 {
        // attempted == 0 is trivially complete
        SyncRunStatus::Completed
    } else if succeeded > 0 {
        SyncRunStatus::Partial
    } else {
        debug_assert!(attempted > 0);
        SyncRunStatus::Failed
    }
}

/// Run one sync for a tenant and provider.
///
/// Precondition failures (inactive integration, unconfigured provider, a
/// concurrent run) surface as errors before any side effect; everything
/// after log creation produces a structured outcome.
pub async fn run_sync(
    pool: &PgPool,
    vault: &TokenVault,
    registry: &ProviderRegistry,
    request: SyncRequest<'_>,
) -> SyncResult<SyncOutcome> {
    let integration = integration_repo::find(pool, request.tenant_id, request.provider)
        .await?
        .filter(|i| i.status == IntegrationStatus::Active)
        .ok_or_else(|| SyncError::IntegrationNotActive {
            tenant_id: request.tenant_id.to_string(),
            provider: request.provider,
        })?;

    let adapter = registry.get(request.provider).ok_or_else(|| {
        SyncError::Configuration(format!("provider {} is not configured", request.provider))
    })?;

    if !run_lock_repo::try_acquire(pool, request.tenant_id, request.provider).await? {
        return Err(SyncError::SyncAlreadyInProgress {
            tenant_id: request.tenant_id.to_string(),
            provider: request.provider,
        });
    }

    let result = execute_run(pool, vault, adapter.as_ref(), &integration, &request).await;

    if let Err(e) = run_lock_repo::release(pool, request.tenant_id, request.provider).await {
        tracing::error!(
            provider = %request.provider,
            tenant_id = %request.tenant_id,
            error = %e,
            "Failed to release sync run lock"
        );
    }

    result
}

/// Bookkeeping only; a failure here must not take down the batch
async fn record_attempt(pool: &PgPool, payment_id: Uuid) {
    if let Err(e) = payment_repo::touch_sync_attempt(pool, payment_id).await {
        tracing::warn!(
            payment_id = %payment_id,
            error = %e,
            "Failed to record sync attempt timestamp"
        );
    }
}

/// Give a run that cannot reach its batch loop a terminal log row.
/// Best-effort: the caller is already propagating a database error.
async fn abort_run(pool: &PgPool, integration: &Integration, sync_log_id: Uuid, message: &str) {
    let totals = RunTotals {
        status: SyncRunStatus::Failed,
        attempted: 0,
        succeeded: 0,
        failed: 0,
        error_message: Some(message.to_string()),
        error_details: None,
    };
    if let Err(e) = sync_log_repo::finalize(pool, sync_log_id, totals).await {
        tracing::error!(
            sync_log_id = %sync_log_id,
            error = %e,
            "Failed to finalize aborted sync run"
        );
    }
    if let Err(e) = integration_repo::record_sync_outcome(
        pool,
        integration.id,
        SyncRunStatus::Failed,
        Some(message),
    )
    .await
    {
        tracing::error!(
            sync_log_id = %sync_log_id,
            error = %e,
            "Failed to record aborted sync outcome"
        );
    }
}

/// What the batch loop does with each payment
enum RunMode {
    Post {
        access_token: String,
        company_ref: String,
    },
    /// Preflight failed (token refresh, broken integration); every payment
    /// in the batch is recorded as failed with this message
    FailAll(String),
}

async fn execute_run(
    pool: &PgPool,
    vault: &TokenVault,
    adapter: &dyn AccountingProvider,
    integration: &Integration,
    request: &SyncRequest<'_>,
) -> SyncResult<SyncOutcome> {
    let sync_log_id = sync_log_repo::create(
        pool,
        request.tenant_id,
        request.provider,
        request.sync_type,
        request.triggered_by,
    )
    .await?;
    if let Err(e) =
        run_lock_repo::attach_log(pool, request.tenant_id, request.provider, sync_log_id).await
    {
        tracing::warn!(
            sync_log_id = %sync_log_id,
            error = %e,
            "Failed to attach sync log to run lock"
        );
    }

    tracing::info!(
        provider = %request.provider,
        tenant_id = %request.tenant_id,
        sync_log_id = %sync_log_id,
        sync_type = ?request.sync_type,
        "Sync run started"
    );

    let payments = match payment_repo::find_unsynced(
        pool,
        request.tenant_id,
        request.provider,
        request.limit,
    )
    .await
    {
        Ok(payments) => payments,
        // The log row already exists; give it a terminal status before
        // propagating.
        Err(e) => {
            abort_run(
                pool,
                integration,
                sync_log_id,
                &format!("failed to query unsynced payments: {}", e),
            )
            .await;
            return Err(e.into());
        }
    };
    let attempted = payments.len() as i32;

    let mode = if payments.is_empty() {
        RunMode::FailAll(String::new()) // unused; loop body never runs
    } else {
        match token_service::ensure_access_token(pool, vault, adapter, integration).await {
            Ok(access_token) => match integration.external_company_id.clone() {
                Some(company_ref) => RunMode::Post {
                    access_token,
                    company_ref,
                },
                None => RunMode::FailAll(
                    "integration has no external company reference".to_string(),
                ),
            },
            Err(e) => RunMode::FailAll(e.to_string()),
        }
    };

    let (mode, mappings) =
        match mapping_repo::load_active(pool, request.tenant_id, request.provider).await {
            Ok(mappings) => (mode, mappings),
            Err(e) => (
                RunMode::FailAll(format!("failed to load account mappings: {}", e)),
                HashMap::new(),
            ),
        };

    let mut succeeded = 0i32;
    let mut failed = 0i32;
    let mut errors: Vec<ItemError> = Vec::new();
    let mut warnings: Vec<String> = Vec::new();

    for payment in &payments {
        match &mode {
            RunMode::FailAll(message) => {
                failed += 1;
                errors.push(ItemError {
                    payment_id: payment.id,
                    error: message.clone(),
                });
                record_attempt(pool, payment.id).await;
            }
            RunMode::Post {
                access_token,
                company_ref,
            } => {
                let item = match sync_one(
                    pool,
                    adapter,
                    request,
                    sync_log_id,
                    access_token,
                    company_ref,
                    &mappings,
                    payment,
                    &mut warnings,
                )
                .await
                {
                    Ok(item) => item,
                    // A database fault on one payment is that payment's
                    // failure, not the run's; the batch keeps going.
                    Err(e) => Err(e.to_string()),
                };
                match item {
                    Ok(()) => succeeded += 1,
                    Err(error) => {
                        failed += 1;
                        tracing::warn!(
                            provider = %request.provider,
                            payment_id = %payment.id,
                            error = %error,
                            "Payment failed to sync"
                        );
                        errors.push(ItemError {
                            payment_id: payment.id,
                            error,
                        });
                        record_attempt(pool, payment.id).await;
                    }
                }
            }
        }
    }

    let status = aggregate_status(attempted, succeeded, failed);
    let error_message = if failed > 0 {
        Some(format!("{} of {} payments failed to sync", failed, attempted))
    } else {
        None
    };
    let error_details = if errors.is_empty() && warnings.is_empty() {
        None
    } else {
        Some(json!({ "errors": errors, "warnings": warnings }))
    };

    sync_log_repo::finalize(
        pool,
        sync_log_id,
        RunTotals {
            status,
            attempted,
            succeeded,
            failed,
            error_message: error_message.clone(),
            error_details,
        },
    )
    .await?;

    integration_repo::record_sync_outcome(pool, integration.id, status, error_message.as_deref())
        .await?;

    tracing::info!(
        provider = %request.provider,
        tenant_id = %request.tenant_id,
        sync_log_id = %sync_log_id,
        status = ?status,
        attempted,
        succeeded,
        failed,
        "Sync run finished"
    );

    Ok(SyncOutcome {
        sync_log_id,
        status,
        attempted,
        succeeded,
        failed,
        errors,
    })
}

/// Post a single payment. The outer `Result` is a database fault, which the
/// caller records as this payment's failure; the inner one is the
/// per-payment outcome captured in the run.
#[allow(clippy::too_many_arguments)]
async fn sync_one(
    pool: &PgPool,
    adapter: &dyn AccountingProvider,
    request: &SyncRequest<'_>,
    sync_log_id: Uuid,
    access_token: &str,
    company_ref: &str,
    mappings: &HashMap<RevenueCategory, mapping_repo::AccountMapping>,
    payment: &PaymentRow,
    warnings: &mut Vec<String>,
) -> SyncResult<Result<(), String>> {
    let categorized = categorize(payment);
    if let Some(warning) = &categorized.fallback_warning {
        tracing::warn!(payment_id = %payment.id, "{}", warning);
        warnings.push(warning.clone());
    }

    // Defense in depth: the idempotency ledger is authoritative. A row
    // without the synced flag means a prior run's flag update was lost;
    // repair the flag instead of posting again.
    if synced_transaction_repo::exists(pool, payment.id, request.provider).await? {
        let mut tx = pool.begin().await?;
        payment_repo::mark_synced_tx(&mut tx, payment.id, request.provider).await?;
        tx.commit().await?;
        warnings.push(format!(
            "payment {} already present in idempotency ledger; synced flag repaired",
            payment.id
        ));
        return Ok(Ok(()));
    }

    let mapping = match mappings.get(&categorized.category) {
        Some(mapping) => mapping,
        None => {
            let error = SyncError::MappingMissing {
                provider: request.provider,
                missing: vec![categorized.category.to_string()],
            };
            return Ok(Err(error.to_string()));
        }
    };

    let entry = LedgerEntry {
        category: categorized.category,
        amount_minor: payment.amount_minor,
        currency: payment.currency.clone(),
        description: categorized.description,
        account_id: mapping.external_account_id.clone(),
        account_code: mapping.external_account_code.clone(),
        txn_date: payment.created_at.date_naive(),
        reference: payment.id.to_string(),
    };

    let posted = match adapter.post_ledger_entry(access_token, company_ref, &entry).await {
        Ok(posted) => posted,
        Err(e) => {
            let error = SyncError::PostingFailed {
                payment_id: payment.id,
                message: e.to_string(),
            };
            return Ok(Err(error.to_string()));
        }
    };

    // Record the ledger row and flip the flag atomically. If this fails the
    // entry exists remotely but not locally; the ledger check above repairs
    // the flag on the next run, and the unique constraint prevents a
    // double post.
    let mut tx = pool.begin().await?;
    synced_transaction_repo::insert_tx(
        &mut tx,
        NewSyncedTransaction {
            tenant_id: request.tenant_id,
            provider: request.provider,
            payment_id: payment.id,
            external_transaction_id: &posted.external_id,
            external_transaction_number: posted.doc_number.as_deref(),
            sync_log_id,
            synced_amount_minor: payment.amount_minor,
        },
    )
    .await?;
    payment_repo::mark_synced_tx(&mut tx, payment.id, request.provider).await?;
    tx.commit().await?;

    tracing::info!(
        provider = %request.provider,
        payment_id = %payment.id,
        external_id = %posted.external_id,
        "Payment posted to ledger"
    );

    Ok(Ok(()))
}
