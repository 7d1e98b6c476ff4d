//! End-to-end sync run tests against a real Postgres, using a scripted
//! in-process ledger in place of the provider REST APIs.

mod common;

use async_trait::async_trait;
use serial_test::serial;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{Duration, Utc};

use accounting_sync_rs::error::SyncError;
use accounting_sync_rs::models::{Provider, RevenueCategory, SyncRunStatus, SyncType};
use accounting_sync_rs::providers::error::ProviderError;
use accounting_sync_rs::providers::{
    AccountingProvider, CompanyInfo, LedgerAccount, LedgerEntry, PostedEntry, ProviderRegistry,
    TokenSet,
};
use accounting_sync_rs::repos::{
    mapping_repo, oauth_state_repo, payment_repo, run_lock_repo, sync_log_repo,
    synced_transaction_repo,
};
use accounting_sync_rs::services::connection_service;
use accounting_sync_rs::services::sync_service::{self, SyncRequest};

use common::{
    count_sync_logs, get_test_pool, seed_active_integration, seed_mapping, seed_payment,
    test_vault, unique_tenant,
};

/// Makes `post_ledger_entry` for one payment insert a conflicting
/// idempotency-ledger row before returning, so the orchestrator's own
/// insert afterwards hits the unique constraint.
struct LedgerConflict {
    pool: sqlx::PgPool,
    tenant_id: String,
    reference: String,
}

/// Scripted ledger standing in for QuickBooks. Posts succeed unless the
/// entry's reference (the payment id) is in `fail_refs`.
struct FakeLedger {
    fail_refs: Mutex<HashSet<String>>,
    posted: AtomicUsize,
    refresh_fails: bool,
    refresh_unreachable: bool,
    conflict: Mutex<Option<LedgerConflict>>,
}

impl FakeLedger {
    fn new() -> Self {
        FakeLedger {
            fail_refs: Mutex::new(HashSet::new()),
            posted: AtomicUsize::new(0),
            refresh_fails: false,
            refresh_unreachable: false,
            conflict: Mutex::new(None),
        }
    }

    fn failing_refresh() -> Self {
        FakeLedger {
            refresh_fails: true,
            ..Self::new()
        }
    }

    fn unreachable_refresh() -> Self {
        FakeLedger {
            refresh_unreachable: true,
            ..Self::new()
        }
    }

    fn fail_payment(&self, payment_id: &uuid::Uuid) {
        self.fail_refs.lock().unwrap().insert(payment_id.to_string());
    }

    fn conflict_on(&self, pool: &sqlx::PgPool, tenant_id: &str, payment_id: &uuid::Uuid) {
        *self.conflict.lock().unwrap() = Some(LedgerConflict {
            pool: pool.clone(),
            tenant_id: tenant_id.to_string(),
            reference: payment_id.to_string(),
        });
    }

    fn posted_count(&self) -> usize {
        self.posted.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AccountingProvider for FakeLedger {
    fn provider(&self) -> Provider {
        Provider::Quickbooks
    }

    fn oauth_redirect_uri(&self) -> &str {
        "http://localhost:8094/api/accounting/callback"
    }

    fn authorization_url(&self, state: &str, redirect_uri: &str) -> String {
        format!(
            "http://fake-ledger.test/authorize?state={}&redirect_uri={}",
            state, redirect_uri
        )
    }

    async fn exchange_code(
        &self,
        _code: &str,
        _redirect_uri: &str,
    ) -> Result<TokenSet, ProviderError> {
        Ok(TokenSet {
            access_token: "exchanged-access".to_string(),
            refresh_token: "exchanged-refresh".to_string(),
            expires_at: Utc::now() + Duration::hours(1),
        })
    }

    async fn refresh_token(&self, _refresh_token: &str) -> Result<TokenSet, ProviderError> {
        if self.refresh_fails {
            return Err(ProviderError::ApiError {
                status_code: 400,
                body: "invalid_grant".to_string(),
            });
        }
        if self.refresh_unreachable {
            return Err(ProviderError::HttpError("connection refused".to_string()));
        }
        Ok(TokenSet {
            access_token: "refreshed-access".to_string(),
            refresh_token: "refreshed-refresh".to_string(),
            expires_at: Utc::now() + Duration::hours(1),
        })
    }

    async fn revoke_token(&self, _token: &str) -> Result<(), ProviderError> {
        Ok(())
    }

    async fn fetch_company_info(
        &self,
        _access_token: &str,
        company_ref: Option<&str>,
    ) -> Result<CompanyInfo, ProviderError> {
        Ok(CompanyInfo {
            company_id: company_ref.unwrap_or("realm-1").to_string(),
            company_name: "Fake Gym Co".to_string(),
        })
    }

    async fn fetch_chart_of_accounts(
        &self,
        _access_token: &str,
        _company_ref: &str,
    ) -> Result<Vec<LedgerAccount>, ProviderError> {
        Ok(vec![LedgerAccount {
            id: "acct-4000".to_string(),
            name: "Sales".to_string(),
            code: Some("4000".to_string()),
            account_type: Some("Income".to_string()),
        }])
    }

    async fn post_ledger_entry(
        &self,
        _access_token: &str,
        _company_ref: &str,
        entry: &LedgerEntry,
    ) -> Result<PostedEntry, ProviderError> {
        if self.fail_refs.lock().unwrap().contains(&entry.reference) {
            return Err(ProviderError::ApiError {
                status_code: 400,
                body: "simulated posting failure".to_string(),
            });
        }
        let conflict = self
            .conflict
            .lock()
            .unwrap()
            .as_ref()
            .filter(|c| c.reference == entry.reference)
            .map(|c| (c.pool.clone(), c.tenant_id.clone(), c.reference.clone()));
        if let Some((pool, tenant_id, reference)) = conflict {
            sqlx::query(
                r#"
                INSERT INTO accounting_synced_transactions
                    (tenant_id, provider, payment_id, external_transaction_id,
                     synced_amount_minor)
                VALUES ($1, 'quickbooks', $2, 'ext-conflict', $3)
                "#,
            )
            .bind(&tenant_id)
            .bind(reference.parse::<uuid::Uuid>().unwrap())
            .bind(entry.amount_minor)
            .execute(&pool)
            .await
            .unwrap();
        }
        let n = self.posted.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(PostedEntry {
            external_id: format!("ext-{}", n),
            doc_number: Some(format!("DOC-{}", n)),
        })
    }
}

fn registry_with(fake: Arc<FakeLedger>) -> ProviderRegistry {
    let mut registry = ProviderRegistry::default();
    registry.register(fake);
    registry
}

fn sync_request(tenant_id: &str) -> SyncRequest<'_> {
    SyncRequest {
        tenant_id,
        provider: Provider::Quickbooks,
        limit: 50,
        sync_type: SyncType::Manual,
        triggered_by: None,
    }
}

async fn seed_all_mappings(pool: &sqlx::PgPool, tenant_id: &str) {
    for (category, code) in [
        ("day_pass", "4000"),
        ("service_pt", "4010"),
        ("service_specialty_class", "4020"),
        ("service_sports_massage", "4030"),
        ("service_nutrition", "4040"),
        ("service_physio", "4050"),
        ("refund", "4900"),
    ] {
        seed_mapping(
            pool,
            tenant_id,
            Provider::Quickbooks,
            category,
            &format!("acct-{}", code),
            code,
        )
        .await;
    }
}

#[tokio::test]
#[serial]
#[ignore = "requires a provisioned Postgres via DATABASE_URL"]
async fn test_day_pass_payment_syncs_end_to_end() {
    let pool = get_test_pool().await;
    let vault = test_vault();
    let tenant = unique_tenant();
    let fake = Arc::new(FakeLedger::new());
    let registry = registry_with(fake.clone());

    seed_active_integration(&pool, &vault, &tenant, Provider::Quickbooks).await;
    seed_all_mappings(&pool, &tenant).await;
    let payment_id = seed_payment(&pool, &tenant, 1500, "succeeded", "day-pass", None).await;

    let outcome = sync_service::run_sync(&pool, &vault, &registry, sync_request(&tenant))
        .await
        .expect("run should produce an outcome");

    assert_eq!(outcome.status, SyncRunStatus::Completed);
    assert_eq!(outcome.attempted, 1);
    assert_eq!(outcome.succeeded, 1);
    assert_eq!(outcome.failed, 0);
    assert!(outcome.errors.is_empty());
    assert_eq!(fake.posted_count(), 1);

    assert!(payment_repo::is_synced(&pool, payment_id, Provider::Quickbooks)
        .await
        .unwrap());
    assert_eq!(
        synced_transaction_repo::count_for_tenant(&pool, &tenant, Provider::Quickbooks)
            .await
            .unwrap(),
        1
    );

    let log = sync_log_repo::find_by_id(&pool, outcome.sync_log_id)
        .await
        .unwrap()
        .expect("sync log row should exist");
    assert_eq!(log.status, SyncRunStatus::Completed);
    assert_eq!(log.payments_attempted, 1);
    assert_eq!(log.payments_succeeded, 1);
    assert_eq!(log.payments_failed, 0);
    assert!(log.completed_at.is_some());

    let txn = synced_transaction_repo::find_by_payment(&pool, payment_id, Provider::Quickbooks)
        .await
        .unwrap()
        .expect("idempotency ledger row should exist");
    assert_eq!(txn.external_transaction_id, "ext-1");
    assert_eq!(txn.synced_amount_minor, 1500);
    assert_eq!(txn.sync_log_id, Some(outcome.sync_log_id));
}

#[tokio::test]
#[serial]
#[ignore = "requires a provisioned Postgres via DATABASE_URL"]
async fn test_rerun_after_success_posts_nothing() {
    let pool = get_test_pool().await;
    let vault = test_vault();
    let tenant = unique_tenant();
    let fake = Arc::new(FakeLedger::new());
    let registry = registry_with(fake.clone());

    seed_active_integration(&pool, &vault, &tenant, Provider::Quickbooks).await;
    seed_all_mappings(&pool, &tenant).await;
    seed_payment(&pool, &tenant, 5000, "succeeded", "service-booking", Some("pt")).await;

    let first = sync_service::run_sync(&pool, &vault, &registry, sync_request(&tenant))
        .await
        .unwrap();
    assert_eq!(first.succeeded, 1);

    let second = sync_service::run_sync(&pool, &vault, &registry, sync_request(&tenant))
        .await
        .unwrap();

    // The flag excludes the payment from the second batch entirely
    assert_eq!(second.status, SyncRunStatus::Completed);
    assert_eq!(second.attempted, 0);
    assert_eq!(fake.posted_count(), 1);
    assert_eq!(
        synced_transaction_repo::count_for_tenant(&pool, &tenant, Provider::Quickbooks)
            .await
            .unwrap(),
        1
    );
}

#[tokio::test]
#[serial]
#[ignore = "requires a provisioned Postgres via DATABASE_URL"]
async fn test_one_failure_yields_partial_and_leaves_others_synced() {
    let pool = get_test_pool().await;
    let vault = test_vault();
    let tenant = unique_tenant();
    let fake = Arc::new(FakeLedger::new());
    let registry = registry_with(fake.clone());

    seed_active_integration(&pool, &vault, &tenant, Provider::Quickbooks).await;
    seed_all_mappings(&pool, &tenant).await;

    let ok_a = seed_payment(&pool, &tenant, 5000, "succeeded", "service-booking", Some("pt")).await;
    let bad = seed_payment(&pool, &tenant, 8000, "succeeded", "service-booking", Some("physio")).await;
    let ok_b = seed_payment(&pool, &tenant, 1500, "succeeded", "day-pass", None).await;
    fake.fail_payment(&bad);

    let outcome = sync_service::run_sync(&pool, &vault, &registry, sync_request(&tenant))
        .await
        .unwrap();

    assert_eq!(outcome.status, SyncRunStatus::Partial);
    assert_eq!(outcome.attempted, 3);
    assert_eq!(outcome.succeeded, 2);
    assert_eq!(outcome.failed, 1);
    assert_eq!(outcome.errors.len(), 1);
    assert_eq!(outcome.errors[0].payment_id, bad);
    assert!(outcome.errors[0].error.contains("simulated posting failure"));

    assert!(payment_repo::is_synced(&pool, ok_a, Provider::Quickbooks).await.unwrap());
    assert!(payment_repo::is_synced(&pool, ok_b, Provider::Quickbooks).await.unwrap());
    assert!(!payment_repo::is_synced(&pool, bad, Provider::Quickbooks).await.unwrap());

    let log = sync_log_repo::find_by_id(&pool, outcome.sync_log_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(log.status, SyncRunStatus::Partial);
    assert_eq!(
        log.error_message.as_deref(),
        Some("1 of 3 payments failed to sync")
    );
    assert!(log.error_details.is_some());
}

#[tokio::test]
#[serial]
#[ignore = "requires a provisioned Postgres via DATABASE_URL"]
async fn test_every_payment_failing_yields_failed_run() {
    let pool = get_test_pool().await;
    let vault = test_vault();
    let tenant = unique_tenant();
    let fake = Arc::new(FakeLedger::new());
    let registry = registry_with(fake.clone());

    seed_active_integration(&pool, &vault, &tenant, Provider::Quickbooks).await;
    seed_all_mappings(&pool, &tenant).await;

    let a = seed_payment(&pool, &tenant, 5000, "succeeded", "service-booking", Some("pt")).await;
    let b = seed_payment(&pool, &tenant, 1500, "succeeded", "day-pass", None).await;
    fake.fail_payment(&a);
    fake.fail_payment(&b);

    let outcome = sync_service::run_sync(&pool, &vault, &registry, sync_request(&tenant))
        .await
        .unwrap();

    assert_eq!(outcome.status, SyncRunStatus::Failed);
    assert_eq!(outcome.attempted, 2);
    assert_eq!(outcome.succeeded, 0);
    assert_eq!(outcome.failed, 2);
    assert_eq!(fake.posted_count(), 0);
}

#[tokio::test]
#[serial]
#[ignore = "requires a provisioned Postgres via DATABASE_URL"]
async fn test_missing_mapping_records_failure_without_posting() {
    let pool = get_test_pool().await;
    let vault = test_vault();
    let tenant = unique_tenant();
    let fake = Arc::new(FakeLedger::new());
    let registry = registry_with(fake.clone());

    seed_active_integration(&pool, &vault, &tenant, Provider::Quickbooks).await;
    // No mapping for day_pass
    seed_mapping(&pool, &tenant, Provider::Quickbooks, "service_pt", "acct-4010", "4010").await;
    let payment_id = seed_payment(&pool, &tenant, 1500, "succeeded", "day-pass", None).await;

    let outcome = sync_service::run_sync(&pool, &vault, &registry, sync_request(&tenant))
        .await
        .unwrap();

    assert_eq!(outcome.status, SyncRunStatus::Failed);
    assert_eq!(outcome.failed, 1);
    assert!(outcome.errors[0].error.contains("mapping"));
    assert_eq!(fake.posted_count(), 0);
    assert!(!payment_repo::is_synced(&pool, payment_id, Provider::Quickbooks)
        .await
        .unwrap());
    assert_eq!(
        synced_transaction_repo::count_for_tenant(&pool, &tenant, Provider::Quickbooks)
            .await
            .unwrap(),
        0
    );
}

#[tokio::test]
#[serial]
#[ignore = "requires a provisioned Postgres via DATABASE_URL"]
async fn test_refund_posts_against_refund_mapping() {
    let pool = get_test_pool().await;
    let vault = test_vault();
    let tenant = unique_tenant();
    let fake = Arc::new(FakeLedger::new());
    let registry = registry_with(fake.clone());

    seed_active_integration(&pool, &vault, &tenant, Provider::Quickbooks).await;
    seed_all_mappings(&pool, &tenant).await;
    let payment_id = seed_payment(&pool, &tenant, 5000, "refunded", "service-booking", Some("pt")).await;

    let outcome = sync_service::run_sync(&pool, &vault, &registry, sync_request(&tenant))
        .await
        .unwrap();

    assert_eq!(outcome.status, SyncRunStatus::Completed);
    assert_eq!(outcome.succeeded, 1);
    assert!(payment_repo::is_synced(&pool, payment_id, Provider::Quickbooks)
        .await
        .unwrap());
}

#[tokio::test]
#[serial]
#[ignore = "requires a provisioned Postgres via DATABASE_URL"]
async fn test_missing_integration_is_rejected_before_any_side_effect() {
    let pool = get_test_pool().await;
    let vault = test_vault();
    let tenant = unique_tenant();
    let registry = registry_with(Arc::new(FakeLedger::new()));

    let result = sync_service::run_sync(&pool, &vault, &registry, sync_request(&tenant)).await;

    assert!(matches!(result, Err(SyncError::IntegrationNotActive { .. })));
    assert_eq!(count_sync_logs(&pool, &tenant).await, 0);
}

#[tokio::test]
#[serial]
#[ignore = "requires a provisioned Postgres via DATABASE_URL"]
async fn test_held_run_lock_rejects_concurrent_sync() {
    let pool = get_test_pool().await;
    let vault = test_vault();
    let tenant = unique_tenant();
    let registry = registry_with(Arc::new(FakeLedger::new()));

    seed_active_integration(&pool, &vault, &tenant, Provider::Quickbooks).await;

    assert!(run_lock_repo::try_acquire(&pool, &tenant, Provider::Quickbooks)
        .await
        .unwrap());

    let result = sync_service::run_sync(&pool, &vault, &registry, sync_request(&tenant)).await;
    assert!(matches!(result, Err(SyncError::SyncAlreadyInProgress { .. })));
    assert_eq!(count_sync_logs(&pool, &tenant).await, 0);

    run_lock_repo::release(&pool, &tenant, Provider::Quickbooks)
        .await
        .unwrap();

    // Released lock lets the next run proceed (empty backlog, completed)
    let outcome = sync_service::run_sync(&pool, &vault, &registry, sync_request(&tenant))
        .await
        .unwrap();
    assert_eq!(outcome.status, SyncRunStatus::Completed);
    assert_eq!(outcome.attempted, 0);
}

#[tokio::test]
#[serial]
#[ignore = "requires a provisioned Postgres via DATABASE_URL"]
async fn test_refresh_failure_fails_batch_and_expires_integration() {
    let pool = get_test_pool().await;
    let vault = test_vault();
    let tenant = unique_tenant();
    let fake = Arc::new(FakeLedger::failing_refresh());
    let registry = registry_with(fake.clone());

    let integration_id =
        seed_active_integration(&pool, &vault, &tenant, Provider::Quickbooks).await;
    // Force the token past the refresh margin
    sqlx::query("UPDATE accounting_integrations SET token_expires_at = $1 WHERE id = $2")
        .bind(Utc::now() - Duration::hours(1))
        .bind(integration_id)
        .execute(&pool)
        .await
        .unwrap();

    seed_all_mappings(&pool, &tenant).await;
    let a = seed_payment(&pool, &tenant, 5000, "succeeded", "service-booking", Some("pt")).await;
    let b = seed_payment(&pool, &tenant, 1500, "succeeded", "day-pass", None).await;

    let outcome = sync_service::run_sync(&pool, &vault, &registry, sync_request(&tenant))
        .await
        .unwrap();

    // The run still yields a structured outcome; nothing reaches the ledger
    assert_eq!(outcome.status, SyncRunStatus::Failed);
    assert_eq!(outcome.attempted, 2);
    assert_eq!(outcome.failed, 2);
    assert_eq!(fake.posted_count(), 0);
    assert!(!payment_repo::is_synced(&pool, a, Provider::Quickbooks).await.unwrap());
    assert!(!payment_repo::is_synced(&pool, b, Provider::Quickbooks).await.unwrap());

    let status: String =
        sqlx::query_scalar("SELECT status::text FROM accounting_integrations WHERE id = $1")
            .bind(integration_id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(status, "expired");
}

#[tokio::test]
#[serial]
#[ignore = "requires a provisioned Postgres via DATABASE_URL"]
async fn test_database_conflict_on_one_payment_does_not_abort_batch() {
    let pool = get_test_pool().await;
    let vault = test_vault();
    let tenant = unique_tenant();
    let fake = Arc::new(FakeLedger::new());
    let registry = registry_with(fake.clone());

    seed_active_integration(&pool, &vault, &tenant, Provider::Quickbooks).await;
    seed_all_mappings(&pool, &tenant).await;

    // Older payment hits a unique-constraint violation on its ledger
    // insert; the younger one must still sync and the run must finalize.
    let clashing = seed_payment(&pool, &tenant, 8000, "succeeded", "service-booking", Some("pt")).await;
    let healthy = seed_payment(&pool, &tenant, 1500, "succeeded", "day-pass", None).await;
    fake.conflict_on(&pool, &tenant, &clashing);

    let outcome = sync_service::run_sync(&pool, &vault, &registry, sync_request(&tenant))
        .await
        .unwrap();

    assert_eq!(outcome.status, SyncRunStatus::Partial);
    assert_eq!(outcome.attempted, 2);
    assert_eq!(outcome.succeeded, 1);
    assert_eq!(outcome.failed, 1);
    assert_eq!(outcome.errors.len(), 1);
    assert_eq!(outcome.errors[0].payment_id, clashing);

    assert!(payment_repo::is_synced(&pool, healthy, Provider::Quickbooks).await.unwrap());
    assert!(!payment_repo::is_synced(&pool, clashing, Provider::Quickbooks).await.unwrap());

    // The log row must reach a terminal status, not stay in progress
    let log = sync_log_repo::find_by_id(&pool, outcome.sync_log_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(log.status, SyncRunStatus::Partial);
    assert!(log.completed_at.is_some());

    // The next run finds the ledger row and repairs the flag without
    // posting again
    let posted_before = fake.posted_count();
    let repair = sync_service::run_sync(&pool, &vault, &registry, sync_request(&tenant))
        .await
        .unwrap();
    assert_eq!(repair.status, SyncRunStatus::Completed);
    assert_eq!(repair.attempted, 1);
    assert_eq!(repair.succeeded, 1);
    assert_eq!(fake.posted_count(), posted_before);
    assert!(payment_repo::is_synced(&pool, clashing, Provider::Quickbooks).await.unwrap());
}

#[tokio::test]
#[serial]
#[ignore = "requires a provisioned Postgres via DATABASE_URL"]
async fn test_unreachable_refresh_marks_integration_error_not_expired() {
    let pool = get_test_pool().await;
    let vault = test_vault();
    let tenant = unique_tenant();
    let fake = Arc::new(FakeLedger::unreachable_refresh());
    let registry = registry_with(fake.clone());

    let integration_id =
        seed_active_integration(&pool, &vault, &tenant, Provider::Quickbooks).await;
    sqlx::query("UPDATE accounting_integrations SET token_expires_at = $1 WHERE id = $2")
        .bind(Utc::now() - Duration::hours(1))
        .bind(integration_id)
        .execute(&pool)
        .await
        .unwrap();

    seed_all_mappings(&pool, &tenant).await;
    seed_payment(&pool, &tenant, 1500, "succeeded", "day-pass", None).await;

    let outcome = sync_service::run_sync(&pool, &vault, &registry, sync_request(&tenant))
        .await
        .unwrap();

    assert_eq!(outcome.status, SyncRunStatus::Failed);
    assert_eq!(fake.posted_count(), 0);

    // A network fault is not a rejected grant; the tenant does not need
    // to re-authorize
    let status: String =
        sqlx::query_scalar("SELECT status::text FROM accounting_integrations WHERE id = $1")
            .bind(integration_id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(status, "error");
}

#[tokio::test]
#[serial]
#[ignore = "requires a provisioned Postgres via DATABASE_URL"]
async fn test_oauth_state_is_single_use() {
    let pool = get_test_pool().await;
    let vault = test_vault();
    let tenant = unique_tenant();
    let registry = registry_with(Arc::new(FakeLedger::new()));

    // A stale, never-redeemed state gets swept when a new flow starts
    let stale = format!("stale-{}", uuid::Uuid::new_v4());
    oauth_state_repo::insert(
        &pool,
        &stale,
        &tenant,
        Provider::Quickbooks,
        "http://app.test/settings",
        None,
        Utc::now() - Duration::minutes(1),
    )
    .await
    .unwrap();

    let initiation = connection_service::initiate_connect(
        &pool,
        &registry,
        &tenant,
        Provider::Quickbooks,
        "http://app.test/settings",
        None,
    )
    .await
    .unwrap();
    assert!(initiation.authorization_url.contains(&initiation.state));
    assert!(oauth_state_repo::consume(&pool, &stale)
        .await
        .unwrap()
        .is_none());

    let outcome = connection_service::handle_callback(
        &pool,
        &vault,
        &registry,
        "auth-code",
        &initiation.state,
        Some("realm-42"),
    )
    .await
    .unwrap();
    assert_eq!(outcome.tenant_id, tenant);
    assert_eq!(outcome.company_name, "Fake Gym Co");
    assert_eq!(outcome.redirect_url, "http://app.test/settings");

    // Replaying the same state must be rejected
    let replay = connection_service::handle_callback(
        &pool,
        &vault,
        &registry,
        "auth-code",
        &initiation.state,
        Some("realm-42"),
    )
    .await;
    assert!(matches!(replay, Err(SyncError::InvalidState)));
}

#[tokio::test]
#[serial]
#[ignore = "requires a provisioned Postgres via DATABASE_URL"]
async fn test_disconnect_clears_tokens_but_keeps_history() {
    let pool = get_test_pool().await;
    let vault = test_vault();
    let tenant = unique_tenant();
    let registry = registry_with(Arc::new(FakeLedger::new()));

    let integration_id =
        seed_active_integration(&pool, &vault, &tenant, Provider::Quickbooks).await;

    connection_service::disconnect(&pool, &vault, &registry, &tenant, Provider::Quickbooks)
        .await
        .unwrap();

    let (status, access, refresh): (String, Option<String>, Option<String>) = sqlx::query_as(
        r#"
        SELECT status::text, access_token_enc, refresh_token_enc
        FROM accounting_integrations WHERE id = $1
        "#,
    )
    .bind(integration_id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(status, "disconnected");
    assert!(access.is_none());
    assert!(refresh.is_none());
}

#[tokio::test]
#[serial]
#[ignore = "requires a provisioned Postgres via DATABASE_URL"]
async fn test_mapping_validation_itemizes_missing_categories() {
    let pool = get_test_pool().await;
    let tenant = unique_tenant();

    seed_mapping(&pool, &tenant, Provider::Quickbooks, "day_pass", "acct-4000", "4000").await;
    seed_mapping(&pool, &tenant, Provider::Quickbooks, "refund", "acct-4900", "4900").await;

    let validation =
        mapping_repo::validate(&pool, &tenant, Provider::Quickbooks, &RevenueCategory::all())
            .await
            .unwrap();

    assert!(!validation.valid);
    assert_eq!(validation.missing.len(), 5);
    assert!(validation.missing.contains(&RevenueCategory::ServicePt));
    assert!(!validation.missing.contains(&RevenueCategory::DayPass));

    let day_pass =
        mapping_repo::find_active(&pool, &tenant, Provider::Quickbooks, RevenueCategory::DayPass)
            .await
            .unwrap()
            .expect("day_pass mapping should resolve");
    assert_eq!(day_pass.external_account_id, "acct-4000");
    assert!(
        mapping_repo::find_active(&pool, &tenant, Provider::Quickbooks, RevenueCategory::ServicePt)
            .await
            .unwrap()
            .is_none()
    );

    seed_service_mappings(&pool, &tenant).await;
    let validation =
        mapping_repo::validate(&pool, &tenant, Provider::Quickbooks, &RevenueCategory::all())
            .await
            .unwrap();
    assert!(validation.valid);
    assert!(validation.missing.is_empty());
}

/// The five service-category mappings
async fn seed_service_mappings(pool: &sqlx::PgPool, tenant_id: &str) {
    for (category, code) in [
        ("service_pt", "4010"),
        ("service_specialty_class", "4020"),
        ("service_sports_massage", "4030"),
        ("service_nutrition", "4040"),
        ("service_physio", "4050"),
    ] {
        seed_mapping(
            pool,
            tenant_id,
            Provider::Quickbooks,
            category,
            &format!("acct-{}", code),
            code,
        )
        .await;
    }
}
