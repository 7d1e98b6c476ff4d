pub mod integration_repo;
pub mod mapping_repo;
pub mod oauth_state_repo;
pub mod payment_repo;
pub mod run_lock_repo;
pub mod sync_log_repo;
pub mod synced_transaction_repo;
