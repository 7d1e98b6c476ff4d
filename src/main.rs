use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;

use accounting_sync_rs::{
    config::Config,
    db::init_pool,
    providers::ProviderRegistry,
    routes::accounts::get_accounts,
    routes::callback::callback,
    routes::connect::connect,
    routes::health::health,
    routes::mappings::validate_mappings,
    routes::sync::{get_sync_status, run_manual_sync},
    state::AppState,
    vault::TokenVault,
};

#[tokio::main]
async fn main() {
    // Load environment variables from .env file (if present)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    tracing::info!("Starting accounting sync service...");

    let config = Config::from_env().expect("Failed to load configuration from environment");

    let vault = TokenVault::from_hex(&config.token_encryption_key)
        .expect("TOKEN_ENCRYPTION_KEY must be a 64-char hex string");

    tracing::info!("Connecting to database...");
    let pool = init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    tracing::info!("Running migrations...");
    sqlx::migrate!("./db/migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    let registry = ProviderRegistry::from_config(&config);

    let state = Arc::new(AppState {
        pool,
        vault,
        registry,
        settings_url: config.settings_url.clone(),
    });

    let app = Router::new()
        .route("/api/health", get(health))
        .route("/api/accounting/connect", post(connect))
        .route("/api/accounting/callback", get(callback))
        .route("/api/accounting/sync/manual", post(run_manual_sync))
        .route("/api/accounting/sync/status", get(get_sync_status))
        .route("/api/accounting/accounts", get(get_accounts))
        .route("/api/accounting/mappings/validate", get(validate_mappings))
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        );

    let addr = format!("{}:{}", config.host, config.port);
    tracing::info!("Accounting sync service listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind address");

    axum::serve(listener, app)
        .await
        .expect("Server failed to start");
}
