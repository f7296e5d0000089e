use crm_relay_provider::ProviderRegistry;
use crm_relay_sync::{RetryScheduler, SyncDispatcher};
use crm_relay_syncd::config::SyncdConfig;
use crm_relay_syncd::db::{IntegrationRepository, SyncAttemptRepository};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment
    let config = SyncdConfig::from_env().expect("failed to load configuration");
    let encryption_key = config
        .encryption_key()
        .expect("invalid ENCRYPTION_KEY, expected 64 hex characters");
    tracing::info!("Loaded configuration");

    // Create database connection pool
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
        .expect("failed to connect to database");

    // Run migrations
    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await
        .expect("failed to run migrations");

    let providers = Arc::new(ProviderRegistry::with_builtin());
    tracing::info!(
        providers = ?providers.registered_types(),
        "Provider adapters registered"
    );

    let attempts = Arc::new(SyncAttemptRepository::new(db_pool.clone()));
    let integrations = IntegrationRepository::new(db_pool.clone());

    let dispatcher = SyncDispatcher::new(
        providers,
        Arc::clone(&attempts) as Arc<dyn crm_relay_sync::AttemptStore>,
        Arc::new(integrations),
        encryption_key,
        config.backoff_policy(),
        config.dispatch_config(),
    );

    let scheduler = RetryScheduler::new(attempts, dispatcher, config.scheduler_config());
    let handle = scheduler.start();
    tracing::info!("Sync daemon running");

    tokio::signal::ctrl_c()
        .await
        .expect("failed to listen for shutdown signal");
    tracing::info!("Shutdown signal received");
    handle.shutdown().await;
    tracing::info!("Sync daemon stopped");
}
