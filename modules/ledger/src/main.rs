use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use franchise_ledger::{
    config::{Config, StoreType},
    db::{init_pool, run_migrations},
    repos::{account_repo::default_chart, InMemoryStore, PgStore, Repositories},
    router, AppState,
};

#[tokio::main]
async fn main() {
    // Load environment variables from .env file (if present)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    tracing::info!("Starting franchise ledger service...");

    let config = Config::from_env().expect("Failed to load configuration from environment");

    tracing::info!(
        "Configuration loaded: host={}, port={}, store={:?}",
        config.host,
        config.port,
        config.store_type
    );

    let repos = match config.store_type {
        StoreType::Memory => {
            let store = match &config.seed_centro_code {
                Some(centro) => {
                    tracing::info!(centro_code = %centro, "Seeding base chart of accounts");
                    InMemoryStore::with_accounts(default_chart(centro))
                }
                None => InMemoryStore::new(),
            };
            tracing::info!("Using in-memory store");
            Repositories::in_memory(Arc::new(store))
        }
        StoreType::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .expect("DATABASE_URL is required for the postgres store");

            tracing::info!("Connecting to database...");
            let pool = init_pool(url).await.expect("Failed to connect to database");

            tracing::info!("Running migrations...");
            run_migrations(&pool).await.expect("Failed to run migrations");

            Repositories::postgres(PgStore::new(pool))
        }
    };

    let app = router(AppState::new(repos, config.rules.clone()));

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .expect("HOST and PORT must form a valid socket address");
    tracing::info!("Franchise ledger listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind address");

    axum::serve(listener, app)
        .await
        .expect("Server failed to start");
}
