use std::path::PathBuf;

use ledgerdesk_runtime_config::CONFIG_FILE_NAME;
use ledgerdesk_server::cache::TotalsCache;
use ledgerdesk_server::routes::auth::bootstrap_admin;
use ledgerdesk_server::{AppState, build_router, load_config, storage};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ledgerdesk_server=info,tower_http=info".into()),
        )
        .init();

    let config_path = std::env::var("LEDGERDESK_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(CONFIG_FILE_NAME));
    let config = load_config(&config_path, |key| std::env::var(key).ok())?;

    let data_dir = PathBuf::from(&config.server.data_dir);
    tracing::info!("data directory: {}", data_dir.display());

    // Initialize database
    let db = storage::init_db(&data_dir)?;
    tracing::info!("database initialized");

    match std::env::var("LEDGERDESK_BOOTSTRAP_KEY") {
        Ok(key) if !key.trim().is_empty() => {
            if bootstrap_admin(&db, key.trim())? {
                tracing::info!("bootstrap admin created");
            }
        }
        _ => {}
    }

    if !config.plaid.is_configured() {
        tracing::warn!("Plaid credentials not set; bank linking is disabled");
    }

    let cache = TotalsCache::connect(&config.cache).await;
    let port = config.server.port;
    let state = AppState::new(db, config, cache)?;
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
    tracing::info!("listening on 0.0.0.0:{port}");
    axum::serve(listener, app).await?;

    Ok(())
}
