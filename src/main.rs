use std::net::Ipv4Addr;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use clario::config::Config;
use clario::db::RestClient;
use clario::middleware::Cors;
use clario::{create_app, AppState};

#[tokio::main]
async fn main() {
    // Loaded before the subscriber so the file can set RUST_LOG.
    let env_file = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug")),
        )
        .init();

    match env_file {
        Ok(path) => info!(path = %path.display(), "Loaded environment file"),
        Err(err) if err.not_found() => {
            info!("No .env file found, using system environment variables")
        }
        Err(err) => warn!(%err, "Ignoring unreadable .env file"),
    }

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!(%err, "Invalid configuration");
            std::process::exit(1);
        }
    };

    let db = match RestClient::new(
        &config.supabase_url,
        &config.supabase_anon_key,
        &config.table,
    ) {
        Ok(db) => db,
        Err(err) => {
            error!(%err, "Failed to initialize database client");
            std::process::exit(1);
        }
    };
    info!(endpoint = %db.endpoint(), "Database client initialized");

    let state = AppState {
        db,
        cors: Cors::new(config.allowed_origin.clone()),
    };
    let app = create_app(state);
    let addr = (Ipv4Addr::UNSPECIFIED, config.port);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind listener");

    info!(origin = ?config.allowed_origin, "running on {addr:?}");

    axum::serve(listener, app).await.expect("failed serving");
}
