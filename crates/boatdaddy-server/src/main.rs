use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{info, warn};

use boatdaddy_api::auth::AppStateInner;
use boatdaddy_api::config::Config;
use boatdaddy_api::router::{GRAPHQL_PATH, router};
use boatdaddy_db::Database;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "boatdaddy=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;
    info!("Starting in {:?} mode", config.environment);
    if config.cloudinary.api_secret.is_none() {
        warn!("CLOUDINARY_SECRET is unset; createImageSignature will fail");
    }
    if config.google_client_id.is_none() {
        warn!("GOOGLE_CLIENT_ID is unset; GOOGLE login will fail");
    }

    let db = Arc::new(Database::open(&config.db_path)?);
    if config.seed_on_start {
        let outcome = db.seed()?;
        info!("Startup seed removed {} users", outcome.deleted);
    }

    let addr: SocketAddr = config.bind_addr().parse()?;
    let api_url = config.api_url.clone();
    let state = AppStateInner::new(db, config)?;
    let app = router(state);

    info!("Boat Daddy API listening on {}{} (public URL {})", addr, GRAPHQL_PATH, api_url);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                warn!("Could not install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
