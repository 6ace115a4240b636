mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use moodboard_api::{AppState, AppStateInner};
use moodboard_auth::{IdentityStore, LocalIdentity};
use moodboard_core::MoodBoard;
use moodboard_db::{BlobStore, DiskBlobStore, DocumentStore, SqliteStore};

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "moodboard=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    // Collaborators
    let store: Arc<dyn DocumentStore> = Arc::new(SqliteStore::open(&config.db_path)?);
    let disk = DiskBlobStore::new(
        config.blob_dir.clone(),
        format!("{}/blobs", config.public_url),
    )
    .await?;
    let blobs: Arc<dyn BlobStore> = Arc::new(disk);
    let identity: Arc<dyn IdentityStore> = Arc::new(
        LocalIdentity::new(store.clone(), config.jwt_secret.clone())
            .with_token_ttl(config.token_ttl),
    );
    info!("Database: {}", config.db_path.display());

    let state: AppState = Arc::new(AppStateInner {
        board: MoodBoard::new(store, blobs, identity),
        notification_poll: config.notification_poll,
    });

    let app = Router::new()
        .merge(moodboard_api::router(state))
        .nest_service("/blobs", ServeDir::new(&config.blob_dir))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("MoodBoard server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => tokio::select! {
                _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
            },
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
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
