mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use concierge_api::AppStateInner;
use concierge_db::Database;
use concierge_gateway::handle_connection;
use concierge_messaging::{DiskAttachmentStore, Messaging, SqliteProfiles};

use crate::config::{Config, DEFAULT_LOG_FILTER};

#[derive(Clone)]
struct GatewayState {
    messaging: Messaging,
    jwt_secret: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {:#}", e);
            eprintln!("FATAL: {:#}", e);
            eprintln!("       Set it in your .env file and restart.");
            std::process::exit(1);
        }
    };

    let db = Arc::new(Database::open(&config.db_path)?);
    info!("Database: {}", config.db_path.display());
    let media = Arc::new(DiskAttachmentStore::new(config.media_dir.clone(), &config.public_url).await?);

    let messaging = Messaging::new(
        db.clone(),
        media.clone(),
        Arc::new(SqliteProfiles::new(db)),
        config.messaging.clone(),
    );
    info!("Directory mode: {:?}", config.messaging.directory_mode);

    let api_state = Arc::new(AppStateInner {
        messaging: messaging.clone(),
        media,
        jwt_secret: config.jwt_secret.clone(),
        max_upload_bytes: config.max_upload_bytes(),
    });

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(GatewayState {
            messaging,
            jwt_secret: config.jwt_secret.clone(),
        });

    let app = Router::new()
        .merge(concierge_api::router(api_state))
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Concierge server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn ws_upgrade(State(state): State<GatewayState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state.messaging, state.jwt_secret))
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
