use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    middleware,
    response::IntoResponse,
    routing::{delete, get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use diecast_api::enrich::EnrichClient;
use diecast_api::middleware::require_auth;
use diecast_api::storage::ImageStore;
use diecast_api::{AppState, AppStateInner, auth, collection, feed};

/// Uploads are phone photos; 20 MB leaves generous headroom.
const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "diecast=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let jwt_secret =
        std::env::var("DIECAST_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into());
    if jwt_secret == "dev-secret-change-me" {
        warn!("DIECAST_JWT_SECRET is the development placeholder; set a real secret in production");
    }
    let db_path = std::env::var("DIECAST_DB_PATH").unwrap_or_else(|_| "diecast.db".into());
    let upload_dir: PathBuf = std::env::var("DIECAST_UPLOAD_DIR")
        .unwrap_or_else(|_| "./uploads".into())
        .into();
    let host = std::env::var("DIECAST_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("DIECAST_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;
    let enrich_url = std::env::var("DIECAST_ENRICH_API_URL").ok();
    let enrich_key = std::env::var("DIECAST_ENRICH_API_KEY").ok();

    // Init database, image storage, enrichment client
    let db = diecast_db::Database::open(&PathBuf::from(&db_path))?;
    let images = ImageStore::new(upload_dir).await?;
    let enrich = EnrichClient::new(enrich_url, enrich_key);
    if !enrich.is_configured() {
        info!("Enrichment lookup not configured; car info will return fallback text");
    }

    let state: AppState = Arc::new(AppStateInner {
        db,
        images,
        enrich,
        jwt_secret,
    });

    // Routes
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/feed", get(feed::list_feed))
        .route("/health", get(health))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/auth/account", delete(auth::delete_account))
        .route(
            "/collection",
            get(collection::list_collection).post(collection::upload_car),
        )
        .route(
            "/cars/{car_id}",
            get(collection::get_car).delete(collection::delete_car),
        )
        .route("/cars/{car_id}/info", get(collection::car_info))
        .route("/cars/{car_id}/share", post(feed::share_car))
        .route("/feed/{post_id}/like", post(feed::like_post))
        .route("/feed/{post_id}", delete(feed::delete_post))
        .route("/uploads/{name}", get(collection::serve_image))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state);

    let app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Diecast server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
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
