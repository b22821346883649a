use std::sync::Arc;

use anyhow::Context;
use axum::extract::DefaultBodyLimit;
use axum::middleware::{from_fn, from_fn_with_state};
use axum::Router;
use sqlx::PgPool;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use utoipa::OpenApi;
use utoipa_rapidoc::RapiDoc;
use utoipa_swagger_ui::SwaggerUi;

mod api;
mod app_state;
mod config;
mod db;
mod middleware;
mod utils;

use crate::app_state::AppState;
use crate::config::Config;
use crate::db::queries::booking::BookingDoc;
use crate::db::queries::property::PropertyDoc;
use crate::db::queries::rating::RatingDoc;
use crate::db::queries::user::UserDoc;
use crate::db::store::bookings::BookingStore;
use crate::middleware::auth::{create_profile_cache, jwt_middleware, profile_middleware};
use crate::middleware::request_logger::log_requests;
use crate::utils::analysis::PropertyAnalyzer;
use crate::utils::feed::PropertyFeed;
use crate::utils::pinning::PinningClient;

/// Console plus a daily rolling file; the guard must live as long as `main`.
fn init_tracing(config: &Config) -> anyhow::Result<WorkerGuard> {
    std::fs::create_dir_all(&config.log_dir)
        .with_context(|| format!("Failed to create {}", config.log_dir.display()))?;

    let file_appender = tracing_appender::rolling::daily(&config.log_dir, "app.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,tower_http=info,sqlx=warn")
        }))
        .with(fmt::layer().with_target(true))
        .with(fmt::layer().with_ansi(false).with_writer(non_blocking))
        .init();

    Ok(guard)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::init()?;
    let _log_guard = init_tracing(&config)?;

    let pool = db::pool::get_db_pool(&config)
        .await
        .context("Failed to connect to the database")?;

    let bookings = BookingStore::open(&config.booking_log_path, &config.rating_log_path)
        .await
        .context("Failed to open booking store")?;

    let analyzer = PropertyAnalyzer::new(
        config.llm_api_url.clone(),
        config.llm_api_key.clone(),
        config.llm_model.clone(),
        config.llm_timeout,
    )?;
    if config.llm_api_key.is_none() {
        warn!("LLM_API_KEY not set, property analysis will always fall back");
    }

    let pinning = PinningClient::new(
        config.pinata_api_url.clone(),
        config.pinata_gateway_url.clone(),
        config.pinata_jwt.clone(),
    )?;
    if config.pinata_jwt.is_none() {
        warn!("PINATA_JWT not set, image uploads are disabled");
    }

    let feed = PropertyFeed::new();
    let version = feed.refresh(&pool).await?;
    info!("📡 Initial property snapshot v{}", version);

    let state = AppState {
        pool: pool.clone(),
        config: config.clone(),
        bookings,
        feed,
        analyzer: Arc::new(analyzer),
        pinning: Arc::new(pinning),
        profiles: create_profile_cache(),
    };

    let merged_doc = PropertyDoc::openapi()
        .merge_from(BookingDoc::openapi())
        .merge_from(RatingDoc::openapi())
        .merge_from(UserDoc::openapi());

    // Public routes
    let public_routes = Router::new()
        .merge(api::property::property_public_routes())
        .merge(api::rating::rating_public_routes());

    // Private routes; layers run bottom-up, so the session is checked first
    let private_routes = Router::new()
        .merge(api::property::property_routes())
        .merge(api::booking::booking_routes())
        .merge(api::rating::rating_routes())
        .merge(api::user::user_routes())
        .merge(api::admin::admin_routes())
        .route_layer(from_fn_with_state(state.clone(), profile_middleware))
        .route_layer(from_fn(jwt_middleware));

    let app = Router::new()
        .merge(api::health::health_routes())
        .merge(public_routes)
        .merge(private_routes)
        .merge(SwaggerUi::new("/swagger").url("/api-docs/openapi.json", merged_doc.clone()))
        .merge(RapiDoc::with_openapi("/api-docs/rapidoc.json", merged_doc).path("/rapidoc"))
        .layer(from_fn(log_requests))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(config.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    info!("🚀 Server running at http://{}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(pool))
        .await
        .context("Server encountered an error")?;

    info!("Shutdown complete.");
    Ok(())
}

async fn shutdown_signal(pool: PgPool) {
    if let Err(e) = signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {}", e);
    }
    info!("Received Ctrl+C, shutting down...");
    info!("🛠️ Closing database pool...");
    pool.close().await;
    info!("✅ Database pool closed.");
}
