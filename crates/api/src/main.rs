//! Insider-risk telemetry server.
//!
//! Hosts the authenticated ingestion endpoint and health checks, and runs
//! the background scheduler (baseline, scoring, retention) in-process.
//! Admin CRUD, the dashboard, and audit reads live elsewhere and talk to
//! the same store.

use axum::{http::StatusCode, response::IntoResponse, Json, Router};
use irm_core::{ApiKeyHasher, Config};
use irm_engine::{
    default_rules, AlertingEngine, BaselineEngine, RateLimiter, RetentionEngine, Scheduler,
    SchedulerSettings, ScoringEngine, SourceRegistry,
};
use irm_store::{DatabasePool, Store};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{info, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod error;
mod handlers;
mod health;
mod state;

use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    info!("Starting insider-risk monitor...");

    let config = Config::load()?;
    info!("Configuration loaded");

    let db = DatabasePool::new(config.database.clone()).await?;
    db.run_migrations().await?;
    let store = Store::new(db.pool.clone());

    let seeded = store.seed_rules(&default_rules()).await?;
    if seeded > 0 {
        info!(seeded, "Installed default scoring rules");
    }

    let hasher = ApiKeyHasher::new(&config.security)?;
    let registry = SourceRegistry::new(store.clone(), hasher);
    let limiter = Arc::new(RateLimiter::new());

    let settings = SchedulerSettings::from_config(&config);
    let baselines = BaselineEngine::new(store.clone(), config.scoring.baseline_window_days as i32);
    let mut scheduler = Scheduler::new(
        store.clone(),
        baselines,
        ScoringEngine::new(store.clone()),
        AlertingEngine::new(store.clone()),
        RetentionEngine::new(store.clone()),
        Arc::clone(&limiter),
        settings,
    );
    scheduler.start();
    info!("Background scheduler started");

    let app_state = AppState {
        store,
        registry,
        limiter,
    };

    let app = create_app(app_state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // HTTP is down; give in-flight background jobs their grace period.
    scheduler.shutdown().await;

    info!("Server shutdown complete");
    Ok(())
}

fn create_app(state: AppState) -> Router {
    Router::new()
        .merge(handlers::ingest::ingest_routes())
        .route("/health", axum::routing::get(health::health_check))
        .route("/ready", axum::routing::get(health::readiness_check))
        .layer(
            ServiceBuilder::new()
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                        .on_request(DefaultOnRequest::new().level(Level::DEBUG))
                        .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
                )
                .layer(CompressionLayer::new()),
        )
        .with_state(state)
        .fallback(handler_404)
}

async fn handler_404() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({
            "error": "Resource not found"
        })),
    )
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "irm_api=debug,irm_engine=debug,irm_store=debug,irm_core=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received terminate signal");
        },
    }
}
