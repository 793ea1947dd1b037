//! HTTP server bootstrap for casevault.
//!
//! This module wires together:
//! - configuration (read from the environment exactly once, here)
//! - the database connection pool and migrations
//! - core services (engine, verifier, usage guard, authenticator)
//! - the Axum router
//!
//! Components never read ambient process state; everything they need is
//! constructed here and passed in.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use sqlx::postgres::PgPoolOptions;
use tower_http::trace::TraceLayer;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

use crate::auth::{auth_middleware, AuthMiddlewareState, KeyAuthenticator};
use crate::engine::{CaseEngine, ReplayVerifier};
use crate::infra::{CaseStore, PgCaseStore};
use crate::usage::{
    spawn_usage_writer, UsageGuard, DEFAULT_USAGE_QUEUE_DEPTH, FREE_TIER_USAGE_LIMIT,
};

/// Server configuration, constructed once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection URL.
    pub database_url: String,
    /// Server listen address.
    pub listen_addr: SocketAddr,
    /// Maximum database connections.
    pub max_connections: u32,
    /// Usage events a free-tier tenant may accrue before case creation is
    /// denied.
    pub free_tier_usage_limit: u64,
    /// Depth of the usage handoff queue.
    pub usage_queue_depth: usize,
}

impl Config {
    /// Load configuration from environment variables. This is the only
    /// place the process environment is consulted.
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgres://localhost/casevault".to_string());

        let port: u16 = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);

        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        let listen_addr: SocketAddr = format!("{host}:{port}")
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid listen address: {e}"))?;

        let max_connections: u32 = std::env::var("MAX_DB_CONNECTIONS")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(10);

        let free_tier_usage_limit: u64 = std::env::var("FREE_TIER_USAGE_LIMIT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(FREE_TIER_USAGE_LIMIT);

        let usage_queue_depth: usize = std::env::var("USAGE_QUEUE_DEPTH")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_USAGE_QUEUE_DEPTH);

        Ok(Self {
            database_url,
            listen_addr,
            max_connections,
            free_tier_usage_limit,
            usage_queue_depth,
        })
    }
}

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn CaseStore>,
    pub engine: Arc<CaseEngine>,
    pub verifier: Arc<ReplayVerifier>,
    pub authenticator: Arc<KeyAuthenticator>,
}

/// Build the application state and auth middleware over a store.
pub fn build_services(
    store: Arc<dyn CaseStore>,
    config: &Config,
) -> (AppState, AuthMiddlewareState) {
    let (recorder, _writer) = spawn_usage_writer(store.clone(), config.usage_queue_depth);

    let guard = Arc::new(UsageGuard::new(
        store.clone(),
        recorder.clone(),
        config.free_tier_usage_limit,
    ));
    let engine = Arc::new(CaseEngine::new(store.clone(), guard));
    let verifier = Arc::new(ReplayVerifier::new(store.clone()));
    let authenticator = Arc::new(KeyAuthenticator::new(store.clone(), recorder));

    let state = AppState {
        store,
        engine,
        verifier,
        authenticator: authenticator.clone(),
    };
    let auth_state = AuthMiddlewareState { authenticator };

    (state, auth_state)
}

/// Start the HTTP server.
pub async fn run() -> anyhow::Result<()> {
    init_tracing();

    info!("Starting casevault v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;
    info!("Configuration loaded");
    info!("  Listen address: {}", config.listen_addr);
    info!("  Max connections: {}", config.max_connections);
    info!("  Free tier usage limit: {}", config.free_tier_usage_limit);

    info!("Connecting to PostgreSQL...");
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await?;
    info!("Connected to PostgreSQL");

    info!("Running database migrations...");
    crate::migrations::run_postgres(&pool).await?;
    info!("Database migrations applied");

    let store: Arc<dyn CaseStore> = Arc::new(PgCaseStore::new(pool));
    let (state, auth_state) = build_services(store, &config);

    let app = build_router(auth_state).with_state(state);

    info!("Starting HTTP server on {}", config.listen_addr);
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;

    info!("casevault is ready to accept connections");
    axum::serve(listener, app).await?;

    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(Level::INFO.to_string()));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .init();
}

/// Build the router: authenticated API routes plus open health probes.
pub fn build_router(auth_state: AuthMiddlewareState) -> Router<AppState> {
    let api = crate::api::router().layer(axum::middleware::from_fn_with_state(
        auth_state,
        auth_middleware,
    ));

    Router::new()
        .merge(api)
        .route("/health", get(crate::api::handlers::health::health_check))
        .route("/ready", get(crate::api::handlers::health::readiness_check))
        .layer(TraceLayer::new_for_http())
}
