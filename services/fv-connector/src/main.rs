//! Filevine Connector
//!
//! Single-binary authenticating gateway that:
//! 1. Authenticates callers with a shared connector key
//! 2. Accepts proxy requests on `POST /fv`
//! 3. Exchanges a personal access token for a cached bearer token
//! 4. Forwards whitelisted calls to the Filevine API and relays the reply

mod config;
mod error;
mod gateway;
mod metrics;
mod middleware;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{MethodRouter, any, get, post};
use common::Secret;
use filevine_auth::TokenCache;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::gateway::Gateway;

/// How long in-flight requests may run after a shutdown signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

const LIVENESS_MESSAGE: &str = "Filevine connector is running";

/// Shared application state accessible from all handlers
#[derive(Clone)]
struct AppState {
    gateway: Arc<Gateway>,
    prometheus: PrometheusHandle,
}

/// Build the axum router.
///
/// `GET /` is open. Everything else, other methods on `/` and unknown paths
/// included, sits behind the connector-key check. A concurrency limit caps
/// simultaneous requests at `max_connections`.
fn build_router(
    state: AppState,
    connector_key: Arc<Secret<String>>,
    max_connections: usize,
) -> Router {
    let key_check = axum::middleware::from_fn_with_state(
        connector_key,
        middleware::require_connector_key,
    );

    // Only GET (and HEAD) on `/` skip the key check.
    let root_fallback: MethodRouter = any(method_not_allowed_handler).layer(key_check.clone());

    let protected = Router::new()
        .route("/fv", post(fv_handler))
        .route("/metrics", get(metrics_handler))
        .fallback(not_found_handler)
        .layer(key_check);

    Router::new()
        .route("/", get(liveness_handler).fallback_service(root_fallback))
        .merge(protected)
        .layer(axum::middleware::from_fn(middleware::log_request))
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    // JSON logs; LOG_LEVEL wins over RUST_LOG
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting filevine-connector");

    let prometheus_handle = metrics::install_recorder()?;

    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    match &config_path {
        Some(path) => info!(path = %path.display(), "loading configuration"),
        None => info!("loading configuration from environment"),
    }

    let config = Config::load(config_path.as_deref()).context("failed to load configuration")?;

    info!(
        listen_addr = %config.server.listen_addr(),
        api_base = %config.filevine.api_base,
        identity_url = %config.filevine.identity_url,
        max_connections = config.server.max_connections,
        "configuration loaded"
    );

    let client = reqwest::Client::new();
    let tokens = Arc::new(TokenCache::new(
        client.clone(),
        config.filevine.identity_url.clone(),
        config.filevine.credentials.clone(),
    ));
    let gateway = Gateway::new(client, tokens, &config.filevine)
        .context("invalid Filevine identity headers")?;

    let app_state = AppState {
        gateway: Arc::new(gateway),
        prometheus: prometheus_handle,
    };

    let listen_addr = config.server.listen_addr();
    let app = build_router(
        app_state,
        Arc::new(config.connector_key),
        config.server.max_connections,
    );

    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind to {listen_addr}"))?;

    info!(addr = %listen_addr, "accepting requests");

    // The drain timer starts when the signal fires, not when the server starts.
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    shutdown_signal().await;

    let _ = shutdown_tx.send(());

    match tokio::time::timeout(DRAIN_TIMEOUT, server_handle).await {
        Ok(Ok(Ok(()))) => {
            info!("all in-flight requests drained");
        }
        Ok(Ok(Err(e))) => {
            error!(error = %e, "server error during shutdown");
        }
        Ok(Err(e)) => {
            error!(error = %e, "server task panicked");
        }
        Err(_) => {
            warn!(
                drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
                "drain timeout exceeded, forcing shutdown"
            );
        }
    }

    info!("shutdown complete");
    Ok(())
}

/// Liveness probe. Needs no connector key.
async fn liveness_handler() -> &'static str {
    LIVENESS_MESSAGE
}

/// Prometheus metrics endpoint in text exposition format.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}

/// `POST /fv`: forward one call to the Filevine API.
async fn fv_handler(State(state): State<AppState>, body: Bytes) -> Response {
    let request_id = format!("req_{}", uuid::Uuid::new_v4().as_simple());
    gateway::forward(&state.gateway, &body, request_id).await
}

async fn method_not_allowed_handler() -> StatusCode {
    StatusCode::METHOD_NOT_ALLOWED
}

async fn not_found_handler() -> Response {
    (
        StatusCode::NOT_FOUND,
        axum::Json(serde_json::json!({ "error": "not found" })),
    )
        .into_response()
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
///
/// If a handler cannot be installed, only the other signal is awaited.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
