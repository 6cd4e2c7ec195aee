//! Health check endpoints and Prometheus metrics server
//!
//! Both process roles expose the same monitoring surface: liveness and
//! readiness probes, a Prometheus scrape endpoint and a JSON stats view with
//! the director's running totals.

use crate::metrics::collector::MetricsCollector;
use crate::service::app::AppState;
use crate::service::health::{HealthCheck, HealthStatus};
use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

const SERVICE_NAME: &str = "rendezvous";

/// Health server configuration
#[derive(Debug, Clone)]
pub struct HealthServerConfig {
    /// Port to bind the health server to
    pub port: u16,
    /// Host to bind to (typically "0.0.0.0" for all interfaces)
    pub host: String,
}

impl Default for HealthServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            host: "0.0.0.0".to_string(),
        }
    }
}

/// Shared state for the health server
#[derive(Clone)]
pub struct HealthServerState {
    pub metrics_collector: Arc<MetricsCollector>,
    pub app_state: Option<Arc<AppState>>,
}

/// HTTP server for probes, metrics and stats
pub struct HealthServer {
    config: HealthServerConfig,
    state: HealthServerState,
    shutdown_tx: broadcast::Sender<()>,
}

impl HealthServer {
    pub fn new(config: HealthServerConfig, metrics_collector: Arc<MetricsCollector>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            state: HealthServerState {
                metrics_collector,
                app_state: None,
            },
            shutdown_tx,
        }
    }

    /// Attach the application state probes are answered from
    pub fn with_app_state(mut self, app_state: Arc<AppState>) -> Self {
        self.state.app_state = Some(app_state);
        self
    }

    /// Bind and serve until [`stop`](Self::stop) is called
    pub async fn start(&self) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .context("Invalid health server address")?;

        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind health server on {}", addr))?;
        info!("Health server listening on http://{}", addr);

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("Health server shutdown signal received");
            })
            .await?;

        info!("Health server stopped");
        Ok(())
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/", get(root_handler))
            .route("/health", get(health_handler))
            .route("/ready", get(ready_handler))
            .route("/alive", get(alive_handler))
            .route("/metrics", get(metrics_handler))
            .route("/stats", get(stats_handler))
            .with_state(self.state.clone())
    }

    pub async fn stop(&self) -> Result<()> {
        info!("Stopping health server...");
        if let Err(e) = self.shutdown_tx.send(()) {
            warn!("Failed to send shutdown signal to health server: {}", e);
        }
        Ok(())
    }
}

/// Encode every registered metric family in the Prometheus text format
pub fn encode_metrics(metrics_collector: &MetricsCollector) -> Result<String> {
    let metric_families = metrics_collector.registry().gather();
    TextEncoder::new()
        .encode_to_string(&metric_families)
        .context("Failed to encode metrics")
}

fn status_body(status: &str, app_state: Option<&AppState>) -> serde_json::Value {
    json!({
        "status": status,
        "service": SERVICE_NAME,
        "role": app_state.map(|s| s.role().to_string()),
        "version": env!("CARGO_PKG_VERSION")
    })
}

async fn root_handler() -> impl IntoResponse {
    Json(json!({
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": ["/health", "/ready", "/alive", "/metrics", "/stats"]
    }))
}

/// Lightweight health check, answered from the running flag only
async fn health_handler(State(state): State<HealthServerState>) -> impl IntoResponse {
    debug!("Health check requested");

    let Some(app_state) = &state.app_state else {
        let mut body = status_body("unhealthy", None);
        body["error"] = json!("Service not initialized");
        return (StatusCode::SERVICE_UNAVAILABLE, Json(body));
    };

    match HealthCheck::liveness_check(app_state.clone()).await {
        Ok(HealthStatus::Healthy) => (
            StatusCode::OK,
            Json(status_body("healthy", Some(app_state.as_ref()))),
        ),
        Ok(HealthStatus::Degraded) => (
            StatusCode::OK,
            Json(status_body("degraded", Some(app_state.as_ref()))),
        ),
        Ok(HealthStatus::Unhealthy) | Err(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(status_body("unhealthy", Some(app_state.as_ref()))),
        ),
    }
}

async fn ready_handler(State(state): State<HealthServerState>) -> impl IntoResponse {
    debug!("Readiness check requested");

    let Some(app_state) = &state.app_state else {
        return (StatusCode::SERVICE_UNAVAILABLE, "Service not initialized");
    };

    match HealthCheck::readiness_check(app_state.clone()).await {
        Ok(HealthStatus::Healthy) => (StatusCode::OK, "Ready"),
        Ok(HealthStatus::Degraded) => (StatusCode::OK, "Degraded but ready"),
        Ok(HealthStatus::Unhealthy) => (StatusCode::SERVICE_UNAVAILABLE, "Not ready"),
        Err(e) => {
            error!("Readiness check failed: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, "Not ready")
        }
    }
}

async fn alive_handler(State(state): State<HealthServerState>) -> impl IntoResponse {
    let Some(app_state) = &state.app_state else {
        return (StatusCode::SERVICE_UNAVAILABLE, "Service not initialized");
    };

    match HealthCheck::liveness_check(app_state.clone()).await {
        Ok(HealthStatus::Healthy) => (StatusCode::OK, "Alive"),
        _ => (StatusCode::SERVICE_UNAVAILABLE, "Not alive"),
    }
}

async fn metrics_handler(State(state): State<HealthServerState>) -> Response {
    match encode_metrics(&state.metrics_collector) {
        Ok(body) => (
            [(header::CONTENT_TYPE, TextEncoder::new().format_type().to_string())],
            body,
        )
            .into_response(),
        Err(e) => {
            error!("{:#}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to encode metrics".to_string(),
            )
                .into_response()
        }
    }
}

/// Full health check plus director totals, for humans
async fn stats_handler(State(state): State<HealthServerState>) -> impl IntoResponse {
    debug!("Stats endpoint requested");

    let error_body = |error: &str| {
        json!({
            "service": {
                "name": SERVICE_NAME,
                "version": env!("CARGO_PKG_VERSION"),
                "status": "error"
            },
            "error": error,
            "timestamp": chrono::Utc::now()
        })
    };

    let Some(app_state) = &state.app_state else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(error_body("Service not initialized")),
        );
    };

    match HealthCheck::check(app_state.clone()).await {
        Ok(health) => (
            StatusCode::OK,
            Json(json!({
                "service": {
                    "name": health.service,
                    "version": health.version,
                    "role": health.stats.role,
                    "status": health.status,
                    "uptime_seconds": health.stats.uptime_seconds
                },
                "director": health.stats.director,
                "components": health.checks,
                "timestamp": health.timestamp
            })),
        ),
        Err(e) => {
            error!("Failed to get stats: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(error_body("Failed to get service stats")),
            )
        }
    }
}
