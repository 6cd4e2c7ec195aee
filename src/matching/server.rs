//! HTTP endpoint serving the match function
//!
//! `POST /v1/matchfunction:run` takes `{"profile": ...}` and answers with
//! newline-delimited JSON, one `{"result": {"proposal": ...}}` line per
//! proposal, written as the proposals come off the channel. Failures before
//! the first proposal are returned as a JSON error status.

use super::function::MatchFunction;
use crate::error::PipelineError;
use crate::openmatch::messages::{RpcStatus, RunRequest, RunResponse, StreamEnvelope};
use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use futures::StreamExt;
use serde::Serialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Path of the streaming run endpoint
pub const RUN_PATH: &str = "/v1/matchfunction:run";

const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

// Status codes carried in error bodies and stream lines
const CODE_INVALID_ARGUMENT: i32 = 3;
const CODE_INTERNAL: i32 = 13;
const CODE_UNAVAILABLE: i32 = 14;

/// Match function server configuration
#[derive(Debug, Clone)]
pub struct MatchFunctionServerConfig {
    pub port: u16,
    pub host: String,
}

impl Default for MatchFunctionServerConfig {
    fn default() -> Self {
        Self {
            port: 51502,
            host: "0.0.0.0".to_string(),
        }
    }
}

/// HTTP server exposing a [`MatchFunction`]
pub struct MatchFunctionServer {
    config: MatchFunctionServerConfig,
    function: Arc<MatchFunction>,
    shutdown_tx: broadcast::Sender<()>,
}

impl MatchFunctionServer {
    pub fn new(config: MatchFunctionServerConfig, function: Arc<MatchFunction>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            function,
            shutdown_tx,
        }
    }

    /// Bind and serve until [`stop`](Self::stop) is called
    pub async fn start(&self) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .context("Invalid match function address")?;
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind match function server on {}", addr))?;

        info!("Match function listening on http://{}", addr);
        self.serve(listener).await
    }

    /// Serve on an already bound listener
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("Match function server shutdown signal received");
            })
            .await?;

        info!("Match function server stopped");
        Ok(())
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route(RUN_PATH, post(run_handler))
            .route("/health", get(health_handler))
            .with_state(self.function.clone())
    }

    pub async fn stop(&self) -> Result<()> {
        if let Err(e) = self.shutdown_tx.send(()) {
            warn!("Failed to send shutdown signal to match function server: {}", e);
        }
        Ok(())
    }
}

fn ndjson_line<T: Serialize>(value: &T) -> serde_json::Result<Bytes> {
    let mut line = serde_json::to_vec(value)?;
    line.push(b'\n');
    Ok(Bytes::from(line))
}

fn error_response(error: &anyhow::Error) -> Response {
    let (status, code) = match error.downcast_ref::<PipelineError>() {
        Some(PipelineError::PoolQueryFailed { .. }) => {
            (StatusCode::SERVICE_UNAVAILABLE, CODE_UNAVAILABLE)
        }
        Some(PipelineError::ConfigurationError { .. }) => {
            (StatusCode::BAD_REQUEST, CODE_INVALID_ARGUMENT)
        }
        _ => (StatusCode::INTERNAL_SERVER_ERROR, CODE_INTERNAL),
    };

    let body = RpcStatus {
        code,
        message: format!("{:#}", error),
    };
    (status, Json(body)).into_response()
}

async fn run_handler(
    State(function): State<Arc<MatchFunction>>,
    Json(request): Json<RunRequest>,
) -> Response {
    debug!(profile = %request.profile.name, "Match function run requested");

    let proposals = match function.run(&request.profile).await {
        Ok(stream) => stream,
        Err(e) => {
            warn!(profile = %request.profile.name, error = %format!("{:#}", e), "Match function run failed");
            return error_response(&e);
        }
    };

    let body = proposals.map(|item| match item {
        Ok(proposal) => ndjson_line(&StreamEnvelope::result(RunResponse { proposal })),
        Err(e) => ndjson_line(&StreamEnvelope::<RunResponse>::error(
            CODE_INTERNAL,
            format!("{:#}", e),
        )),
    });

    (
        [(header::CONTENT_TYPE, NDJSON_CONTENT_TYPE)],
        Body::from_stream(body),
    )
        .into_response()
}

async fn health_handler(State(function): State<Arc<MatchFunction>>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": "match-function",
        "tickets_per_match": function.tickets_per_match(),
        "version": env!("CARGO_PKG_VERSION")
    }))
}
