//! Main application state and service coordination
//!
//! `AppState` is the shared, read-mostly view health checks work from.
//! `Application` owns it together with the servers and background tasks and
//! drives startup and graceful shutdown for one of the two process roles.

use crate::allocator::RegionalAllocators;
use crate::config::{AppConfig, MatchSourceKind};
use crate::director::{generate_profiles, Director};
use crate::matching::{MatchFunction, MatchFunctionServer, MatchFunctionServerConfig};
use crate::metrics::health::HealthServerConfig;
use crate::metrics::{HealthServer, MetricsCollector, MetricsService};
use crate::openmatch::messages::{FunctionConfig, FunctionType};
use crate::openmatch::{BackendClient, MatchSource, QueryServiceClient};
use crate::service::health::HealthCheck;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

/// Service-level errors
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Service initialization error: {message}")]
    Initialization { message: String },

    #[error("Failed to bind {component} on port {port}: {message}")]
    Bind {
        component: String,
        port: u16,
        message: String,
    },
}

/// Which half of the pipeline this process runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceRole {
    /// Control loop: fetch proposals, allocate servers, assign tickets
    Director,
    /// Match function endpoint called by the ticket store backend
    MatchFunction,
}

impl std::fmt::Display for ServiceRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceRole::Director => write!(f, "director"),
            ServiceRole::MatchFunction => write!(f, "match-function"),
        }
    }
}

/// Shared application state
pub struct AppState {
    /// Application configuration
    config: AppConfig,

    /// Process role
    role: ServiceRole,

    /// Control loop, present for the director role
    director: Option<Director>,

    /// Metrics collector shared by all components
    metrics: Arc<MetricsCollector>,

    /// Service status
    is_running: RwLock<bool>,

    started_at: Instant,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        role: ServiceRole,
        director: Option<Director>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            config,
            role,
            director,
            metrics,
            is_running: RwLock::new(false),
            started_at: Instant::now(),
        }
    }

    /// Get service configuration
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn role(&self) -> ServiceRole {
        self.role
    }

    pub fn director(&self) -> Option<&Director> {
        self.director.as_ref()
    }

    pub fn metrics(&self) -> Arc<MetricsCollector> {
        self.metrics.clone()
    }

    /// Check if service is running
    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    pub async fn set_running(&self, running: bool) {
        *self.is_running.write().await = running;
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }
}

/// Owner of the running service
pub struct Application {
    state: Arc<AppState>,

    /// Metrics service for monitoring and health checks
    metrics_service: Arc<MetricsService>,

    /// Match function endpoint, present for the match function role
    match_function_server: Option<Arc<MatchFunctionServer>>,

    /// Director loop handle
    director_task: Option<JoinHandle<()>>,

    /// Background task handles
    background_tasks: Vec<JoinHandle<()>>,
}

impl Application {
    /// Build every component for the given role
    pub async fn new(config: AppConfig, role: ServiceRole) -> Result<Self, ServiceError> {
        info!("Initializing rendezvous {}", role);

        let metrics_collector =
            Arc::new(
                MetricsCollector::new().map_err(|e| ServiceError::Initialization {
                    message: format!("Failed to create metrics collector: {}", e),
                })?,
            );

        let (director, match_function_server) = match role {
            ServiceRole::Director => (
                Some(Self::initialize_director(&config, metrics_collector.clone())?),
                None,
            ),
            ServiceRole::MatchFunction => (
                None,
                Some(Self::initialize_match_function(
                    &config,
                    metrics_collector.clone(),
                )?),
            ),
        };

        let state = Arc::new(AppState::new(
            config,
            role,
            director,
            metrics_collector.clone(),
        ));

        let health_config = HealthServerConfig {
            port: state.config().service.health_port,
            host: "0.0.0.0".to_string(),
        };
        let health_server = Arc::new(
            HealthServer::new(health_config, metrics_collector.clone())
                .with_app_state(state.clone()),
        );
        let metrics_service = Arc::new(MetricsService::new(metrics_collector, health_server));

        Ok(Self {
            state,
            metrics_service,
            match_function_server,
            director_task: None,
            background_tasks: Vec::new(),
        })
    }

    pub fn state(&self) -> Arc<AppState> {
        self.state.clone()
    }

    /// Get metrics service
    pub fn metrics_service(&self) -> Arc<MetricsService> {
        self.metrics_service.clone()
    }

    /// Start servers, the director loop and background tasks
    pub async fn start(&mut self) -> Result<(), ServiceError> {
        info!("Starting rendezvous {}", self.state.role());

        // Bind the match function port first so a busy port fails startup
        if let Some(server) = &self.match_function_server {
            let port = self.state.config().match_function.port;
            let listener = TcpListener::bind(("0.0.0.0", port))
                .await
                .map_err(|e| ServiceError::Bind {
                    component: "match function".to_string(),
                    port,
                    message: e.to_string(),
                })?;

            let server = server.clone();
            self.background_tasks.push(tokio::spawn(async move {
                if let Err(e) = server.serve(listener).await {
                    error!("Match function server failed: {}", e);
                }
            }));
            info!("✅ Match function serving on port {}", port);
        }

        self.state.set_running(true).await;

        self.start_metrics_service().await?;

        if let Some(director) = self.state.director() {
            self.director_task = director.start();
        }

        self.start_background_tasks();

        info!("✅ Rendezvous {} started successfully", self.state.role());
        Ok(())
    }

    /// Perform graceful shutdown; an in-flight tick is given `timeout` to finish
    pub async fn shutdown(&mut self, timeout: Duration) -> Result<(), ServiceError> {
        info!("Starting graceful shutdown of rendezvous service");

        self.state.set_running(false).await;

        if let Some(director) = self.state.director() {
            director.stop();
        }
        if let Some(handle) = self.director_task.take() {
            match tokio::time::timeout(timeout, handle).await {
                Ok(Ok(())) => info!("✅ Director loop stopped"),
                Ok(Err(e)) => warn!("Director task ended abnormally: {}", e),
                Err(_) => warn!("⚠️  Director did not stop within {:?}", timeout),
            }
        }

        if let Some(server) = &self.match_function_server {
            if let Err(e) = server.stop().await {
                warn!("Failed to stop match function server: {}", e);
            }
        }

        info!("Stopping metrics service...");
        if let Err(e) = self.metrics_service.stop().await {
            warn!("Failed to stop metrics service: {}", e);
        }

        self.stop_background_tasks().await;

        if let Some(director) = self.state.director() {
            info!("Final director statistics: {:?}", director.stats().await);
        }
        info!("✅ Rendezvous service shutdown completed");

        Ok(())
    }

    /// Wire the director to the ticket store and allocators
    fn initialize_director(
        config: &AppConfig,
        metrics: Arc<MetricsCollector>,
    ) -> Result<Director, ServiceError> {
        let init_error = |e: anyhow::Error| ServiceError::Initialization {
            message: format!("{:#}", e),
        };
        let timeout = config.open_match_timeout();

        let backend = Arc::new(
            BackendClient::new(
                config.open_match.backend_url.clone(),
                FunctionConfig {
                    host: config.open_match.function_host.clone(),
                    port: config.open_match.function_port,
                    function_type: FunctionType::Rest,
                },
                timeout,
            )
            .map_err(init_error)?,
        );

        let match_source: Arc<dyn MatchSource> = match config.director.match_source {
            MatchSourceKind::Backend => backend.clone(),
            MatchSourceKind::InProcess => {
                let query = QueryServiceClient::new(config.open_match.query_url.clone(), timeout)
                    .map_err(init_error)?;
                Arc::new(
                    MatchFunction::new(Arc::new(query), config.match_function.tickets_per_match)
                        .with_stream_buffer(config.match_function.stream_buffer)
                        .with_metrics(metrics.clone()),
                )
            }
        };

        let allocators =
            RegionalAllocators::from_config(&config.allocator, &config.director.regions)
                .map_err(init_error)?;

        info!(
            regions = ?config.director.regions,
            match_source = %config.director.match_source,
            "Director wired"
        );

        Ok(Director::new(
            generate_profiles(&config.director.regions),
            match_source,
            backend,
            allocators,
        )
        .with_namespace(config.director.game_namespace.clone())
        .with_poll_interval(config.poll_interval())
        .with_metrics(metrics))
    }

    /// Build the match function over the query service
    fn initialize_match_function(
        config: &AppConfig,
        metrics: Arc<MetricsCollector>,
    ) -> Result<Arc<MatchFunctionServer>, ServiceError> {
        let query =
            QueryServiceClient::new(config.open_match.query_url.clone(), config.open_match_timeout())
                .map_err(|e| ServiceError::Initialization {
                    message: format!("{:#}", e),
                })?;

        let function = MatchFunction::new(Arc::new(query), config.match_function.tickets_per_match)
            .with_stream_buffer(config.match_function.stream_buffer)
            .with_metrics(metrics);

        let server_config = MatchFunctionServerConfig {
            port: config.match_function.port,
            host: "0.0.0.0".to_string(),
        };
        Ok(Arc::new(MatchFunctionServer::new(
            server_config,
            Arc::new(function),
        )))
    }

    /// Start metrics service
    async fn start_metrics_service(&mut self) -> Result<(), ServiceError> {
        info!("Starting metrics and health endpoints");

        let metrics_service = self.metrics_service.clone();
        let port = self.state.config().service.health_port;

        let metrics_handle = tokio::spawn(async move {
            if let Err(e) = metrics_service.start().await {
                error!("Metrics service failed: {}", e);
            } else {
                info!("Metrics service task completed");
            }
        });

        self.background_tasks.push(metrics_handle);

        // Give the server a moment to start up
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        info!("✅ Metrics service started on port {}", port);
        Ok(())
    }

    /// Start the periodic health metrics task
    fn start_background_tasks(&mut self) {
        info!("Starting health metrics task (15s interval)...");
        let state = self.state.clone();

        let health_metrics_task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(15));
            let metrics = state.metrics();
            info!("Health metrics task started");

            while state.is_running().await {
                interval.tick().await;

                metrics
                    .service()
                    .uptime_seconds
                    .set(state.uptime().as_secs() as i64);

                match HealthCheck::check(state.clone()).await {
                    Ok(health) => {
                        metrics.update_health_status(health.status.as_gauge());
                        for check in &health.checks {
                            metrics.update_component_health(
                                &check.name,
                                check.status.as_gauge() > 0,
                            );
                        }
                        debug!("Updated service health metrics - status: {}", health.status);
                    }
                    Err(e) => warn!("Health check failed: {}", e),
                }
            }

            info!("Health metrics task stopped");
        });

        self.background_tasks.push(health_metrics_task);
    }

    /// Stop all background tasks
    async fn stop_background_tasks(&mut self) {
        let task_count = self.background_tasks.len();
        if task_count == 0 {
            info!("No background tasks to stop");
            return;
        }

        info!("Stopping {} background tasks...", task_count);

        // Give servers a moment to drain after their shutdown signal
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;

        for (i, task) in self.background_tasks.drain(..).enumerate() {
            debug!("Aborting background task {}/{}", i + 1, task_count);
            task.abort();
        }

        info!("✅ All {} background tasks stopped", task_count);
    }
}
