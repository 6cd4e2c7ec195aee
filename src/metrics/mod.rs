//! Metrics and monitoring for the rendezvous pipeline
//!
//! Prometheus counters and histograms for the director, allocator and match
//! function, plus the HTTP server exposing them next to the health probes.

pub mod collector;
pub mod health;

pub use collector::{
    AllocationMetrics, DirectorMetrics, FunctionMetrics, MetricsCollector, MetricsTimer,
    ServiceMetrics,
};
pub use health::{encode_metrics, HealthServer, HealthServerConfig};

use std::sync::Arc;

/// Metrics collector paired with the server that exposes it
#[derive(Clone)]
pub struct MetricsService {
    collector: Arc<MetricsCollector>,
    health_server: Arc<HealthServer>,
}

impl MetricsService {
    pub fn new(collector: Arc<MetricsCollector>, health_server: Arc<HealthServer>) -> Self {
        Self {
            collector,
            health_server,
        }
    }

    pub fn collector(&self) -> Arc<MetricsCollector> {
        self.collector.clone()
    }

    pub fn health_server(&self) -> Arc<HealthServer> {
        self.health_server.clone()
    }

    /// Serve health endpoints until stopped
    pub async fn start(&self) -> anyhow::Result<()> {
        self.health_server.start().await
    }

    pub async fn stop(&self) -> anyhow::Result<()> {
        self.health_server.stop().await
    }
}
