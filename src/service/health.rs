//! Health check endpoints and monitoring
//!
//! This module provides health check functionality for the rendezvous
//! service, including readiness and liveness probes.

use crate::director::DirectorStats;
use crate::service::app::{AppState, ServiceRole};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// A director whose last tick is older than this many intervals is degraded
const STALE_TICK_INTERVALS: u32 = 3;

/// Health check status
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    /// Value exported on the health status gauge
    pub fn as_gauge(&self) -> u8 {
        match self {
            HealthStatus::Healthy => 2,
            HealthStatus::Degraded => 1,
            HealthStatus::Unhealthy => 0,
        }
    }

    /// Combine with a component status; the worse one wins
    fn merge(&mut self, other: &HealthStatus) {
        if other.as_gauge() < self.as_gauge() {
            *self = other.clone();
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "✅ healthy"),
            HealthStatus::Degraded => write!(f, "⚠️  degraded"),
            HealthStatus::Unhealthy => write!(f, "❌ unhealthy"),
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    /// Overall service status
    pub status: HealthStatus,
    /// Service name
    pub service: String,
    /// Service version
    pub version: String,
    /// Current timestamp
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Detailed component checks
    pub checks: Vec<ComponentCheck>,
    /// Service statistics
    pub stats: ServiceStats,
}

/// Individual component health check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentCheck {
    /// Component name
    pub name: String,
    /// Component status
    pub status: HealthStatus,
    /// Optional error message if unhealthy
    pub message: Option<String>,
    /// Check duration in milliseconds
    pub duration_ms: u64,
}

/// Service statistics for health reporting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStats {
    /// Which process role is running
    pub role: String,
    /// Seconds since the service started
    pub uptime_seconds: u64,
    /// Director totals, absent for the match function role
    pub director: Option<DirectorStatsSummary>,
}

/// Subset of director totals reported by health checks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectorStatsSummary {
    pub ticks: u64,
    pub matches_assigned: u64,
    pub tickets_assigned: u64,
    pub allocation_failures: u64,
    pub assignment_failures: u64,
    pub profile_fetch_failures: u64,
    pub stranded_allocations: u64,
    pub last_tick_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl From<&DirectorStats> for DirectorStatsSummary {
    fn from(stats: &DirectorStats) -> Self {
        Self {
            ticks: stats.ticks,
            matches_assigned: stats.matches_assigned,
            tickets_assigned: stats.tickets_assigned,
            allocation_failures: stats.allocation_failures,
            assignment_failures: stats.assignment_failures,
            profile_fetch_failures: stats.profile_fetch_failures,
            stranded_allocations: stats.stranded_allocations,
            last_tick_at: stats.last_tick_at,
        }
    }
}

impl HealthCheck {
    /// Perform a comprehensive health check of the service
    pub async fn check(app_state: Arc<AppState>) -> Result<Self> {
        let mut checks = Vec::new();
        let mut overall_status = HealthStatus::Healthy;

        // Check if service is running
        let service_check = Self::check_service_running(&app_state).await;
        if service_check.status != HealthStatus::Healthy {
            overall_status = HealthStatus::Unhealthy;
        }
        checks.push(service_check);

        // Check the control loop when this process runs the director
        if app_state.role() == ServiceRole::Director {
            let director_check = Self::check_director(&app_state).await;
            overall_status.merge(&director_check.status);
            checks.push(director_check);
        }

        let stats = Self::gather_service_stats(&app_state).await;

        Ok(HealthCheck {
            status: overall_status,
            service: app_state.config().service.name.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: chrono::Utc::now(),
            checks,
            stats,
        })
    }

    /// Simple liveness check - just verify service is running
    pub async fn liveness_check(app_state: Arc<AppState>) -> Result<HealthStatus> {
        if app_state.is_running().await {
            Ok(HealthStatus::Healthy)
        } else {
            Ok(HealthStatus::Unhealthy)
        }
    }

    /// Readiness check - verify service can do its work
    pub async fn readiness_check(app_state: Arc<AppState>) -> Result<HealthStatus> {
        if !app_state.is_running().await {
            return Ok(HealthStatus::Unhealthy);
        }

        match app_state.role() {
            ServiceRole::Director => Ok(Self::check_director(&app_state).await.status),
            ServiceRole::MatchFunction => Ok(HealthStatus::Healthy),
        }
    }

    /// Check if service is running
    async fn check_service_running(app_state: &AppState) -> ComponentCheck {
        let start = std::time::Instant::now();

        let (status, message) = if app_state.is_running().await {
            (HealthStatus::Healthy, None)
        } else {
            (
                HealthStatus::Unhealthy,
                Some("Service is not running".to_string()),
            )
        };

        ComponentCheck {
            name: "service_running".to_string(),
            status,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    /// Check the director loop is alive and ticking on schedule
    async fn check_director(app_state: &AppState) -> ComponentCheck {
        let start = std::time::Instant::now();

        let (status, message) = match app_state.director() {
            None => (
                HealthStatus::Unhealthy,
                Some("Director not configured".to_string()),
            ),
            Some(director) if !director.is_running() => (
                HealthStatus::Unhealthy,
                Some("Director loop is not running".to_string()),
            ),
            Some(director) => {
                let stats = director.stats().await;
                let limit = director.poll_interval() * STALE_TICK_INTERVALS;
                tick_freshness(stats.last_tick_at, limit, chrono::Utc::now())
            }
        };

        ComponentCheck {
            name: "director".to_string(),
            status,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    /// Gather current service statistics
    async fn gather_service_stats(app_state: &AppState) -> ServiceStats {
        let director = match app_state.director() {
            Some(director) => Some(DirectorStatsSummary::from(&director.stats().await)),
            None => None,
        };

        debug!(role = %app_state.role(), "Gathered service stats");
        ServiceStats {
            role: app_state.role().to_string(),
            uptime_seconds: app_state.uptime().as_secs(),
            director,
        }
    }
}

/// Healthy while the last tick is recent; before the first tick there is nothing to judge
fn tick_freshness(
    last_tick_at: Option<chrono::DateTime<chrono::Utc>>,
    limit: Duration,
    now: chrono::DateTime<chrono::Utc>,
) -> (HealthStatus, Option<String>) {
    let Some(last) = last_tick_at else {
        return (HealthStatus::Healthy, None);
    };

    let age = (now - last).to_std().unwrap_or_default();
    if age > limit {
        (
            HealthStatus::Degraded,
            Some(format!("Last tick {}s ago", age.as_secs())),
        )
    } else {
        (HealthStatus::Healthy, None)
    }
}

/// Convert health check to JSON string
impl HealthCheck {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| anyhow::anyhow!("Failed to serialize health check: {}", e))
    }
}
