//! Metrics collection using Prometheus
//!
//! This module provides metrics collection for the rendezvous matchmaking
//! pipeline using Prometheus metrics.

use anyhow::Result;
use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
    Opts, Registry,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Main metrics collector for the pipeline
#[derive(Clone)]
pub struct MetricsCollector {
    /// Prometheus registry
    registry: Arc<Registry>,

    /// Service-level metrics
    service_metrics: ServiceMetrics,

    /// Director control loop metrics
    director_metrics: DirectorMetrics,

    /// Allocation and assignment metrics
    allocation_metrics: AllocationMetrics,

    /// Match function metrics
    function_metrics: FunctionMetrics,
}

/// Service-level metrics
#[derive(Clone)]
pub struct ServiceMetrics {
    /// Service uptime in seconds
    pub uptime_seconds: IntGauge,

    /// Health check status (0=unhealthy, 1=degraded, 2=healthy)
    pub health_status: IntGauge,

    /// Component health status
    pub component_health: IntGaugeVec,
}

/// Director control loop metrics
#[derive(Clone)]
pub struct DirectorMetrics {
    /// Completed ticks
    pub ticks_total: IntCounter,

    /// Wall time of one tick, all profiles included
    pub tick_duration: Histogram,

    /// Profiles skipped because the match stream could not be fetched
    pub profile_fetch_failures_total: IntCounterVec,

    /// Proposals received from the match source
    pub matches_received_total: IntCounterVec,
}

/// Allocation and assignment metrics
#[derive(Clone)]
pub struct AllocationMetrics {
    /// Allocations by region and status
    pub allocations_total: IntCounterVec,

    /// Allocation call duration by region
    pub allocation_duration: HistogramVec,

    /// Assignment write-backs by status
    pub assignments_total: IntCounterVec,

    /// Tickets that received a connection
    pub tickets_assigned_total: IntCounter,

    /// Servers allocated whose assignment write-back failed
    pub stranded_allocations_total: IntCounterVec,
}

/// Match function metrics
#[derive(Clone)]
pub struct FunctionMetrics {
    /// Proposals produced by profile
    pub proposals_total: IntCounterVec,

    /// Tickets returned by pool queries
    pub tickets_queried_total: IntCounterVec,

    /// Time spent scoring and grouping one pool
    pub grouping_duration: Histogram,
}

impl MetricsCollector {
    /// Create a new metrics collector with default registry
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());
        Self::with_registry(registry)
    }

    /// Create a new metrics collector with custom registry
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self> {
        let service_metrics = ServiceMetrics::new(&registry)?;
        let director_metrics = DirectorMetrics::new(&registry)?;
        let allocation_metrics = AllocationMetrics::new(&registry)?;
        let function_metrics = FunctionMetrics::new(&registry)?;

        Ok(Self {
            registry,
            service_metrics,
            director_metrics,
            allocation_metrics,
            function_metrics,
        })
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    pub fn service(&self) -> &ServiceMetrics {
        &self.service_metrics
    }

    pub fn director(&self) -> &DirectorMetrics {
        &self.director_metrics
    }

    pub fn allocation(&self) -> &AllocationMetrics {
        &self.allocation_metrics
    }

    pub fn function(&self) -> &FunctionMetrics {
        &self.function_metrics
    }

    /// Record a completed tick
    pub fn record_tick(&self, duration: Duration) {
        self.director_metrics.ticks_total.inc();
        self.director_metrics
            .tick_duration
            .observe(duration.as_secs_f64());
    }

    /// Record a profile skipped for this tick
    pub fn record_profile_fetch_failure(&self, profile: &str) {
        self.director_metrics
            .profile_fetch_failures_total
            .with_label_values(&[profile])
            .inc();
    }

    /// Record a proposal received by the director
    pub fn record_match_received(&self, profile: &str) {
        self.director_metrics
            .matches_received_total
            .with_label_values(&[profile])
            .inc();
    }

    /// Record an allocation attempt
    pub fn record_allocation(&self, region: &str, success: bool, duration: Duration) {
        let status = if success { "success" } else { "error" };

        self.allocation_metrics
            .allocations_total
            .with_label_values(&[region, status])
            .inc();

        self.allocation_metrics
            .allocation_duration
            .with_label_values(&[region])
            .observe(duration.as_secs_f64());
    }

    /// Record an assignment write-back
    pub fn record_assignment(&self, success: bool, ticket_count: usize) {
        let status = if success { "success" } else { "error" };

        self.allocation_metrics
            .assignments_total
            .with_label_values(&[status])
            .inc();

        if success {
            self.allocation_metrics
                .tickets_assigned_total
                .inc_by(ticket_count as u64);
        }
    }

    /// Record a server left allocated without players
    pub fn record_stranded_allocation(&self, region: &str) {
        self.allocation_metrics
            .stranded_allocations_total
            .with_label_values(&[region])
            .inc();
    }

    /// Record one match function run
    pub fn record_proposals(
        &self,
        profile: &str,
        tickets_queried: usize,
        proposals: usize,
        duration: Duration,
    ) {
        self.function_metrics
            .tickets_queried_total
            .with_label_values(&[profile])
            .inc_by(tickets_queried as u64);

        self.function_metrics
            .proposals_total
            .with_label_values(&[profile])
            .inc_by(proposals as u64);

        self.function_metrics
            .grouping_duration
            .observe(duration.as_secs_f64());
    }

    /// Update health status
    pub fn update_health_status(&self, status: u8) {
        self.service_metrics.health_status.set(status as i64);
    }

    /// Update component health
    pub fn update_component_health(&self, component: &str, healthy: bool) {
        let status = if healthy { 1 } else { 0 };
        self.service_metrics
            .component_health
            .with_label_values(&[component])
            .set(status);
    }

    /// Create a timer for measuring operation duration
    pub fn start_timer(&self) -> MetricsTimer {
        MetricsTimer::new()
    }
}

/// Timer for measuring operation durations
pub struct MetricsTimer {
    start: Instant,
}

impl MetricsTimer {
    fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get the elapsed duration
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stop the timer and return the duration
    pub fn stop(self) -> Duration {
        self.elapsed()
    }
}

impl ServiceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let uptime_seconds =
            IntGauge::new("rendezvous_uptime_seconds", "Service uptime in seconds")?;
        registry.register(Box::new(uptime_seconds.clone()))?;

        let health_status = IntGauge::new(
            "rendezvous_health_status",
            "Health status (0=unhealthy, 1=degraded, 2=healthy)",
        )?;
        registry.register(Box::new(health_status.clone()))?;

        let component_health = IntGaugeVec::new(
            Opts::new("rendezvous_component_health", "Component health status"),
            &["component"],
        )?;
        registry.register(Box::new(component_health.clone()))?;

        Ok(Self {
            uptime_seconds,
            health_status,
            component_health,
        })
    }
}

impl DirectorMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let ticks_total = IntCounter::new("rendezvous_ticks_total", "Director ticks completed")?;
        registry.register(Box::new(ticks_total.clone()))?;

        let tick_duration = Histogram::with_opts(
            HistogramOpts::new(
                "rendezvous_tick_duration_seconds",
                "Director tick duration",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        )?;
        registry.register(Box::new(tick_duration.clone()))?;

        let profile_fetch_failures_total = IntCounterVec::new(
            Opts::new(
                "rendezvous_profile_fetch_failures_total",
                "Profiles skipped because fetching matches failed",
            ),
            &["profile"],
        )?;
        registry.register(Box::new(profile_fetch_failures_total.clone()))?;

        let matches_received_total = IntCounterVec::new(
            Opts::new(
                "rendezvous_matches_received_total",
                "Match proposals received by the director",
            ),
            &["profile"],
        )?;
        registry.register(Box::new(matches_received_total.clone()))?;

        Ok(Self {
            ticks_total,
            tick_duration,
            profile_fetch_failures_total,
            matches_received_total,
        })
    }
}

impl AllocationMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let allocations_total = IntCounterVec::new(
            Opts::new(
                "rendezvous_allocations_total",
                "Game server allocations by region and status",
            ),
            &["region", "status"],
        )?;
        registry.register(Box::new(allocations_total.clone()))?;

        let allocation_duration = HistogramVec::new(
            HistogramOpts::new(
                "rendezvous_allocation_duration_seconds",
                "Game server allocation duration",
            )
            .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0]),
            &["region"],
        )?;
        registry.register(Box::new(allocation_duration.clone()))?;

        let assignments_total = IntCounterVec::new(
            Opts::new(
                "rendezvous_assignments_total",
                "Assignment write-backs by status",
            ),
            &["status"],
        )?;
        registry.register(Box::new(assignments_total.clone()))?;

        let tickets_assigned_total = IntCounter::new(
            "rendezvous_tickets_assigned_total",
            "Tickets assigned a connection",
        )?;
        registry.register(Box::new(tickets_assigned_total.clone()))?;

        let stranded_allocations_total = IntCounterVec::new(
            Opts::new(
                "rendezvous_stranded_allocations_total",
                "Allocated game servers whose assignment write-back failed",
            ),
            &["region"],
        )?;
        registry.register(Box::new(stranded_allocations_total.clone()))?;

        Ok(Self {
            allocations_total,
            allocation_duration,
            assignments_total,
            tickets_assigned_total,
            stranded_allocations_total,
        })
    }
}

impl FunctionMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let proposals_total = IntCounterVec::new(
            Opts::new(
                "rendezvous_proposals_total",
                "Match proposals generated by the match function",
            ),
            &["profile"],
        )?;
        registry.register(Box::new(proposals_total.clone()))?;

        let tickets_queried_total = IntCounterVec::new(
            Opts::new(
                "rendezvous_tickets_queried_total",
                "Tickets returned by pool queries",
            ),
            &["profile"],
        )?;
        registry.register(Box::new(tickets_queried_total.clone()))?;

        let grouping_duration = Histogram::with_opts(
            HistogramOpts::new(
                "rendezvous_grouping_duration_seconds",
                "Pool query, scoring and grouping time",
            )
            .buckets(vec![0.0001, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
        )?;
        registry.register(Box::new(grouping_duration.clone()))?;

        Ok(Self {
            proposals_total,
            tickets_queried_total,
            grouping_duration,
        })
    }
}
