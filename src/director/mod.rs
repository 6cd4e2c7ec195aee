//! Director control loop
//!
//! On every tick the director fans out one task per match profile and waits
//! for all of them before the next tick can start. Each profile task reads
//! the match stream to its end, then allocates a game server and writes the
//! connection back for each proposal in stream order. Failures are isolated: a profile
//! that cannot be fetched is skipped, a match that cannot be allocated or
//! assigned is abandoned, and its tickets are picked up again next tick.

pub mod profiles;
pub mod report;

use crate::allocator::RegionalAllocators;
use crate::metrics::MetricsCollector;
use crate::openmatch::{MatchSource, TicketAssigner};
use crate::types::{Match, MatchProfile};
use crate::utils::current_timestamp;
use futures::StreamExt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, RwLock};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

pub use profiles::generate_profiles;
pub use report::{DirectorStats, MatchOutcome, ProfileReport, TickReport};

/// Default time between ticks
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Default namespace game servers are allocated from
pub const DEFAULT_NAMESPACE: &str = "default";

/// Matchmaking director
#[derive(Clone)]
pub struct Director {
    profiles: Arc<Vec<MatchProfile>>,
    match_source: Arc<dyn MatchSource>,
    assigner: Arc<dyn TicketAssigner>,
    allocators: Arc<RegionalAllocators>,
    namespace: String,
    poll_interval: Duration,
    metrics: Option<Arc<MetricsCollector>>,

    // Runtime state
    stats: Arc<RwLock<DirectorStats>>,
    tick_counter: Arc<AtomicU64>,
    running: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Director {
    pub fn new(
        profiles: Vec<MatchProfile>,
        match_source: Arc<dyn MatchSource>,
        assigner: Arc<dyn TicketAssigner>,
        allocators: RegionalAllocators,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            profiles: Arc::new(profiles),
            match_source,
            assigner,
            allocators: Arc::new(allocators),
            namespace: DEFAULT_NAMESPACE.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            metrics: None,
            stats: Arc::new(RwLock::new(DirectorStats::default())),
            tick_counter: Arc::new(AtomicU64::new(0)),
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn profiles(&self) -> &[MatchProfile] {
        &self.profiles
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Snapshot of the running totals
    pub async fn stats(&self) -> DirectorStats {
        self.stats.read().await.clone()
    }

    /// Spawn the control loop; a second call while running is a no-op
    pub fn start(&self) -> Option<JoinHandle<()>> {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Director already running");
            return None;
        }

        info!(
            profiles = self.profiles.len(),
            interval_ms = self.poll_interval.as_millis() as u64,
            namespace = %self.namespace,
            "Starting director"
        );

        let director = self.clone();
        let shutdown_rx = self.shutdown_tx.subscribe();
        Some(tokio::spawn(async move {
            director.run(shutdown_rx).await;
        }))
    }

    /// Signal the control loop to stop after the current tick
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            debug!("Director not running");
            return;
        }

        info!("Stopping director");
        let _ = self.shutdown_tx.send(());
    }

    /// Run ticks on the fixed interval until shutdown is signalled
    ///
    /// A tick in progress is always completed; ticks never overlap.
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("Director loop started");
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Director loop received shutdown signal");
                    break;
                }
                _ = interval.tick() => {
                    let report = self.tick().await;
                    debug!(
                        tick = report.tick,
                        assigned = report.matches_assigned(),
                        skipped = report.skipped_profiles(),
                        "Tick finished"
                    );
                }
            }
        }
        self.running.store(false, Ordering::SeqCst);
        info!("Director loop stopped");
    }

    /// Run one tick: process every profile concurrently and wait for all
    pub async fn tick(&self) -> TickReport {
        let tick = self.tick_counter.fetch_add(1, Ordering::SeqCst) + 1;
        let started = Instant::now();

        let mut tasks = JoinSet::new();
        for profile in self.profiles.iter().cloned() {
            let director = self.clone();
            tasks.spawn(async move { director.process_profile(&profile).await });
        }

        let mut profiles = Vec::with_capacity(self.profiles.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(report) => profiles.push(report),
                Err(e) => error!(tick, error = %e, "Profile task panicked"),
            }
        }
        profiles.sort_by(|a, b| a.profile.cmp(&b.profile));

        let report = TickReport {
            tick,
            duration: started.elapsed(),
            profiles,
        };

        self.stats
            .write()
            .await
            .apply(&report, current_timestamp());
        if let Some(metrics) = &self.metrics {
            metrics.record_tick(report.duration);
        }

        if report.matches_assigned() > 0 {
            info!(
                tick,
                matches = report.matches_assigned(),
                tickets = report.tickets_assigned(),
                duration_ms = report.duration.as_millis() as u64,
                "Tick assigned matches"
            );
        }

        report
    }

    /// Fetch and handle all proposals of one profile
    pub async fn process_profile(&self, profile: &MatchProfile) -> ProfileReport {
        let mut stream = match self.match_source.fetch_matches(profile).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!(profile = %profile.name, error = %format!("{:#}", e), "Failed to fetch matches, skipping profile");
                if let Some(metrics) = &self.metrics {
                    metrics.record_profile_fetch_failure(&profile.name);
                }
                return ProfileReport::skipped(&profile.name, format!("{:#}", e));
            }
        };

        let mut report = ProfileReport::new(&profile.name);
        let mut proposals = Vec::new();
        while let Some(item) = stream.next().await {
            match item {
                Ok(proposal) => proposals.push(proposal),
                Err(e) => {
                    // Proposals read before the failure are still handled
                    warn!(profile = %profile.name, error = %format!("{:#}", e), "Match stream failed");
                    report.stream_error = Some(format!("{:#}", e));
                    break;
                }
            }
        }
        drop(stream);

        for proposal in &proposals {
            report.matches_received += 1;
            if let Some(metrics) = &self.metrics {
                metrics.record_match_received(&profile.name);
            }

            let outcome = self.assign_match(profile, proposal).await;
            report.record(&outcome, proposal.tickets.len());
        }

        debug!(
            profile = %profile.name,
            received = report.matches_received,
            assigned = report.matches_assigned,
            "Profile processed"
        );
        report
    }

    /// Allocate a server for one proposal and write the connection back
    pub async fn assign_match(&self, profile: &MatchProfile, proposal: &Match) -> MatchOutcome {
        let region = profile.region();
        let ticket_ids = proposal.ticket_ids();

        let started = Instant::now();
        let allocation = self.allocators.allocate(region, &self.namespace).await;
        if let Some(metrics) = &self.metrics {
            metrics.record_allocation(region, allocation.is_ok(), started.elapsed());
        }

        let address = match allocation {
            Ok(address) => address,
            Err(e) => {
                warn!(
                    profile = %profile.name,
                    match_id = %proposal.match_id,
                    error = %format!("{:#}", e),
                    "Allocation failed, abandoning match"
                );
                return MatchOutcome::AllocationFailed {
                    reason: format!("{:#}", e),
                };
            }
        };

        let connection = address.connection();
        let assignment = self.assigner.assign_tickets(&ticket_ids, &connection).await;
        if let Some(metrics) = &self.metrics {
            metrics.record_assignment(assignment.is_ok(), ticket_ids.len());
        }

        match assignment {
            Ok(()) => {
                info!(
                    profile = %profile.name,
                    match_id = %proposal.match_id,
                    connection = %connection,
                    tickets = ticket_ids.len(),
                    score = proposal.score(),
                    "Assigned match"
                );
                debug!(match_id = %proposal.match_id, tickets = ?ticket_ids, "Assigned tickets");
                MatchOutcome::Assigned { connection }
            }
            Err(e) => {
                warn!(
                    profile = %profile.name,
                    match_id = %proposal.match_id,
                    connection = %connection,
                    error = %format!("{:#}", e),
                    "Assignment write-back failed, game server left allocated"
                );
                if let Some(metrics) = &self.metrics {
                    metrics.record_stranded_allocation(region);
                }
                MatchOutcome::AssignmentFailed {
                    connection,
                    reason: format!("{:#}", e),
                }
            }
        }
    }
}
