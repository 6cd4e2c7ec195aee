//! Outcomes of director ticks and running totals

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

/// What happened to one proposal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    /// Server allocated and connection written to every ticket
    Assigned { connection: String },
    /// No server obtained; the tickets stay in the pool
    AllocationFailed { reason: String },
    /// Server allocated but the write-back failed; the server is stranded
    AssignmentFailed { connection: String, reason: String },
}

impl MatchOutcome {
    pub fn is_assigned(&self) -> bool {
        matches!(self, MatchOutcome::Assigned { .. })
    }
}

/// Result of processing one profile during a tick
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProfileReport {
    pub profile: String,
    /// Set when the match stream could not be opened; nothing else was done
    pub fetch_error: Option<String>,
    /// Set when the stream failed after it was opened
    pub stream_error: Option<String>,
    pub matches_received: usize,
    pub matches_assigned: usize,
    pub tickets_assigned: usize,
    pub allocation_failures: usize,
    pub assignment_failures: usize,
}

impl ProfileReport {
    pub fn new(profile: impl Into<String>) -> Self {
        Self {
            profile: profile.into(),
            ..Self::default()
        }
    }

    pub fn skipped(profile: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            fetch_error: Some(error.into()),
            ..Self::new(profile)
        }
    }

    pub fn was_skipped(&self) -> bool {
        self.fetch_error.is_some()
    }

    /// Fold one match outcome into the counters
    pub fn record(&mut self, outcome: &MatchOutcome, ticket_count: usize) {
        match outcome {
            MatchOutcome::Assigned { .. } => {
                self.matches_assigned += 1;
                self.tickets_assigned += ticket_count;
            }
            MatchOutcome::AllocationFailed { .. } => self.allocation_failures += 1,
            MatchOutcome::AssignmentFailed { .. } => self.assignment_failures += 1,
        }
    }
}

/// Result of one full tick across all profiles
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub tick: u64,
    pub duration: Duration,
    /// Reports sorted by profile name
    pub profiles: Vec<ProfileReport>,
}

impl TickReport {
    pub fn profile(&self, name: &str) -> Option<&ProfileReport> {
        self.profiles.iter().find(|p| p.profile == name)
    }

    pub fn matches_assigned(&self) -> usize {
        self.profiles.iter().map(|p| p.matches_assigned).sum()
    }

    pub fn tickets_assigned(&self) -> usize {
        self.profiles.iter().map(|p| p.tickets_assigned).sum()
    }

    pub fn skipped_profiles(&self) -> usize {
        self.profiles.iter().filter(|p| p.was_skipped()).count()
    }
}

/// Running totals since the director started
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DirectorStats {
    pub ticks: u64,
    pub matches_received: u64,
    pub matches_assigned: u64,
    pub tickets_assigned: u64,
    pub allocation_failures: u64,
    pub assignment_failures: u64,
    pub profile_fetch_failures: u64,
    pub stream_failures: u64,
    /// Servers allocated but never handed to players
    pub stranded_allocations: u64,
    pub last_tick_at: Option<DateTime<Utc>>,
}

impl DirectorStats {
    pub fn apply(&mut self, report: &TickReport, at: DateTime<Utc>) {
        self.ticks += 1;
        self.last_tick_at = Some(at);

        for profile in &report.profiles {
            self.matches_received += profile.matches_received as u64;
            self.matches_assigned += profile.matches_assigned as u64;
            self.tickets_assigned += profile.tickets_assigned as u64;
            self.allocation_failures += profile.allocation_failures as u64;
            self.assignment_failures += profile.assignment_failures as u64;
            self.stranded_allocations += profile.assignment_failures as u64;
            if profile.was_skipped() {
                self.profile_fetch_failures += 1;
            }
            if profile.stream_error.is_some() {
                self.stream_failures += 1;
            }
        }
    }
}
