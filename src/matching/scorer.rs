//! Ticket fitness scoring
//!
//! A score maps a ticket's attributes to a single fitness value for one
//! matching context. Higher is better. The grouper only relies on the score
//! rising with skill and falling with latency.

use crate::types::{MatchProfile, Ticket};

/// Fitness of a player with the given skill and latency (milliseconds)
///
/// Latency dominates at the millisecond scale, while skill differences in the
/// low single digits still separate players on the same latency band.
pub fn score(skill: f64, latency_ms: f64) -> f64 {
    skill - (latency_ms / 1000.0)
}

/// Trait for scoring tickets within a matching context
pub trait TicketScorer: Send + Sync {
    /// Score a ticket for the given profile (higher = better fit)
    fn score_ticket(&self, ticket: &Ticket, profile: &MatchProfile) -> f64;
}

/// Skill-and-latency scorer
///
/// Reads the `skill` attribute and the latency to the profile's region.
/// Missing attributes count as 0.
#[derive(Debug, Clone, Copy, Default)]
pub struct SkillLatencyScorer;

impl SkillLatencyScorer {
    pub fn new() -> Self {
        Self
    }
}

impl TicketScorer for SkillLatencyScorer {
    fn score_ticket(&self, ticket: &Ticket, profile: &MatchProfile) -> f64 {
        score(ticket.skill(), ticket.latency_ms(profile.region()))
    }
}
