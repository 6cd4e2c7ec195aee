//! Common types used throughout the matchmaking pipeline

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Opaque ticket identifier assigned by the ticket store
pub type TicketId = String;

/// Unique identifier for a match proposal
pub type MatchId = String;

/// Name of the skill attribute carried by every ticket
pub const SKILL_ATTRIBUTE: &str = "skill";

/// Prefix of the per-region latency attributes (`latency-<region>`)
pub const LATENCY_ATTRIBUTE_PREFIX: &str = "latency-";

/// Name recorded on every proposal produced by this match function
pub const MATCH_FUNCTION_NAME: &str = "match-skill-and-latency";

/// Attribute key holding a ticket's latency to the given region, in milliseconds
pub fn latency_attribute(region: &str) -> String {
    format!("{}{}", LATENCY_ATTRIBUTE_PREFIX, region)
}

/// Searchable attributes of a ticket
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchFields {
    /// Named numeric attributes (skill, latency per region, ...)
    #[serde(default)]
    pub double_args: HashMap<String, f64>,
}

impl SearchFields {
    /// Value of a numeric attribute, or 0.0 when the ticket does not carry it
    pub fn double_arg(&self, name: &str) -> f64 {
        self.double_args.get(name).copied().unwrap_or(0.0)
    }
}

/// Connection information committed back to matched tickets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    /// `host:port` of the allocated game server
    pub connection: String,
}

/// A request to be matched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: TicketId,
    #[serde(default)]
    pub search_fields: SearchFields,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignment: Option<Assignment>,
}

impl Ticket {
    /// Create an unassigned ticket with the given attributes
    pub fn new(id: impl Into<TicketId>, double_args: HashMap<String, f64>) -> Self {
        Self {
            id: id.into(),
            search_fields: SearchFields { double_args },
            assignment: None,
        }
    }

    /// Numeric attribute lookup with a neutral default of 0.0
    pub fn attribute(&self, name: &str) -> f64 {
        self.search_fields.double_arg(name)
    }

    /// Skill attribute of this ticket
    pub fn skill(&self) -> f64 {
        self.attribute(SKILL_ATTRIBUTE)
    }

    /// Latency of this ticket to the given region, in milliseconds
    pub fn latency_ms(&self, region: &str) -> f64 {
        self.attribute(&latency_attribute(region))
    }

    pub fn is_assigned(&self) -> bool {
        self.assignment.is_some()
    }
}

/// A filtered view over tickets
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pool {
    pub name: String,
}

/// Matching context passed to one matching run, one per region
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MatchProfile {
    pub name: String,
    pub pools: Vec<Pool>,
}

impl MatchProfile {
    /// Profile drawing from a single pool named after the region
    pub fn for_region(region: &str) -> Self {
        Self {
            name: region.to_string(),
            pools: vec![Pool {
                name: region.to_string(),
            }],
        }
    }

    /// Region this profile matches for (profiles are named after their region)
    pub fn region(&self) -> &str {
        &self.name
    }

    /// The pool tickets are drawn from; profiles carry exactly one
    pub fn primary_pool(&self) -> Option<&Pool> {
        self.pools.first()
    }
}

/// Evaluation input attached to a proposal
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationInput {
    pub score: f64,
}

/// A candidate grouping of tickets proposed for assignment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub match_id: MatchId,
    pub match_profile: String,
    pub match_function: String,
    pub tickets: Vec<Ticket>,
    #[serde(default)]
    pub evaluation_input: EvaluationInput,
}

impl Match {
    /// Aggregate fitness score of the match members
    pub fn score(&self) -> f64 {
        self.evaluation_input.score
    }

    pub fn ticket_ids(&self) -> Vec<TicketId> {
        self.tickets.iter().map(|t| t.id.clone()).collect()
    }
}

/// Request for a ready game server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationRequest {
    pub namespace: String,
}

/// Port exposed by an allocated game server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GamePort {
    #[serde(default)]
    pub name: String,
    pub port: u16,
}

/// Response of the allocator service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationResponse {
    #[serde(default)]
    pub game_server_name: String,
    pub address: String,
    #[serde(default)]
    pub node_name: String,
    #[serde(default)]
    pub ports: Vec<GamePort>,
}

impl AllocationResponse {
    /// The port players connect to. Last entry wins when several are listed.
    pub fn game_port(&self) -> Option<u16> {
        self.ports.last().map(|p| p.port)
    }
}

/// Address of an allocated game server
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GameServerAddress {
    pub address: String,
    pub port: u16,
}

impl GameServerAddress {
    /// Connection string handed to players
    pub fn connection(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

impl std::fmt::Display for GameServerAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}
