//! Utility functions for the matchmaking pipeline

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Generate a new unique ticket ID
pub fn generate_ticket_id() -> String {
    Uuid::new_v4().to_string()
}

/// Get the current UTC timestamp
pub fn current_timestamp() -> DateTime<Utc> {
    Utc::now()
}

/// Prefix shared by all proposals of one matching run
pub fn match_id_prefix(profile_name: &str, at: DateTime<Utc>) -> String {
    format!(
        "profile-{}-time-{}",
        profile_name,
        at.format("%Y-%m-%dT%H:%M:%S%.3f")
    )
}

/// Id of the n-th proposal of a run
pub fn match_id(prefix: &str, index: usize) -> String {
    format!("{}-{}", prefix, index)
}
