//! Error types for the matchmaking pipeline
//!
//! Results use anyhow for propagation; the variants below name the failure
//! classes the director distinguishes when it logs and abandons work.

/// Result type alias for convenience
pub type Result<T> = anyhow::Result<T>;

/// Custom error types for specific pipeline failures
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Ticket pool query failed for pool '{pool}': {message}")]
    PoolQueryFailed { pool: String, message: String },

    #[error("Match stream failed for profile '{profile}': {message}")]
    MatchStreamFailed { profile: String, message: String },

    #[error("Proposal stream aborted after {sent} of {total} proposals")]
    StreamAborted { sent: usize, total: usize },

    #[error("No allocator configured for region '{region}'")]
    UnknownRegion { region: String },

    #[error("Game server allocation failed in region '{region}': {message}")]
    AllocationFailed { region: String, message: String },

    #[error("Allocation returned no ports for game server at {address}")]
    NoPorts { address: String },

    #[error("Failed to assign {connection} to {ticket_count} tickets: {message}")]
    AssignmentFailed {
        connection: String,
        ticket_count: usize,
        message: String,
    },

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("Internal service error: {message}")]
    InternalError { message: String },
}
