//! Rendezvous - matchmaking director pipeline
//!
//! Groups waiting players into skill-ordered matches, allocates a game server
//! in the profile's region for each match and writes the connection string
//! back onto the matched tickets.

pub mod allocator;
pub mod config;
pub mod director;
pub mod error;
pub mod matching;
pub mod metrics;
pub mod openmatch;
pub mod service;
pub mod types;
pub mod utils;

// Re-export commonly used types and traits
pub use error::{PipelineError, Result};
pub use types::*;

// Re-export key components
pub use allocator::{Allocator, RegionalAllocators};
pub use director::Director;
pub use matching::MatchFunction;
pub use openmatch::{MatchSource, TicketAssigner, TicketPool};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
