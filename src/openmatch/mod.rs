//! Ticket store collaborators
//!
//! The pipeline is a client of an external ticket store: it queries pools,
//! fetches match proposals and writes assignments back. This module defines
//! those seams as traits, with HTTP clients for a deployed store and an
//! in-memory store for tests and local runs.

pub mod client;
pub mod memory;
pub mod messages;
pub mod ndjson;

use crate::error::Result;
use crate::types::{Match, MatchProfile, Pool, Ticket, TicketId};
use async_trait::async_trait;
use futures::stream::BoxStream;

// Re-export commonly used types
pub use client::{BackendClient, QueryServiceClient};
pub use memory::InMemoryTicketStore;
pub use ndjson::NdjsonStream;

/// Stream of match proposals, ended early by the first error
pub type MatchStream = BoxStream<'static, Result<Match>>;

/// Read access to the tickets of a pool
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TicketPool: Send + Sync {
    /// Return every unassigned ticket in the pool, in pool order
    async fn query_tickets(&self, pool: &Pool) -> Result<Vec<Ticket>>;
}

/// Write-back of connection assignments
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TicketAssigner: Send + Sync {
    /// Assign one connection string to all given tickets in a single call
    async fn assign_tickets(&self, ticket_ids: &[TicketId], connection: &str) -> Result<()>;
}

/// Source of match proposals for a profile
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MatchSource: Send + Sync {
    /// Start a matching run and return its proposals as a stream
    async fn fetch_matches(&self, profile: &MatchProfile) -> Result<MatchStream>;
}
