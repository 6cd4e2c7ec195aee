//! Match function: scoring, grouping and proposal streaming
//!
//! The scorer and grouper are pure. The match function ties them to a ticket
//! pool and streams proposals, either in-process to the director or over HTTP
//! to the ticket store backend.

pub mod function;
pub mod grouper;
pub mod scorer;
pub mod server;

// Re-export commonly used types
pub use function::{send_proposals, MatchFunction};
pub use grouper::{TicketGroup, TicketGrouper};
pub use scorer::{score, SkillLatencyScorer, TicketScorer};
pub use server::{MatchFunctionServer, MatchFunctionServerConfig};
