//! Wire messages exchanged with the ticket store over HTTP/JSON

use crate::types::{Assignment, Match, MatchProfile, Pool, Ticket, TicketId};
use serde::{Deserialize, Serialize};

/// Envelope of one line of a streamed response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamEnvelope<T> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcStatus>,
}

impl<T> StreamEnvelope<T> {
    pub fn result(value: T) -> Self {
        Self {
            result: Some(value),
            error: None,
        }
    }

    pub fn error(code: i32, message: impl Into<String>) -> Self {
        Self {
            result: None,
            error: Some(RpcStatus {
                code,
                message: message.into(),
            }),
        }
    }
}

/// Error status carried in a stream line or an error response body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcStatus {
    #[serde(default)]
    pub code: i32,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryTicketsRequest {
    pub pool: Pool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryTicketsResponse {
    #[serde(default)]
    pub tickets: Vec<Ticket>,
}

/// Transport the backend uses to call the match function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FunctionType {
    Grpc,
    Rest,
}

/// Where the backend finds the match function
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionConfig {
    pub host: String,
    pub port: u16,
    #[serde(rename = "type")]
    pub function_type: FunctionType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchMatchesRequest {
    pub config: FunctionConfig,
    pub profile: MatchProfile,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchMatchesResponse {
    #[serde(rename = "match")]
    pub proposal: Match,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentGroup {
    pub ticket_ids: Vec<TicketId>,
    pub assignment: Assignment,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignTicketsRequest {
    pub assignments: Vec<AssignmentGroup>,
}

impl AssignTicketsRequest {
    /// Request assigning one connection to a batch of tickets
    pub fn single(ticket_ids: &[TicketId], connection: &str) -> Self {
        Self {
            assignments: vec![AssignmentGroup {
                ticket_ids: ticket_ids.to_vec(),
                assignment: Assignment {
                    connection: connection.to_string(),
                },
            }],
        }
    }
}

/// Ticket the store could not assign
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentFailure {
    pub ticket_id: TicketId,
    #[serde(default)]
    pub cause: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssignTicketsResponse {
    #[serde(default)]
    pub failures: Vec<AssignmentFailure>,
}

/// Request served by the match function endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRequest {
    pub profile: MatchProfile,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResponse {
    pub proposal: Match,
}
