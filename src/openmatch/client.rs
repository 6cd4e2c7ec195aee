//! HTTP/JSON clients for a deployed ticket store
//!
//! Streaming endpoints answer with newline-delimited JSON envelopes. The query
//! service is read-only; the backend fetches proposals and takes assignments.

use super::messages::{
    AssignTicketsRequest, AssignTicketsResponse, FetchMatchesRequest, FetchMatchesResponse,
    FunctionConfig, QueryTicketsRequest, QueryTicketsResponse,
};
use super::ndjson::NdjsonStream;
use super::{MatchSource, MatchStream, TicketAssigner, TicketPool};
use crate::error::{PipelineError, Result};
use crate::types::{MatchProfile, Pool, Ticket, TicketId};
use anyhow::Context;
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use reqwest::{Client, Response};
use std::time::Duration;
use tracing::{debug, warn};

const QUERY_TICKETS_PATH: &str = "/v1/queryservice/tickets:query";
const FETCH_MATCHES_PATH: &str = "/v1/backendservice/matches:fetch";
const ASSIGN_TICKETS_PATH: &str = "/v1/backendservice/tickets:assign";

fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .context("Failed to create HTTP client")
}

/// Client whose timeouts bound connecting and each read, not the whole body
fn build_streaming_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .connect_timeout(timeout)
        .read_timeout(timeout)
        .build()
        .context("Failed to create HTTP client")
}

fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), path)
}

/// Turn a non-success response into an error carrying a short body excerpt
async fn check_status(response: Response) -> std::result::Result<Response, String> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(format!(
        "HTTP {}: {}",
        status,
        body.chars().take(200).collect::<String>()
    ))
}

/// Client for the query service
pub struct QueryServiceClient {
    client: Client,
    base_url: String,
}

impl QueryServiceClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: base_url.into(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl TicketPool for QueryServiceClient {
    async fn query_tickets(&self, pool: &Pool) -> Result<Vec<Ticket>> {
        let pool_error = |message: String| PipelineError::PoolQueryFailed {
            pool: pool.name.clone(),
            message,
        };

        let response = self
            .client
            .post(endpoint(&self.base_url, QUERY_TICKETS_PATH))
            .json(&QueryTicketsRequest { pool: pool.clone() })
            .send()
            .await
            .map_err(|e| pool_error(e.to_string()))?;
        let response = check_status(response).await.map_err(&pool_error)?;

        // The query service pages its results; flatten every page in order
        let pages: Vec<QueryTicketsResponse> = NdjsonStream::new(response.bytes_stream())
            .try_collect()
            .await
            .map_err(|e| pool_error(e.to_string()))?;
        let tickets: Vec<Ticket> = pages.into_iter().flat_map(|p| p.tickets).collect();

        debug!(pool = %pool.name, count = tickets.len(), "Queried pool");
        Ok(tickets)
    }
}

/// Client for the backend service
pub struct BackendClient {
    client: Client,
    base_url: String,
    function: FunctionConfig,
    timeout: Duration,
}

impl BackendClient {
    /// `function` tells the backend where to reach the match function.
    /// The match stream may stay open longer than `timeout` as long as it
    /// keeps delivering; assignments must finish within it.
    pub fn new(
        base_url: impl Into<String>,
        function: FunctionConfig,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            client: build_streaming_client(timeout)?,
            base_url: base_url.into(),
            function,
            timeout,
        })
    }

    pub fn function(&self) -> &FunctionConfig {
        &self.function
    }
}

#[async_trait]
impl MatchSource for BackendClient {
    async fn fetch_matches(&self, profile: &MatchProfile) -> Result<MatchStream> {
        let profile_name = profile.name.clone();
        let stream_error = move |message: String| PipelineError::MatchStreamFailed {
            profile: profile_name.clone(),
            message,
        };

        let request = FetchMatchesRequest {
            config: self.function.clone(),
            profile: profile.clone(),
        };

        let response = self
            .client
            .post(endpoint(&self.base_url, FETCH_MATCHES_PATH))
            .json(&request)
            .send()
            .await
            .map_err(|e| stream_error(e.to_string()))?;
        let response = check_status(response).await.map_err(&stream_error)?;

        let stream = NdjsonStream::<FetchMatchesResponse>::new(response.bytes_stream())
            .map_ok(|r| r.proposal)
            .map_err(move |e| anyhow::Error::from(stream_error(e.to_string())));

        Ok(stream.boxed())
    }
}

#[async_trait]
impl TicketAssigner for BackendClient {
    async fn assign_tickets(&self, ticket_ids: &[TicketId], connection: &str) -> Result<()> {
        let assign_error = |message: String| PipelineError::AssignmentFailed {
            connection: connection.to_string(),
            ticket_count: ticket_ids.len(),
            message,
        };

        let response = self
            .client
            .post(endpoint(&self.base_url, ASSIGN_TICKETS_PATH))
            .timeout(self.timeout)
            .json(&AssignTicketsRequest::single(ticket_ids, connection))
            .send()
            .await
            .map_err(|e| assign_error(e.to_string()))?;
        let response = check_status(response).await.map_err(&assign_error)?;

        // An empty body is a successful assignment with no failures
        let body = response.text().await.map_err(|e| assign_error(e.to_string()))?;
        let result: AssignTicketsResponse = if body.trim().is_empty() {
            AssignTicketsResponse::default()
        } else {
            serde_json::from_str(&body).map_err(|e| assign_error(e.to_string()))?
        };

        if !result.failures.is_empty() {
            warn!(
                connection = %connection,
                failed = result.failures.len(),
                "Ticket store reported per-ticket assignment failures"
            );
        }

        Ok(())
    }
}
