//! HTTP client for the Agones allocator service
//!
//! Each client is bound to one region: the region is sent as a default
//! `region` header on every request, so distinct regions never share a
//! client or its connection pool.

use super::Allocator;
use crate::error::Result;
use crate::types::{AllocationRequest, AllocationResponse};
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

const ALLOCATION_PATH: &str = "/gameserverallocation";
const REGION_HEADER: &str = "region";

/// Allocator client for a single region
pub struct AgonesAllocatorClient {
    client: Client,
    url: String,
    region: String,
}

impl AgonesAllocatorClient {
    pub fn new(base_url: &str, region: &str, user_agent: &str, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            REGION_HEADER,
            HeaderValue::from_str(region)
                .with_context(|| format!("Invalid region header value: {}", region))?,
        );
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(user_agent)
                .with_context(|| format!("Invalid user agent: {}", user_agent))?,
        );

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .context("Failed to create allocator HTTP client")?;

        Ok(Self {
            client,
            url: format!("{}{}", base_url.trim_end_matches('/'), ALLOCATION_PATH),
            region: region.to_string(),
        })
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Allocator for AgonesAllocatorClient {
    async fn allocate(&self, request: &AllocationRequest) -> Result<AllocationResponse> {
        debug!(region = %self.region, namespace = %request.namespace, "Requesting game server");

        let response = self
            .client
            .post(&self.url)
            .json(request)
            .send()
            .await
            .context("Allocation request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!(
                "HTTP {}: {}",
                status,
                body.chars().take(200).collect::<String>()
            ));
        }

        response
            .json::<AllocationResponse>()
            .await
            .context("Failed to parse allocation response")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_targets_allocation_endpoint() {
        let client = AgonesAllocatorClient::new(
            "http://agones-allocator:8000/",
            "europe-west1",
            "rendezvous/director",
            Duration::from_secs(5),
        )
        .unwrap();

        assert_eq!(client.url(), "http://agones-allocator:8000/gameserverallocation");
        assert_eq!(client.region(), "europe-west1");
    }

    #[test]
    fn test_invalid_region_header_is_rejected() {
        let result = AgonesAllocatorClient::new(
            "http://agones-allocator:8000",
            "bad\nregion",
            "rendezvous/director",
            Duration::from_secs(5),
        );
        assert!(result.is_err());
    }
}
