//! Game server allocation
//!
//! One allocator client per configured region. The director routes each
//! accepted match to the client of its profile's region and turns the
//! response into a connection string.

pub mod agones;
pub mod mock;

use crate::config::AllocatorSettings;
use crate::error::{PipelineError, Result};
use crate::types::{AllocationRequest, AllocationResponse, GameServerAddress};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

pub use agones::AgonesAllocatorClient;
pub use mock::MockAllocator;

/// A single allocation endpoint
#[async_trait]
pub trait Allocator: Send + Sync {
    /// Reserve a ready game server. No retries happen at this level.
    async fn allocate(&self, request: &AllocationRequest) -> Result<AllocationResponse>;
}

/// Allocator clients keyed by region
#[derive(Clone, Default)]
pub struct RegionalAllocators {
    clients: HashMap<String, Arc<dyn Allocator>>,
}

impl RegionalAllocators {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build one HTTP client per region against the configured allocator
    pub fn from_config(settings: &AllocatorSettings, regions: &[String]) -> Result<Self> {
        let mut allocators = Self::new();
        for region in regions {
            let client = AgonesAllocatorClient::new(
                &settings.url,
                region,
                &settings.user_agent,
                settings.request_timeout(),
            )?;
            allocators.insert(region.clone(), Arc::new(client));
        }
        Ok(allocators)
    }

    pub fn insert(&mut self, region: impl Into<String>, client: Arc<dyn Allocator>) {
        self.clients.insert(region.into(), client);
    }

    pub fn with(mut self, region: impl Into<String>, client: Arc<dyn Allocator>) -> Self {
        self.insert(region, client);
        self
    }

    pub fn regions(&self) -> Vec<&str> {
        let mut regions: Vec<&str> = self.clients.keys().map(String::as_str).collect();
        regions.sort_unstable();
        regions
    }

    pub fn contains(&self, region: &str) -> bool {
        self.clients.contains_key(region)
    }

    /// Allocate a server in `region` and return its address
    ///
    /// A response without ports is a failure. When several ports are listed
    /// the last one is used.
    pub async fn allocate(&self, region: &str, namespace: &str) -> Result<GameServerAddress> {
        let client = self
            .clients
            .get(region)
            .ok_or_else(|| PipelineError::UnknownRegion {
                region: region.to_string(),
            })?;

        let request = AllocationRequest {
            namespace: namespace.to_string(),
        };
        let response = client
            .allocate(&request)
            .await
            .map_err(|e| PipelineError::AllocationFailed {
                region: region.to_string(),
                message: format!("{:#}", e),
            })?;

        let port = response.game_port().ok_or_else(|| PipelineError::NoPorts {
            address: response.address.clone(),
        })?;

        debug!(
            region = region,
            game_server = %response.game_server_name,
            address = %response.address,
            port,
            "Allocated game server"
        );

        Ok(GameServerAddress {
            address: response.address,
            port,
        })
    }
}
