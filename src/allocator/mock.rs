//! Scripted allocator test double

use super::Allocator;
use crate::error::{PipelineError, Result};
use crate::types::{AllocationRequest, AllocationResponse, GamePort};
use anyhow::anyhow;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Outcome of one scripted allocation
#[derive(Debug, Clone)]
pub enum ScriptedAllocation {
    Success(AllocationResponse),
    Failure(String),
}

/// Mock allocator returning scripted responses in order
///
/// Once the script runs out, a mock built with [`MockAllocator::with_fallback`]
/// answers with a fixed address and a new port per call.
#[derive(Debug, Default)]
pub struct MockAllocator {
    script: Mutex<VecDeque<ScriptedAllocation>>,
    requests: Mutex<Vec<AllocationRequest>>,
    fallback: Option<(String, u16)>,
}

impl MockAllocator {
    /// Mock with an empty script; calls past the script fail
    pub fn new() -> Self {
        Self::default()
    }

    /// Mock that hands out `address` with ports counting up from `first_port`
    pub fn with_fallback(address: impl Into<String>, first_port: u16) -> Self {
        Self {
            fallback: Some((address.into(), first_port)),
            ..Self::default()
        }
    }

    pub fn push_success(&self, address: impl Into<String>, ports: Vec<GamePort>) {
        let address = address.into();
        self.push(ScriptedAllocation::Success(AllocationResponse {
            game_server_name: format!("gameserver-{}", address),
            address,
            node_name: "mock-node".to_string(),
            ports,
        }));
    }

    pub fn push_failure(&self, message: impl Into<String>) {
        self.push(ScriptedAllocation::Failure(message.into()));
    }

    pub fn push(&self, outcome: ScriptedAllocation) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(outcome);
        }
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<AllocationRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or_default()
    }
}

#[async_trait]
impl Allocator for MockAllocator {
    async fn allocate(&self, request: &AllocationRequest) -> Result<AllocationResponse> {
        let call_index = {
            let mut requests = self
                .requests
                .lock()
                .map_err(|_| PipelineError::InternalError {
                    message: "Failed to acquire requests lock".to_string(),
                })?;
            requests.push(request.clone());
            requests.len() - 1
        };

        let next = self
            .script
            .lock()
            .map_err(|_| PipelineError::InternalError {
                message: "Failed to acquire script lock".to_string(),
            })?
            .pop_front();

        match (next, &self.fallback) {
            (Some(ScriptedAllocation::Success(response)), _) => Ok(response),
            (Some(ScriptedAllocation::Failure(message)), _) => Err(anyhow!(message)),
            (None, Some((address, first_port))) => Ok(AllocationResponse {
                game_server_name: format!("gameserver-{}", call_index),
                address: address.clone(),
                node_name: "mock-node".to_string(),
                ports: vec![GamePort {
                    name: "default".to_string(),
                    port: first_port.wrapping_add(call_index as u16),
                }],
            }),
            (None, None) => Err(anyhow!("No scripted allocation left")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> AllocationRequest {
        AllocationRequest {
            namespace: "default".to_string(),
        }
    }

    #[tokio::test]
    async fn test_script_is_consumed_in_order() {
        let mock = MockAllocator::new();
        mock.push_failure("quota exceeded");
        mock.push_success(
            "10.0.0.9",
            vec![GamePort {
                name: "default".to_string(),
                port: 7777,
            }],
        );

        assert!(mock.allocate(&request()).await.is_err());
        let response = mock.allocate(&request()).await.unwrap();
        assert_eq!(response.address, "10.0.0.9");
        assert!(mock.allocate(&request()).await.is_err());
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn test_fallback_hands_out_distinct_ports() {
        let mock = MockAllocator::with_fallback("127.0.0.1", 7000);

        let first = mock.allocate(&request()).await.unwrap();
        let second = mock.allocate(&request()).await.unwrap();

        assert_eq!(first.game_port(), Some(7000));
        assert_eq!(second.game_port(), Some(7001));
    }

    #[tokio::test]
    async fn test_fallback_starts_after_script() {
        let mock = MockAllocator::with_fallback("127.0.0.1", 7000);
        mock.push_failure("quota exceeded");

        assert!(mock.allocate(&request()).await.is_err());
        let response = mock.allocate(&request()).await.unwrap();
        assert_eq!(response.address, "127.0.0.1");
        assert_eq!(response.game_port(), Some(7001));
    }
}
