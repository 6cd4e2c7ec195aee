//! Test fixtures and collaborator doubles for integration testing

use async_trait::async_trait;
use axum::Router;
use rendezvous::allocator::{Allocator, MockAllocator, RegionalAllocators};
use rendezvous::director::{generate_profiles, Director};
use rendezvous::error::{PipelineError, Result};
use rendezvous::matching::MatchFunction;
use rendezvous::openmatch::{InMemoryTicketStore, TicketAssigner, TicketPool};
use rendezvous::types::{
    latency_attribute, AllocationRequest, AllocationResponse, Pool, Ticket, TicketId,
    SKILL_ATTRIBUTE,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

/// Ticket with a skill and optional per-region latencies
pub fn ticket(id: &str, skill: f64, latencies: &[(&str, f64)]) -> Ticket {
    let mut args = HashMap::new();
    args.insert(SKILL_ATTRIBUTE.to_string(), skill);
    for (region, latency) in latencies {
        args.insert(latency_attribute(region), *latency);
    }
    Ticket::new(id, args)
}

/// Store preloaded with zero-latency tickets `t0..tN`
pub fn store_with_skills(skills: &[f64]) -> Arc<InMemoryTicketStore> {
    let tickets = skills
        .iter()
        .enumerate()
        .map(|(i, s)| ticket(&format!("t{}", i), *s, &[]))
        .collect();
    Arc::new(InMemoryTicketStore::with_tickets(tickets))
}

/// Pool that fails queries for some pools and serves the rest from a store
pub struct FlakyPool {
    store: Arc<InMemoryTicketStore>,
    failing: HashSet<String>,
}

impl FlakyPool {
    pub fn new(store: Arc<InMemoryTicketStore>, failing: &[&str]) -> Self {
        Self {
            store,
            failing: failing.iter().map(|p| p.to_string()).collect(),
        }
    }
}

#[async_trait]
impl TicketPool for FlakyPool {
    async fn query_tickets(&self, pool: &Pool) -> Result<Vec<Ticket>> {
        if self.failing.contains(&pool.name) {
            return Err(PipelineError::PoolQueryFailed {
                pool: pool.name.clone(),
                message: "connection reset by peer".to_string(),
            }
            .into());
        }
        self.store.query_tickets(pool).await
    }
}

/// Assigner that records every call before writing through to a store
pub struct RecordingAssigner {
    store: Arc<InMemoryTicketStore>,
    calls: Mutex<Vec<(Vec<TicketId>, String)>>,
}

impl RecordingAssigner {
    pub fn new(store: Arc<InMemoryTicketStore>) -> Self {
        Self {
            store,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Assignment calls received so far
    pub fn calls(&self) -> Vec<(Vec<TicketId>, String)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl TicketAssigner for RecordingAssigner {
    async fn assign_tickets(&self, ticket_ids: &[TicketId], connection: &str) -> Result<()> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((ticket_ids.to_vec(), connection.to_string()));
        }
        self.store.assign_tickets(ticket_ids, connection).await
    }
}

/// Allocator that waits before answering from a mock
pub struct SlowAllocator {
    inner: Arc<MockAllocator>,
    delay: Duration,
}

impl SlowAllocator {
    pub fn new(inner: Arc<MockAllocator>, delay: Duration) -> Self {
        Self { inner, delay }
    }
}

#[async_trait]
impl Allocator for SlowAllocator {
    async fn allocate(&self, request: &AllocationRequest) -> Result<AllocationResponse> {
        tokio::time::sleep(self.delay).await;
        self.inner.allocate(request).await
    }
}

/// Complete pipeline wired in-process
pub struct TestPipeline {
    pub director: Director,
    pub store: Arc<InMemoryTicketStore>,
    pub assigner: Arc<RecordingAssigner>,
    pub allocators: Vec<(String, Arc<MockAllocator>)>,
}

impl TestPipeline {
    pub fn allocator(&self, region: &str) -> Arc<MockAllocator> {
        self.allocators
            .iter()
            .find(|(r, _)| r == region)
            .map(|(_, a)| a.clone())
            .expect("no allocator for region")
    }
}

/// Build a director over an in-process match function, one mock allocator per region
pub fn create_test_pipeline(
    store: Arc<InMemoryTicketStore>,
    pool: Arc<dyn TicketPool>,
    regions: &[&str],
    tickets_per_match: usize,
) -> TestPipeline {
    let regions: Vec<String> = regions.iter().map(|r| r.to_string()).collect();

    let mut registry = RegionalAllocators::new();
    let mut allocators = Vec::new();
    for region in &regions {
        let allocator = Arc::new(MockAllocator::new());
        registry.insert(region.clone(), allocator.clone());
        allocators.push((region.clone(), allocator));
    }

    let assigner = Arc::new(RecordingAssigner::new(store.clone()));
    let function = Arc::new(MatchFunction::new(pool, tickets_per_match));
    let director = Director::new(
        generate_profiles(&regions),
        function,
        assigner.clone(),
        registry,
    )
    .with_poll_interval(Duration::from_millis(20));

    TestPipeline {
        director,
        store,
        assigner,
        allocators,
    }
}

/// Serve a router on an ephemeral local port and return its base URL
pub async fn spawn_stub(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind stub listener");
    let addr = listener.local_addr().expect("Stub has no local address");
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    format!("http://{}", addr)
}
