//! Integration tests for the rendezvous pipeline
//!
//! These tests run the whole director tick against in-process collaborators,
//! and the HTTP clients against local stub services:
//! - Scoring, grouping, allocation and assignment in one tick
//! - Per-match and per-profile failure isolation
//! - Ticket store and allocator wire formats
//! - Director loop start and stop

mod fixtures;

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use futures::StreamExt;
use rendezvous::allocator::{AgonesAllocatorClient, MockAllocator, RegionalAllocators};
use rendezvous::director::{generate_profiles, Director};
use rendezvous::error::PipelineError;
use rendezvous::matching::MatchFunction;
use rendezvous::openmatch::messages::{
    FetchMatchesResponse, FunctionConfig, FunctionType, QueryTicketsResponse, StreamEnvelope,
};
use rendezvous::openmatch::{
    BackendClient, InMemoryTicketStore, MatchSource, QueryServiceClient, TicketAssigner,
    TicketPool,
};
use rendezvous::types::{EvaluationInput, GamePort, Match, MatchProfile, Pool};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use fixtures::{
    create_test_pipeline, spawn_stub, store_with_skills, ticket, FlakyPool, SlowAllocator,
};

const US: &str = "us-central1";
const EU: &str = "europe-west1";
const TIMEOUT: Duration = Duration::from_secs(5);

fn port(port: u16) -> Vec<GamePort> {
    vec![GamePort {
        name: "default".to_string(),
        port,
    }]
}

type Captured = Arc<Mutex<Vec<Value>>>;

fn ndjson<T: serde::Serialize>(lines: &[T]) -> String {
    lines
        .iter()
        .map(|l| serde_json::to_string(l).unwrap() + "\n")
        .collect()
}

fn ndjson_response(body: String) -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "application/x-ndjson")], body)
}

fn proposal(id: &str, ticket_ids: &[&str]) -> Match {
    Match {
        match_id: id.to_string(),
        match_profile: US.to_string(),
        match_function: "match-skill-and-latency".to_string(),
        tickets: ticket_ids.iter().map(|t| ticket(t, 1.0, &[])).collect(),
        evaluation_input: EvaluationInput { score: 4.0 },
    }
}

#[tokio::test]
async fn test_full_pool_forms_one_match() {
    let store = store_with_skills(&[3.0, 1.0, 2.0, 0.0]);
    let pipeline = create_test_pipeline(store.clone(), store.clone(), &[US], 4);
    pipeline
        .allocator(US)
        .push_success("10.0.0.1", port(7777));

    let report = pipeline.director.tick().await;

    let profile = report.profile(US).unwrap();
    assert_eq!(profile.matches_received, 1);
    assert_eq!(profile.matches_assigned, 1);
    assert_eq!(report.tickets_assigned(), 4);

    let calls = pipeline.assigner.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, vec!["t0", "t2", "t1", "t3"]);
    assert_eq!(calls[0].1, "10.0.0.1:7777");

    for id in ["t0", "t1", "t2", "t3"] {
        assert_eq!(
            store.assignment(id).await.as_deref(),
            Some("10.0.0.1:7777")
        );
    }

    // The proposal carries the summed score
    let proposals = MatchFunction::new(store_with_skills(&[3.0, 1.0, 2.0, 0.0]), 4)
        .propose(&MatchProfile::for_region(US))
        .await
        .unwrap();
    assert_eq!(proposals.len(), 1);
    assert_eq!(proposals[0].score(), 6.0);

    println!("✅ Full pool forms one match test passed");
}

#[tokio::test]
async fn test_leftover_ticket_stays_unassigned() {
    let store = store_with_skills(&[3.0, 1.0, 2.0, 0.0, 4.0]);
    let pipeline = create_test_pipeline(store.clone(), store.clone(), &[US], 4);
    pipeline
        .allocator(US)
        .push_success("10.0.0.1", port(7777));

    let report = pipeline.director.tick().await;

    assert_eq!(report.matches_assigned(), 1);
    assert_eq!(
        pipeline.assigner.calls()[0].0,
        vec!["t4", "t0", "t2", "t1"]
    );
    assert_eq!(store.unassigned_count().await, 1);
    assert!(store.assignment("t3").await.is_none());
}

#[tokio::test]
async fn test_allocation_without_ports_abandons_match() {
    let store = store_with_skills(&[3.0, 1.0, 2.0, 0.0]);
    let pipeline = create_test_pipeline(store.clone(), store.clone(), &[US], 4);
    pipeline.allocator(US).push_success("10.0.0.1", vec![]);

    let report = pipeline.director.tick().await;

    let profile = report.profile(US).unwrap();
    assert_eq!(profile.matches_received, 1);
    assert_eq!(profile.allocation_failures, 1);
    assert_eq!(profile.matches_assigned, 0);
    assert!(pipeline.assigner.calls().is_empty());
    assert_eq!(store.unassigned_count().await, 4);

    // The tickets are picked up again on the next tick
    pipeline
        .allocator(US)
        .push_success("10.0.0.2", port(7000));
    let report = pipeline.director.tick().await;
    assert_eq!(report.matches_assigned(), 1);
    assert_eq!(store.unassigned_count().await, 0);
}

#[tokio::test]
async fn test_failing_profile_does_not_block_others() {
    let store = store_with_skills(&[3.0, 1.0, 2.0, 0.0]);
    let pool = Arc::new(FlakyPool::new(store.clone(), &[EU]));
    let pipeline = create_test_pipeline(store.clone(), pool, &[US, EU], 4);
    pipeline
        .allocator(US)
        .push_success("10.0.0.1", port(7777));

    let report = pipeline.director.tick().await;

    assert_eq!(report.skipped_profiles(), 1);
    let failed = report.profile(EU).unwrap();
    assert!(failed.was_skipped());
    assert!(failed.fetch_error.as_ref().unwrap().contains("connection reset"));

    let healthy = report.profile(US).unwrap();
    assert_eq!(healthy.matches_assigned, 1);
    assert_eq!(store.unassigned_count().await, 0);
    assert_eq!(pipeline.allocator(EU).call_count(), 0);

    let stats = pipeline.director.stats().await;
    assert_eq!(stats.ticks, 1);
    assert_eq!(stats.profile_fetch_failures, 1);
    assert_eq!(stats.matches_assigned, 1);
}

#[tokio::test]
async fn test_regional_profiles_draw_from_their_own_pools() {
    let store = Arc::new(InMemoryTicketStore::with_tickets(vec![
        ticket("us-0", 1.0, &[(US, 20.0)]),
        ticket("eu-0", 1.0, &[(EU, 25.0)]),
        ticket("us-1", 2.0, &[(US, 30.0)]),
        ticket("eu-1", 2.0, &[(EU, 35.0)]),
    ]));
    let pipeline = create_test_pipeline(store.clone(), store.clone(), &[US, EU], 2);
    pipeline
        .allocator(US)
        .push_success("10.0.0.1", port(7001));
    pipeline
        .allocator(EU)
        .push_success("10.0.1.1", port(8001));

    let report = pipeline.director.tick().await;

    assert_eq!(report.matches_assigned(), 2);
    assert_eq!(store.assignment("us-0").await.as_deref(), Some("10.0.0.1:7001"));
    assert_eq!(store.assignment("us-1").await.as_deref(), Some("10.0.0.1:7001"));
    assert_eq!(store.assignment("eu-0").await.as_deref(), Some("10.0.1.1:8001"));
    assert_eq!(store.assignment("eu-1").await.as_deref(), Some("10.0.1.1:8001"));
}

#[tokio::test]
async fn test_shared_tickets_are_assigned_once_across_profiles() {
    let store = store_with_skills(&[3.0, 1.0, 2.0, 0.0]);
    let pipeline = create_test_pipeline(store.clone(), store.clone(), &[US, EU], 4);
    for region in [US, EU] {
        pipeline
            .allocator(region)
            .push_success("10.0.1.1", port(8000));
    }

    let report = pipeline.director.tick().await;

    // Both profiles may propose the same tickets; only one write-back lands
    assert_eq!(report.matches_assigned(), 1);
    assert_eq!(report.tickets_assigned(), 4);
    assert_eq!(store.unassigned_count().await, 0);

    let allocations = pipeline.allocator(US).call_count() + pipeline.allocator(EU).call_count();
    let stats = pipeline.director.stats().await;
    assert_eq!(stats.tickets_assigned, 4);
    assert_eq!(stats.stranded_allocations, allocations as u64 - 1);
    assert_eq!(stats.assignment_failures, stats.stranded_allocations);
}

#[tokio::test]
async fn test_latency_reorders_match_membership() {
    let store = Arc::new(InMemoryTicketStore::with_tickets(vec![
        ticket("near-low", 1.0, &[(US, 10.0)]),
        ticket("far-high", 5.0, &[(US, 9000.0)]),
        ticket("near-mid", 2.0, &[(US, 20.0)]),
        ticket("near-high", 3.0, &[(US, 30.0)]),
        ticket("near-top", 4.0, &[(US, 40.0)]),
    ]));
    let pipeline = create_test_pipeline(store.clone(), store.clone(), &[US], 4);
    pipeline
        .allocator(US)
        .push_success("10.0.0.1", port(7777));

    pipeline.director.tick().await;

    // 9s of latency outweighs the skill lead
    assert!(store.assignment("far-high").await.is_none());
    assert_eq!(store.unassigned_count().await, 1);
}

#[tokio::test]
async fn test_director_loop_assigns_and_stops() {
    let store = store_with_skills(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
    let pipeline = create_test_pipeline(store.clone(), store.clone(), &[US], 4);
    pipeline
        .allocator(US)
        .push_success("10.0.0.1", port(7001));
    pipeline
        .allocator(US)
        .push_success("10.0.0.1", port(7002));

    let handle = pipeline.director.start().unwrap();
    assert!(pipeline.director.is_running());
    assert!(pipeline.director.start().is_none());

    tokio::time::timeout(TIMEOUT, async {
        while store.unassigned_count().await > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("tickets were not assigned in time");

    pipeline.director.stop();
    tokio::time::timeout(TIMEOUT, handle)
        .await
        .expect("director did not stop")
        .unwrap();
    assert!(!pipeline.director.is_running());

    let stats = pipeline.director.stats().await;
    assert!(stats.ticks >= 1);
    assert_eq!(stats.matches_assigned, 2);
    assert_eq!(stats.tickets_assigned, 8);
}

#[tokio::test]
async fn test_query_client_flattens_pages() {
    let captured: Captured = Arc::default();
    let router = Router::new()
        .route(
            "/v1/queryservice/tickets:query",
            post(
                |State(captured): State<Captured>, Json(body): Json<Value>| async move {
                    captured.lock().unwrap().push(body);
                    ndjson_response(ndjson(&[
                        StreamEnvelope::result(QueryTicketsResponse {
                            tickets: vec![ticket("a", 1.0, &[]), ticket("b", 2.0, &[])],
                        }),
                        StreamEnvelope::result(QueryTicketsResponse {
                            tickets: vec![ticket("c", 3.0, &[])],
                        }),
                    ]))
                },
            ),
        )
        .with_state(captured.clone());
    let base_url = spawn_stub(router).await;

    let client = QueryServiceClient::new(base_url, TIMEOUT).unwrap();
    let tickets = client
        .query_tickets(&Pool {
            name: US.to_string(),
        })
        .await
        .unwrap();

    let ids: Vec<&str> = tickets.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
    assert_eq!(captured.lock().unwrap()[0]["pool"]["name"], US);
}

#[tokio::test]
async fn test_query_client_reports_http_errors() {
    let router = Router::new().route(
        "/v1/queryservice/tickets:query",
        post(|| async { (StatusCode::SERVICE_UNAVAILABLE, "query service overloaded") }),
    );
    let base_url = spawn_stub(router).await;

    let client = QueryServiceClient::new(base_url, TIMEOUT).unwrap();
    let error = client
        .query_tickets(&Pool {
            name: US.to_string(),
        })
        .await
        .unwrap_err();

    match error.downcast_ref::<PipelineError>() {
        Some(PipelineError::PoolQueryFailed { pool, message }) => {
            assert_eq!(pool, US);
            assert!(message.contains("503"));
            assert!(message.contains("overloaded"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_backend_stream_ends_at_error_line() {
    let captured: Captured = Arc::default();
    let router = Router::new()
        .route(
            "/v1/backendservice/matches:fetch",
            post(
                |State(captured): State<Captured>, Json(body): Json<Value>| async move {
                    captured.lock().unwrap().push(body);
                    let mut body = ndjson(&[
                        StreamEnvelope::result(FetchMatchesResponse {
                            proposal: proposal("m-0", &["a", "b"]),
                        }),
                        StreamEnvelope::result(FetchMatchesResponse {
                            proposal: proposal("m-1", &["c", "d"]),
                        }),
                    ]);
                    body.push_str(&ndjson(&[StreamEnvelope::<FetchMatchesResponse>::error(
                        13,
                        "match function crashed",
                    )]));
                    ndjson_response(body)
                },
            ),
        )
        .with_state(captured.clone());
    let base_url = spawn_stub(router).await;

    let client = BackendClient::new(
        base_url,
        FunctionConfig {
            host: "mmf.local".to_string(),
            port: 51502,
            function_type: FunctionType::Rest,
        },
        TIMEOUT,
    )
    .unwrap();

    let items: Vec<_> = client
        .fetch_matches(&MatchProfile::for_region(US))
        .await
        .unwrap()
        .collect()
        .await;

    assert_eq!(items.len(), 3);
    assert_eq!(items[0].as_ref().unwrap().match_id, "m-0");
    assert_eq!(items[1].as_ref().unwrap().match_id, "m-1");
    let error = items[2].as_ref().unwrap_err();
    assert!(format!("{:#}", error).contains("match function crashed"));

    let request = &captured.lock().unwrap()[0];
    assert_eq!(request["config"]["type"], "REST");
    assert_eq!(request["config"]["port"], 51502);
    assert_eq!(request["profile"]["name"], US);
}

#[tokio::test]
async fn test_backend_assign_accepts_empty_and_partial_bodies() {
    let captured: Captured = Arc::default();
    let router = Router::new()
        .route(
            "/v1/backendservice/tickets:assign",
            post(
                |State(captured): State<Captured>, Json(body): Json<Value>| async move {
                    let first = {
                        let mut captured = captured.lock().unwrap();
                        captured.push(body);
                        captured.len() == 1
                    };
                    if first {
                        String::new()
                    } else {
                        json!({"failures": [{"ticket_id": "b", "cause": "NOT_FOUND"}]}).to_string()
                    }
                },
            ),
        )
        .with_state(captured.clone());
    let base_url = spawn_stub(router).await;

    let client = BackendClient::new(
        base_url,
        FunctionConfig {
            host: "mmf.local".to_string(),
            port: 51502,
            function_type: FunctionType::Rest,
        },
        TIMEOUT,
    )
    .unwrap();
    let ids = vec!["a".to_string(), "b".to_string()];

    client.assign_tickets(&ids, "10.0.0.1:7777").await.unwrap();
    client.assign_tickets(&ids, "10.0.0.1:7777").await.unwrap();

    let requests = captured.lock().unwrap();
    assert_eq!(requests.len(), 2);
    let group = &requests[0]["assignments"][0];
    assert_eq!(group["assignment"]["connection"], "10.0.0.1:7777");
}

#[tokio::test]
async fn test_backend_assign_http_error_fails() {
    let router = Router::new().route(
        "/v1/backendservice/tickets:assign",
        post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "store unavailable") }),
    );
    let base_url = spawn_stub(router).await;

    let client = BackendClient::new(
        base_url,
        FunctionConfig {
            host: "mmf.local".to_string(),
            port: 51502,
            function_type: FunctionType::Rest,
        },
        TIMEOUT,
    )
    .unwrap();

    let error = client
        .assign_tickets(&["a".to_string()], "10.0.0.1:7777")
        .await
        .unwrap_err();
    assert!(matches!(
        error.downcast_ref::<PipelineError>(),
        Some(PipelineError::AssignmentFailed { ticket_count: 1, .. })
    ));
}

#[tokio::test]
async fn test_agones_client_sends_region_and_uses_last_port() {
    let regions: Arc<Mutex<Vec<String>>> = Arc::default();
    let router = Router::new()
        .route(
            "/gameserverallocation",
            post(
                |State(regions): State<Arc<Mutex<Vec<String>>>>,
                 headers: HeaderMap,
                 Json(body): Json<Value>| async move {
                    let region = headers
                        .get("region")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default()
                        .to_string();
                    regions.lock().unwrap().push(region);
                    assert_eq!(body["namespace"], "games");
                    Json(json!({
                        "gameServerName": "gs-1",
                        "address": "34.1.2.3",
                        "nodeName": "node-a",
                        "ports": [
                            {"name": "http", "port": 8080},
                            {"name": "game", "port": 7777}
                        ]
                    }))
                },
            ),
        )
        .with_state(regions.clone());
    let base_url = spawn_stub(router).await;

    let client =
        AgonesAllocatorClient::new(&base_url, EU, "rendezvous/test", TIMEOUT).unwrap();
    let allocators = RegionalAllocators::new().with(EU, Arc::new(client));

    let address = allocators.allocate(EU, "games").await.unwrap();
    assert_eq!(address.connection(), "34.1.2.3:7777");
    assert_eq!(regions.lock().unwrap().as_slice(), [EU.to_string()]);
}

#[tokio::test]
async fn test_director_over_http_backend() {
    let assigned: Captured = Arc::default();
    let router = Router::new()
        .route(
            "/v1/backendservice/matches:fetch",
            post(|| async {
                ndjson_response(ndjson(&[StreamEnvelope::result(FetchMatchesResponse {
                    proposal: proposal("m-0", &["a", "b", "c", "d"]),
                })]))
            }),
        )
        .route(
            "/v1/backendservice/tickets:assign",
            post(
                |State(assigned): State<Captured>, Json(body): Json<Value>| async move {
                    assigned.lock().unwrap().push(body);
                    Json(json!({}))
                },
            ),
        )
        .with_state(assigned.clone());
    let base_url = spawn_stub(router).await;

    let backend = Arc::new(
        BackendClient::new(
            base_url,
            FunctionConfig {
                host: "mmf.local".to_string(),
                port: 51502,
                function_type: FunctionType::Rest,
            },
            TIMEOUT,
        )
        .unwrap(),
    );
    let allocator = Arc::new(MockAllocator::with_fallback("10.1.1.1", 7000));
    let director = Director::new(
        generate_profiles(&[US.to_string()]),
        backend.clone(),
        backend,
        RegionalAllocators::new().with(US, allocator.clone()),
    )
    .with_namespace("games");

    let report = director.tick().await;

    assert_eq!(report.matches_assigned(), 1);
    assert_eq!(allocator.requests()[0].namespace, "games");
    let assigned = assigned.lock().unwrap();
    assert_eq!(assigned.len(), 1);
    assert_eq!(
        assigned[0]["assignments"][0]["assignment"]["connection"],
        "10.1.1.1:7000"
    );
    assert_eq!(
        assigned[0]["assignments"][0]["ticket_ids"]
            .as_array()
            .map(|ids| ids.len()),
        Some(4)
    );
}

#[tokio::test]
async fn test_slow_allocations_do_not_cut_the_match_stream() {
    let assigned: Captured = Arc::default();
    let router = Router::new()
        .route(
            "/v1/backendservice/matches:fetch",
            post(|| async {
                let lines: Vec<_> = (0..4)
                    .map(|i| {
                        let ids = [format!("a{}", i), format!("b{}", i)];
                        StreamEnvelope::result(FetchMatchesResponse {
                            proposal: proposal(
                                &format!("m-{}", i),
                                &[ids[0].as_str(), ids[1].as_str()],
                            ),
                        })
                    })
                    .collect();
                ndjson_response(ndjson(&lines))
            }),
        )
        .route(
            "/v1/backendservice/tickets:assign",
            post(
                |State(assigned): State<Captured>, Json(body): Json<Value>| async move {
                    assigned.lock().unwrap().push(body);
                    Json(json!({}))
                },
            ),
        )
        .with_state(assigned.clone());
    let base_url = spawn_stub(router).await;

    // Four allocations take longer than the client timeout in total
    let backend = Arc::new(
        BackendClient::new(
            base_url,
            FunctionConfig {
                host: "mmf.local".to_string(),
                port: 51502,
                function_type: FunctionType::Rest,
            },
            Duration::from_secs(1),
        )
        .unwrap(),
    );
    let mock = Arc::new(MockAllocator::with_fallback("10.1.1.1", 7000));
    let slow = Arc::new(SlowAllocator::new(mock.clone(), Duration::from_millis(400)));
    let director = Director::new(
        generate_profiles(&[US.to_string()]),
        backend.clone(),
        backend,
        RegionalAllocators::new().with(US, slow),
    );

    let report = director.tick().await;

    let profile = report.profile(US).unwrap();
    assert!(profile.stream_error.is_none(), "{:?}", profile.stream_error);
    assert_eq!(profile.matches_received, 4);
    assert_eq!(profile.matches_assigned, 4);
    assert_eq!(mock.call_count(), 4);
    assert_eq!(assigned.lock().unwrap().len(), 4);
}
