//! Worker/Search Gateway retry, classification, and circuit-breaker
//! behavior exercised against `wiremock`-stubbed HTTP endpoints so none of
//! this needs a real network call.

use pe_core::{EngineError, FailureKind};
use pe_gateway::{HttpSearchGateway, HttpWorkerGateway, SearchGateway, WorkerGateway, WorkerRequest, WorkerRole};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn worker_request() -> WorkerRequest {
    WorkerRequest {
        role: WorkerRole::Judge,
        prompt: "compare these two proposals".to_string(),
        schema_hint: None,
    }
}

#[tokio::test]
async fn worker_gateway_parses_a_well_formed_reply_on_first_try() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "judge-v1",
            "response_id": "resp-1",
            "winner_title": "Tax single-use bags",
            "usage": {"prompt_tokens": 12, "completion_tokens": 30},
        })))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = HttpWorkerGateway::new(server.uri());
    let response = gateway.invoke(worker_request()).await.unwrap();

    assert_eq!(response.model, "judge-v1");
    assert_eq!(response.prompt_tokens, 12);
    assert_eq!(response.completion_tokens, 30);
}

#[tokio::test]
async fn worker_gateway_classifies_429_as_rate_limited_and_exhausts_its_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(429))
        .expect(3)
        .mount(&server)
        .await;

    let gateway = HttpWorkerGateway::new(server.uri());
    let err = gateway.invoke(worker_request()).await.unwrap_err();

    match err {
        EngineError::Worker { kind: FailureKind::RateLimited(_), attempts, .. } => assert_eq!(attempts, 3),
        other => panic!("expected RateLimited after exhausting retries, got {other:?}"),
    }
}

/// A malformed reply earns exactly one reinforced-instruction retry before
/// the gateway gives up, distinct from the generic backoff retries Transient
/// failures get.
#[tokio::test]
async fn worker_gateway_retries_a_malformed_reply_once_with_a_reinforced_instruction() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("no JSON in here at all"))
        .expect(2)
        .mount(&server)
        .await;

    let gateway = HttpWorkerGateway::new(server.uri());
    let err = gateway.invoke(worker_request()).await.unwrap_err();

    match err {
        EngineError::Worker { kind: FailureKind::Malformed(_), attempts, .. } => assert_eq!(attempts, 2),
        other => panic!("expected Malformed after the reinforced retry, got {other:?}"),
    }
}

/// If the reinforced retry succeeds, its parsed reply is returned rather
/// than the original failure.
#[tokio::test]
async fn worker_gateway_accepts_a_well_formed_reply_on_the_reinforced_retry() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("no JSON in here at all"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "judge-v1",
            "response_id": "resp-2",
            "winner_title": "Tax single-use bags",
            "usage": {"prompt_tokens": 20, "completion_tokens": 8},
        })))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = HttpWorkerGateway::new(server.uri());
    let response = gateway.invoke(worker_request()).await.unwrap();

    assert_eq!(response.model, "judge-v1");
}

/// A Worker endpoint that fails every call trips the circuit breaker after
/// its consecutive-failure threshold, after which further attempts are
/// rejected locally and never reach the mock server at all. The endpoint
/// therefore sees fewer requests than `attempts-per-call * calls-made`
/// would predict if the breaker weren't suppressing them.
#[tokio::test(start_paused = true)]
async fn worker_gateway_circuit_breaker_suppresses_calls_once_tripped() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(500))
        .expect(5)
        .mount(&server)
        .await;

    let gateway = HttpWorkerGateway::new(server.uri());
    for _ in 0..3 {
        let _ = gateway.invoke(worker_request()).await;
    }
}

#[tokio::test]
async fn search_gateway_reports_healthy_hits_from_the_primary_provider() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"url": "https://example.org/a", "snippet": "cities saw a drop in litter"},
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = HttpSearchGateway::new(server.uri(), None);
    let outcome = gateway.search("ban single-use plastic bags", 5).await.unwrap();

    assert!(!outcome.degraded);
    assert_eq!(outcome.hits.len(), 1);
    assert_eq!(outcome.hits[0].url, "https://example.org/a");
}

/// With no secondary endpoint configured, a failing primary falls all the
/// way through to the deterministic mock hit list, reporting degraded
/// rather than propagating an error.
#[tokio::test]
async fn search_gateway_falls_back_to_mock_hits_when_primary_is_unreachable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let gateway = HttpSearchGateway::new(server.uri(), None);
    let outcome = gateway.search("ban single-use plastic bags", 2).await.unwrap();

    assert!(outcome.degraded);
    assert!(!outcome.hits.is_empty());
    assert!(outcome.hits.iter().all(|h| h.source == "mock-fallback"));
}
