//! Test doubles for the Worker and Search Gateways.
//!
//! `ScriptedWorker` follows the same queue-of-canned-replies idiom already
//! used by every crate's own `#[cfg(test)]` modules; it is promoted here so
//! the end-to-end scenarios don't have to redeclare it per file. `MockWorker`
//! is a `mockall`-generated double for the one scenario that wants
//! call-count/argument expectations rather than a scripted queue.

use async_trait::async_trait;
use pe_core::{EngineError, EngineResult, FailureKind, SearchHit};
use pe_gateway::{SearchGateway, SearchOutcome, WorkerGateway, WorkerRequest, WorkerResponse};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;

/// Replays a fixed queue of raw Worker replies, one per `invoke` call,
/// regardless of the request's role. Panics (via `Vec::remove`) if invoked
/// more times than it has scripted replies — a test that hits this should
/// script one more reply, not paper over it.
pub struct ScriptedWorker {
    replies: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl ScriptedWorker {
    pub fn new(replies: Vec<String>) -> Self {
        Self {
            replies: Mutex::new(replies),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WorkerGateway for ScriptedWorker {
    async fn invoke(&self, _request: WorkerRequest) -> EngineResult<WorkerResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut replies = self.replies.lock().await;
        let raw_text = replies.remove(0);
        Ok(WorkerResponse {
            raw_text,
            parsed: None,
            model: "stub-worker".to_string(),
            response_id: format!("resp-{}", self.calls()),
            prompt_tokens: 10,
            completion_tokens: 20,
        })
    }
}

/// Fails every call with the given `FailureKind`, for round-abort and
/// rate-limit scenarios.
pub struct FailingWorker {
    kind: FailureKind,
}

impl FailingWorker {
    pub fn rate_limited() -> Self {
        Self {
            kind: FailureKind::RateLimited("429 from stub worker".to_string()),
        }
    }

    pub fn fatal() -> Self {
        Self {
            kind: FailureKind::Fatal("stub worker refused the request".to_string()),
        }
    }
}

#[async_trait]
impl WorkerGateway for FailingWorker {
    async fn invoke(&self, _request: WorkerRequest) -> EngineResult<WorkerResponse> {
        Err(EngineError::Worker {
            kind: self.kind.clone(),
            attempts: 3,
            last_message: "stub failure".to_string(),
        })
    }
}

/// Always returns the given hits without ever reaching a real endpoint.
pub struct StubSearchGateway {
    pub hits: Vec<SearchHit>,
    pub degraded: bool,
}

impl StubSearchGateway {
    pub fn healthy(hits: Vec<SearchHit>) -> Self {
        Self { hits, degraded: false }
    }

    pub fn degraded() -> Self {
        Self {
            hits: vec![SearchHit {
                query: String::new(),
                snippet: "No live search results available (mock result 1).".to_string(),
                url: "urn:pe:mock-search:1".to_string(),
                source: "mock-fallback".to_string(),
            }],
            degraded: true,
        }
    }
}

#[async_trait]
impl SearchGateway for StubSearchGateway {
    async fn search(&self, query: &str, max_results: u32) -> EngineResult<SearchOutcome> {
        Ok(SearchOutcome {
            hits: self
                .hits
                .iter()
                .cloned()
                .take(max_results as usize)
                .map(|mut h| {
                    h.query = query.to_string();
                    h
                })
                .collect(),
            degraded: self.degraded,
        })
    }
}

mockall::mock! {
    pub MockWorker {}

    #[async_trait]
    impl WorkerGateway for MockWorker {
        async fn invoke(&self, request: WorkerRequest) -> EngineResult<WorkerResponse>;
    }
}

/// Judges every comparison by picking whichever of the two titles embedded
/// in the prompt sorts first lexicographically. Reads the prompt text
/// itself rather than replaying a script, so it judges correctly
/// regardless of which pair/position order the scheduler calls it in.
pub struct LexicographicJudge;

#[async_trait]
impl WorkerGateway for LexicographicJudge {
    async fn invoke(&self, request: WorkerRequest) -> EngineResult<WorkerResponse> {
        let titles = extract_titles(&request.prompt);
        let winner_title = titles.into_iter().min().unwrap_or_default();
        let raw_text = serde_json::to_string(&serde_json::json!({
            "winner_title": winner_title,
            "rationale": "alphabetically prior title preferred by stub judge",
        }))
        .unwrap();
        Ok(WorkerResponse {
            raw_text,
            parsed: None,
            model: "lexicographic-stub".to_string(),
            response_id: "resp-lex".to_string(),
            prompt_tokens: 1,
            completion_tokens: 1,
        })
    }
}

fn extract_titles(prompt: &str) -> Vec<String> {
    prompt
        .lines()
        .filter_map(|line| line.strip_prefix("Title: ").map(|s| s.trim().to_string()))
        .collect()
}
