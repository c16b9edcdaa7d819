use std::time::Duration;

use async_trait::async_trait;
use pe_core::{EngineError, EngineResult, FailureKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerError};
use crate::retry::{with_retry, Retriable};

const MAX_ATTEMPTS: u32 = 3;

/// One request to a Worker (the LLM doing generation, judging, or
/// evolution). `schema_hint` is advisory: the Worker is asked to shape its
/// reply around it but callers must still tolerate prose-wrapped JSON.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerRequest {
    pub role: WorkerRole,
    pub prompt: String,
    pub schema_hint: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerRole {
    Generator,
    Judge,
    Evolver,
}

#[derive(Debug, Clone)]
pub struct WorkerResponse {
    pub raw_text: String,
    pub parsed: Option<Value>,
    pub model: String,
    pub response_id: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// A single failed attempt at calling the Worker. Carries the classification
/// used both by the retry loop (`is_retriable`) and, on final failure, surfaced
/// to the caller as `EngineError::Worker`.
#[derive(Debug, Clone)]
struct WorkerAttemptError {
    kind: FailureKind,
}

impl Retriable for WorkerAttemptError {
    fn is_retriable(&self) -> bool {
        self.kind.is_retriable_by_backoff()
    }
}

#[async_trait]
pub trait WorkerGateway: Send + Sync {
    async fn invoke(&self, request: WorkerRequest) -> EngineResult<WorkerResponse>;
}

/// Worker Gateway (C1): talks to the configured worker endpoint over HTTP,
/// wrapping every call in retry-with-backoff and a circuit breaker.
pub struct HttpWorkerGateway {
    client: reqwest::Client,
    endpoint: String,
    circuit_breaker: CircuitBreaker,
}

impl HttpWorkerGateway {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(60))
                .build()
                .expect("reqwest client builds with static config"),
            endpoint: endpoint.into(),
            circuit_breaker: CircuitBreaker::default(),
        }
    }

    async fn call_once(&self, request: &WorkerRequest) -> Result<WorkerResponse, WorkerAttemptError> {
        let body = serde_json::json!({
            "role": request.role,
            "prompt": request.prompt,
            "schema_hint": request.schema_hint,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|err| classify_transport_error(&err))?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(WorkerAttemptError {
                kind: FailureKind::RateLimited(format!("worker endpoint rate-limited: {status}")),
            });
        }
        if status.is_server_error() {
            return Err(WorkerAttemptError {
                kind: FailureKind::Transient(format!("worker endpoint returned {status}")),
            });
        }
        if !status.is_success() {
            return Err(WorkerAttemptError {
                kind: FailureKind::Fatal(format!("worker endpoint returned {status}")),
            });
        }

        let raw_text = response
            .text()
            .await
            .map_err(|err| classify_transport_error(&err))?;

        parse_worker_response(&raw_text)
    }
}

#[async_trait]
impl WorkerGateway for HttpWorkerGateway {
    async fn invoke(&self, request: WorkerRequest) -> EngineResult<WorkerResponse> {
        let mut attempts_made = 0u32;

        let outcome = with_retry(MAX_ATTEMPTS, || {
            attempts_made += 1;
            let breaker = &self.circuit_breaker;
            async move {
                let result = breaker.call(|| self.call_once(&request)).await;
                match result {
                    Ok(value) => Ok(value),
                    Err(CircuitBreakerError::Open) => Err(WorkerAttemptError {
                        kind: FailureKind::Transient("circuit breaker open".into()),
                    }),
                    Err(CircuitBreakerError::Inner(err)) => Err(err),
                }
            }
        })
        .await;

        let err = match outcome {
            Ok(response) => return Ok(response),
            Err(err) => err,
        };

        // A malformed reply gets one more try with a reinforced instruction
        // before giving up, distinct from the generic backoff retry above
        // (which never touches Malformed/Fatal failures at all).
        if !matches!(err.kind, FailureKind::Malformed(_)) {
            return Err(EngineError::Worker {
                kind: err.kind.clone(),
                attempts: attempts_made,
                last_message: describe(&err.kind),
            });
        }

        attempts_made += 1;
        let reinforced = reinforce_request(&request);
        let breaker = &self.circuit_breaker;
        let retry_result = match breaker.call(|| self.call_once(&reinforced)).await {
            Ok(value) => Ok(value),
            Err(CircuitBreakerError::Open) => Err(WorkerAttemptError {
                kind: FailureKind::Transient("circuit breaker open".into()),
            }),
            Err(CircuitBreakerError::Inner(err)) => Err(err),
        };

        retry_result.map_err(|err| EngineError::Worker {
            kind: err.kind.clone(),
            attempts: attempts_made,
            last_message: describe(&err.kind),
        })
    }
}

/// Builds the retry request sent after a malformed reply: the same role and
/// schema hint, with an explicit instruction appended demanding a single
/// well-formed JSON object and nothing else.
fn reinforce_request(request: &WorkerRequest) -> WorkerRequest {
    WorkerRequest {
        role: request.role,
        prompt: format!(
            "{}\n\nYour previous reply could not be parsed as JSON. Respond again with ONLY a single well-formed JSON object matching the requested shape — no prose before or after it.",
            request.prompt
        ),
        schema_hint: request.schema_hint.clone(),
    }
}

fn classify_transport_error(err: &reqwest::Error) -> WorkerAttemptError {
    if err.is_timeout() || err.is_connect() {
        WorkerAttemptError {
            kind: FailureKind::Transient(err.to_string()),
        }
    } else {
        WorkerAttemptError {
            kind: FailureKind::Fatal(err.to_string()),
        }
    }
}

fn describe(kind: &FailureKind) -> String {
    match kind {
        FailureKind::Transient(m)
        | FailureKind::RateLimited(m)
        | FailureKind::Malformed(m)
        | FailureKind::Fatal(m) => m.clone(),
    }
}

/// Parses the Worker's raw reply. A reply is expected to be JSON but Workers
/// sometimes wrap it in prose ("Here is the proposal: { ... }") — this
/// extracts the first well-formed `{...}` block before giving up, rather than
/// discarding a usable response over formatting noise (spec §4.1 edge case).
fn parse_worker_response(raw_text: &str) -> Result<WorkerResponse, WorkerAttemptError> {
    let parsed = serde_json::from_str::<Value>(raw_text)
        .or_else(|_| extract_first_json_object(raw_text))
        .map_err(|_| WorkerAttemptError {
            kind: FailureKind::Malformed(format!(
                "worker reply contained no well-formed JSON object: {}",
                truncate(raw_text, 200)
            )),
        })?;

    let model = parsed
        .get("model")
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string();
    let response_id = parsed
        .get("response_id")
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string();
    let prompt_tokens = parsed
        .get("usage")
        .and_then(|u| u.get("prompt_tokens"))
        .and_then(Value::as_u64)
        .unwrap_or(0) as u32;
    let completion_tokens = parsed
        .get("usage")
        .and_then(|u| u.get("completion_tokens"))
        .and_then(Value::as_u64)
        .unwrap_or(0) as u32;

    Ok(WorkerResponse {
        raw_text: raw_text.to_string(),
        parsed: Some(parsed),
        model,
        response_id,
        prompt_tokens,
        completion_tokens,
    })
}

fn extract_first_json_object(text: &str) -> Result<Value, serde_json::Error> {
    let start = text.find('{').unwrap_or(0);
    let mut depth = 0i32;
    let mut end = None;
    for (i, ch) in text[start..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    end = Some(start + i + 1);
                    break;
                }
            }
            _ => {}
        }
    }
    match end {
        Some(end) => serde_json::from_str(&text[start..end]),
        None => serde_json::from_str(text),
    }
}

fn truncate(text: &str, max_len: usize) -> String {
    if text.len() <= max_len {
        text.to_string()
    } else {
        format!("{}...", &text[..max_len])
    }
}
