use async_trait::async_trait;
use pe_core::{EngineResult, SearchHit};
use serde::Deserialize;

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerError};
use crate::retry::{with_retry, Retriable};
use pe_core::FailureKind;

const MAX_ATTEMPTS: u32 = 3;

#[async_trait]
pub trait SearchGateway: Send + Sync {
    /// Never returns `Err` for pure unavailability — falls through to the
    /// deterministic mock hit list and reports `degraded` on the bundle
    /// instead, so a jurisdiction lookup failure never blocks a round
    /// (spec §4.2).
    async fn search(&self, query: &str, max_results: u32) -> EngineResult<SearchOutcome>;
}

#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub hits: Vec<SearchHit>,
    pub degraded: bool,
}

#[derive(Debug, Clone)]
struct SearchAttemptError {
    kind: FailureKind,
}

impl Retriable for SearchAttemptError {
    fn is_retriable(&self) -> bool {
        self.kind.is_retriable_by_backoff()
    }
}

#[derive(Debug, Deserialize)]
struct ProviderResult {
    url: String,
    snippet: String,
}

/// Search Gateway (C2): tries a primary provider, falls back to a secondary
/// on failure, and finally falls back to a small deterministic mock hit list
/// so research never blocks the pipeline outright.
pub struct HttpSearchGateway {
    client: reqwest::Client,
    primary_endpoint: String,
    secondary_endpoint: Option<String>,
    circuit_breaker: CircuitBreaker,
}

impl HttpSearchGateway {
    pub fn new(primary_endpoint: impl Into<String>, secondary_endpoint: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            primary_endpoint: primary_endpoint.into(),
            secondary_endpoint,
            circuit_breaker: CircuitBreaker::default(),
        }
    }

    async fn call_provider(
        &self,
        endpoint: &str,
        query: &str,
        max_results: u32,
    ) -> Result<Vec<SearchHit>, SearchAttemptError> {
        let response = self
            .client
            .get(endpoint)
            .query(&[("q", query), ("limit", &max_results.to_string())])
            .send()
            .await
            .map_err(|err| SearchAttemptError {
                kind: if err.is_timeout() || err.is_connect() {
                    FailureKind::Transient(err.to_string())
                } else {
                    FailureKind::Fatal(err.to_string())
                },
            })?;

        if response.status().as_u16() == 429 {
            return Err(SearchAttemptError {
                kind: FailureKind::RateLimited(format!("{endpoint} rate-limited")),
            });
        }
        if !response.status().is_success() {
            return Err(SearchAttemptError {
                kind: FailureKind::Transient(format!("{endpoint} returned {}", response.status())),
            });
        }

        let results: Vec<ProviderResult> = response.json().await.map_err(|err| SearchAttemptError {
            kind: FailureKind::Malformed(err.to_string()),
        })?;

        Ok(results
            .into_iter()
            .take(max_results as usize)
            .map(|r| SearchHit {
                query: query.to_string(),
                snippet: r.snippet,
                url: r.url,
                source: endpoint.to_string(),
            })
            .collect())
    }

    async fn try_endpoint(&self, endpoint: &str, query: &str, max_results: u32) -> Option<Vec<SearchHit>> {
        let breaker = &self.circuit_breaker;
        let outcome = with_retry(MAX_ATTEMPTS, || async {
            match breaker.call(|| self.call_provider(endpoint, query, max_results)).await {
                Ok(hits) => Ok(hits),
                Err(CircuitBreakerError::Open) => Err(SearchAttemptError {
                    kind: FailureKind::Transient("circuit breaker open".into()),
                }),
                Err(CircuitBreakerError::Inner(err)) => Err(err),
            }
        })
        .await;

        match outcome {
            Ok(hits) => Some(hits),
            Err(err) => {
                tracing::warn!(endpoint, error = %err.kind, "search provider failed");
                None
            }
        }
    }

    fn mock_hits(query: &str, max_results: u32) -> Vec<SearchHit> {
        (1..=max_results.max(1).min(3))
            .map(|i| SearchHit {
                query: query.to_string(),
                snippet: format!("No live search results available for \"{query}\" (mock result {i})."),
                url: format!("urn:pe:mock-search:{i}"),
                source: "mock-fallback".to_string(),
            })
            .collect()
    }
}

#[async_trait]
impl SearchGateway for HttpSearchGateway {
    async fn search(&self, query: &str, max_results: u32) -> EngineResult<SearchOutcome> {
        if let Some(hits) = self.try_endpoint(&self.primary_endpoint, query, max_results).await {
            return Ok(SearchOutcome { hits, degraded: false });
        }

        if let Some(secondary) = &self.secondary_endpoint {
            if let Some(hits) = self.try_endpoint(secondary, query, max_results).await {
                return Ok(SearchOutcome { hits, degraded: true });
            }
        }

        Ok(SearchOutcome {
            hits: Self::mock_hits(query, max_results),
            degraded: true,
        })
    }
}
