use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use pe_core::{ComparisonRecord, EngineError, EngineResult, FailureKind, Proposal, SpanType, TokenUsage, WorkerMetadata};
use pe_gateway::{WorkerGateway, WorkerRequest, WorkerRole};
use pe_repository::ProposalRepository;
use pe_trace::{SharedTraceStore, SpanCloseFields};
use serde_json::json;
use tokio::sync::{Mutex, Semaphore};
use tracing::warn;
use uuid::Uuid;

use crate::pairing::rank_candidate_pairs;
use crate::prompt::build_comparison_prompt;
use crate::verdict::{parse_verdict, resolve_winner};

const INCONCLUSIVE_WARN_THRESHOLD: f64 = 0.2;
/// Default bound on concurrent Worker calls within a round (spec §5).
const DEFAULT_MAX_INFLIGHT: usize = 4;

/// A round's terminal state (spec §4.7's explicit state machine).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundState {
    Planned,
    Running,
    Completed,
    Aborted,
}

#[derive(Debug, Clone)]
pub struct RoundOutcome {
    pub records: Vec<ComparisonRecord>,
    pub state: RoundState,
    /// Set when the round ended early on a rate-limited Worker call rather
    /// than exhausting its full pair budget (spec §4.7/§8 scenario 5).
    pub partial_round: bool,
}

/// Tournament Scheduler (C7): runs bounded rounds of double-blind pairwise
/// comparisons, applying Elo updates for decisive verdicts.
///
/// `compared_pairs` accumulates across every `run_round` call made against
/// this instance, so later rounds prefer pairs the run hasn't seen yet.
pub struct TournamentScheduler {
    worker: Arc<dyn WorkerGateway>,
    repository: ProposalRepository,
    trace: SharedTraceStore,
    compared_pairs: Mutex<HashSet<(Uuid, Uuid)>>,
    max_inflight: usize,
}

impl TournamentScheduler {
    pub fn new(worker: Arc<dyn WorkerGateway>, repository: ProposalRepository, trace: SharedTraceStore) -> Self {
        Self::with_max_inflight(worker, repository, trace, DEFAULT_MAX_INFLIGHT)
    }

    pub fn with_max_inflight(
        worker: Arc<dyn WorkerGateway>,
        repository: ProposalRepository,
        trace: SharedTraceStore,
        max_inflight: usize,
    ) -> Self {
        Self {
            worker,
            repository,
            trace,
            compared_pairs: Mutex::new(HashSet::new()),
            max_inflight: max_inflight.max(1),
        }
    }

    /// Runs one round over `proposal_ids`, evaluating up to `budget_pairs`
    /// pairs twice each (positions swapped) and applying `k_factor` Elo
    /// updates sequentially for decisive verdicts (spec §4.7).
    pub async fn run_round(
        &self,
        trace_id: Uuid,
        parent_span_id: Uuid,
        round_index: u32,
        proposal_ids: &[Uuid],
        budget_pairs: usize,
        k_factor: f64,
    ) -> EngineResult<RoundOutcome> {
        let span_id = self
            .trace
            .open_span(trace_id, Some(parent_span_id), SpanType::Comparison, "tournament_scheduler")
            .await?;

        let mut proposals = Vec::with_capacity(proposal_ids.len());
        for id in proposal_ids {
            match self.repository.get(*id).await {
                Some(p) => proposals.push(p),
                None => {
                    return Err(EngineError::RepositoryInvariant(format!(
                        "unknown proposal in round {round_index}: {id}"
                    )))
                }
            }
        }

        let ranked = {
            let compared = self.compared_pairs.lock().await;
            rank_candidate_pairs(&proposals, &compared)
        };

        let mut records = Vec::new();
        let mut state = RoundState::Running;
        let mut inconclusive_count = 0usize;
        let mut partial_round = false;

        // Comparisons within a round are scheduled concurrently (bounded by
        // `max_inflight` Worker calls at a time); Elo updates are applied in
        // completion order rather than scheduling order (spec §5).
        let semaphore = Semaphore::new(self.max_inflight);
        let sem = &semaphore;
        let mut in_flight = FuturesUnordered::new();

        for candidate in ranked.into_iter().take(budget_pairs) {
            let a = find(&proposals, candidate.a).clone();
            let b = find(&proposals, candidate.b).clone();
            self.compared_pairs.lock().await.insert((candidate.a, candidate.b));

            in_flight.push(async move {
                let _permit = sem.acquire().await.expect("semaphore is never closed");
                self.evaluate_pair(round_index, &a, &b, k_factor).await
            });
        }

        while let Some(result) = in_flight.next().await {
            match result {
                Ok(pair_records) => {
                    inconclusive_count += pair_records.iter().filter(|r| r.is_inconclusive()).count();
                    records.extend(pair_records);
                }
                Err(EngineError::Worker { kind, .. }) if matches!(kind, FailureKind::RateLimited(_)) => {
                    warn!(round_index, "rate limit reached, ending round cleanly with partial results");
                    state = RoundState::Completed;
                    partial_round = true;
                    break;
                }
                Err(err) => {
                    warn!(round_index, error = %err, "round aborted by unrecoverable worker failure");
                    state = RoundState::Aborted;
                    break;
                }
            }
        }
        drop(in_flight);

        if state == RoundState::Running {
            state = RoundState::Completed;
        }

        let total_evaluations = records.len();
        if total_evaluations > 0 {
            let rate = inconclusive_count as f64 / total_evaluations as f64;
            if rate > INCONCLUSIVE_WARN_THRESHOLD {
                warn!(round_index, rate, "inconclusive rate exceeds 20% for this round");
            }
        }

        self.trace
            .set_span_metadata(span_id, "partial_round", json!(partial_round))
            .await?;

        self.trace
            .close_span(
                span_id,
                SpanCloseFields {
                    output_text: Some(format!(
                        "round {round_index}: {total_evaluations} evaluations, {inconclusive_count} inconclusive, state={state:?}"
                    )),
                    model: None,
                    tokens_used: None,
                },
            )
            .await?;

        Ok(RoundOutcome { records, state, partial_round })
    }

    /// Evaluates one candidate pair twice, swapping positions between calls,
    /// and applies the Elo update from the first decisive outcome before the
    /// second call is scored (spec §4.7: sequential application).
    async fn evaluate_pair(
        &self,
        round_index: u32,
        a: &Proposal,
        b: &Proposal,
        k_factor: f64,
    ) -> EngineResult<Vec<ComparisonRecord>> {
        let mut records = Vec::with_capacity(2);

        let first = self.single_evaluation(round_index, a, b).await?;
        self.apply_if_decisive(&first, k_factor).await?;
        records.push(first);

        let second = self.single_evaluation(round_index, b, a).await?;
        self.apply_if_decisive(&second, k_factor).await?;
        records.push(second);

        Ok(records)
    }

    async fn apply_if_decisive(&self, record: &ComparisonRecord, k_factor: f64) -> EngineResult<()> {
        if let pe_core::ComparisonVerdict::Decisive { winner_id, loser_id } = record.verdict {
            self.repository.apply_comparison(winner_id, loser_id, k_factor).await?;
        }
        Ok(())
    }

    async fn single_evaluation(&self, round_index: u32, first: &Proposal, second: &Proposal) -> EngineResult<ComparisonRecord> {
        let prompt = build_comparison_prompt(first, second);
        let response = self
            .worker
            .invoke(WorkerRequest {
                role: WorkerRole::Judge,
                prompt,
                schema_hint: Some(json!({
                    "type": "object",
                    "properties": {
                        "winner_title": {"type": "string"},
                        "rationale": {"type": "string"}
                    },
                    "required": ["winner_title"]
                })),
            })
            .await?;

        let metadata = WorkerMetadata {
            model: response.model.clone(),
            response_id: response.response_id.clone(),
            token_usage: TokenUsage::new(response.prompt_tokens, response.completion_tokens),
        };

        let raw = parse_verdict(response.parsed.as_ref(), &response.raw_text);
        let record = match raw.as_ref().and_then(|v| resolve_winner(v, first, second)) {
            Some(winner) => ComparisonRecord::decisive(
                round_index,
                first.id,
                second.id,
                winner.id,
                raw.map(|v| v.rationale).unwrap_or_default(),
                metadata,
                Utc::now(),
            ),
            None => ComparisonRecord::inconclusive(
                round_index,
                first.id,
                second.id,
                raw.map(|v| v.rationale).unwrap_or_default(),
                metadata,
                Utc::now(),
            ),
        };

        Ok(record)
    }
}

fn find(proposals: &[Proposal], id: Uuid) -> &Proposal {
    proposals
        .iter()
        .find(|p| p.id == id)
        .expect("candidate pair ids come from the same proposal list")
}
