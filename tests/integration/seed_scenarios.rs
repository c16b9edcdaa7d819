//! End-to-end exercises of the six concrete scenarios the engine has to get
//! right, wired against the real components with scripted Worker/Search
//! doubles standing in for the network boundary.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use pe_context::ContextAssembler;
use pe_core::{field, ComparisonVerdict, EngineError, EngineResult, FailureKind, JurisdictionContext, PolicyType, SpanType};
use pe_evolver::Evolver;
use pe_gateway::{WorkerGateway, WorkerRequest, WorkerResponse};
use pe_generator::Generator;
use pe_repository::ProposalRepository;
use pe_tournament::{RoundState, TournamentScheduler};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::common::{
    assemble_sample_bundle, assert_lineage_forest, assert_superseded_proposal_still_ranked, generation_reply,
    in_memory_trace_store, inconclusive_verdict_reply, jurisdiction_with, test_config, verdict_reply, FailingWorker,
    LexicographicJudge, ScriptedWorker, StubSearchGateway, TEST_QUERY,
};

/// Replays a scripted queue of replies, then raises `RateLimited` for every
/// call after the queue is exhausted — for exercising a round that
/// completes some comparisons before hitting the rate limit.
struct ThenRateLimitedWorker {
    replies: Mutex<Vec<String>>,
}

impl ThenRateLimitedWorker {
    fn new(replies: Vec<String>) -> Self {
        Self { replies: Mutex::new(replies) }
    }
}

#[async_trait]
impl WorkerGateway for ThenRateLimitedWorker {
    async fn invoke(&self, _request: WorkerRequest) -> EngineResult<WorkerResponse> {
        let mut replies = self.replies.lock().await;
        match replies.pop() {
            Some(raw_text) => Ok(WorkerResponse {
                raw_text,
                parsed: None,
                model: "stub-worker".to_string(),
                response_id: "resp".to_string(),
                prompt_tokens: 5,
                completion_tokens: 5,
            }),
            None => Err(EngineError::Worker {
                kind: FailureKind::RateLimited("429 from stub worker".to_string()),
                attempts: 3,
                last_message: "stub rate limit".to_string(),
            }),
        }
    }
}

/// Scenario 1: a stub Worker that always favors the lexicographically
/// smaller title produces a rank-1 whose title sorts first, and the
/// generation-0 proposals it dethroned are still present, marked
/// superseded, once the top pick has been evolved past them.
#[tokio::test]
async fn lexicographic_stub_worker_ranks_alphabetically_first_title_on_top() {
    let store = in_memory_trace_store();
    let repo = ProposalRepository::new();
    let trace_id = store.start_trace(TEST_QUERY, PolicyType::Integrated).await.unwrap();
    let root = store.open_span(trace_id, None, SpanType::Root, "orchestrator").await.unwrap();

    let generator_worker = Arc::new(ScriptedWorker::new(vec![generation_reply(&[
        "Zero-waste retail transition",
        "Apply a per-bag fee",
        "Municipal bag buyback",
    ])]));
    let (context, bundle_id) =
        assemble_sample_bundle(&store, trace_id, root, jurisdiction_with("Elgin, Illinois"), false).await;
    let generator = Generator::new(generator_worker, repo.clone(), store.clone(), context);
    let outcome = generator.generate(trace_id, root, bundle_id, 3, Utc::now()).await.unwrap();
    assert_eq!(outcome.proposal_ids.len(), 3);

    let judge = Arc::new(LexicographicJudge);
    let scheduler = TournamentScheduler::new(judge, repo.clone(), store.clone());
    let round = scheduler
        .run_round(trace_id, root, 0, &outcome.proposal_ids, 5, 32.0)
        .await
        .unwrap();
    assert_eq!(round.state, RoundState::Completed);
    assert!(round.records.iter().any(|r| matches!(r.verdict, ComparisonVerdict::Decisive { .. })));

    let ranked = repo.top(usize::MAX).await;
    assert_eq!(ranked.first().unwrap().title, "Apply a per-bag fee");

    let evolver_worker = Arc::new(ScriptedWorker::new(vec![crate::common::improvement_reply(
        "Apply a per-bag fee, phased over two years",
    )]));
    let evolver = Evolver::new(evolver_worker, repo.clone(), store.clone());
    let top = repo.top(1).await;
    let top_ids: Vec<Uuid> = top.iter().map(|p| p.id).collect();
    let original_winner_id = top_ids[0];
    let children = evolver.evolve(trace_id, root, &top_ids, Utc::now()).await.unwrap();
    assert_eq!(children.len(), 1);

    let final_ranking = repo.top(usize::MAX).await;
    assert_superseded_proposal_still_ranked(&final_ranking, original_winner_id);
    assert_lineage_forest(&final_ranking);
}

/// Scenario 2: the Search Gateway comes back degraded, but the run still
/// completes with a non-empty final ranking, and the bundle it produced
/// carries the degraded flag through to whatever records it (the
/// Context Assembler's own span metadata is exercised in its unit tests;
/// here we check the bundle the rest of the pipeline actually consumes).
#[tokio::test]
async fn degraded_search_gateway_still_completes_with_nonempty_ranking() {
    let store = in_memory_trace_store();
    let repo = ProposalRepository::new();
    let trace_id = store.start_trace(TEST_QUERY, PolicyType::Integrated).await.unwrap();
    let root = store.open_span(trace_id, None, SpanType::Root, "orchestrator").await.unwrap();

    let search = Arc::new(StubSearchGateway::degraded());
    let assembler = Arc::new(ContextAssembler::new(search, store.clone()));
    let bundle_id = assembler
        .assemble(trace_id, root, TEST_QUERY, jurisdiction_with("Elgin, Illinois"), 5)
        .await
        .unwrap();
    assert!(assembler.get(bundle_id).unwrap().research.degraded);

    let generator_worker = Arc::new(ScriptedWorker::new(vec![generation_reply(&[
        "Ban single-use bags outright",
        "Tax single-use bags",
    ])]));
    let generator = Generator::new(generator_worker, repo.clone(), store.clone(), assembler);
    let outcome = generator.generate(trace_id, root, bundle_id, 2, Utc::now()).await.unwrap();

    let reply = verdict_reply("Tax single-use bags", "cheaper to implement");
    let judge = Arc::new(ScriptedWorker::new(vec![reply.clone(), reply]));
    let scheduler = TournamentScheduler::new(judge, repo.clone(), store.clone());
    let round = scheduler
        .run_round(trace_id, root, 0, &outcome.proposal_ids, 5, 32.0)
        .await
        .unwrap();
    assert_eq!(round.state, RoundState::Completed);

    let ranking = repo.top(usize::MAX).await;
    assert!(!ranking.is_empty());
}

/// Scenario 3: every verdict in round 1 is malformed text with no
/// recognizable title. All comparisons record inconclusive, every rating
/// stays at its starting value, and round 2 then proceeds normally once a
/// decisive Worker is substituted in.
#[tokio::test]
async fn malformed_verdicts_leave_round_inconclusive_and_elo_unchanged() {
    let store = in_memory_trace_store();
    let repo = ProposalRepository::new();
    let trace_id = store.start_trace(TEST_QUERY, PolicyType::Integrated).await.unwrap();
    let root = store.open_span(trace_id, None, SpanType::Root, "orchestrator").await.unwrap();

    let generator_worker = Arc::new(ScriptedWorker::new(vec![generation_reply(&[
        "Ban single-use bags outright",
        "Tax single-use bags",
    ])]));
    let (context, bundle_id) =
        assemble_sample_bundle(&store, trace_id, root, jurisdiction_with("Elgin, Illinois"), false).await;
    let generator = Generator::new(generator_worker, repo.clone(), store.clone(), context);
    let outcome = generator.generate(trace_id, root, bundle_id, 2, Utc::now()).await.unwrap();
    let before = repo.top(usize::MAX).await;

    let garbled = inconclusive_verdict_reply();
    let confused_judge = Arc::new(ScriptedWorker::new(vec![garbled.clone(), garbled]));
    let scheduler = TournamentScheduler::new(confused_judge, repo.clone(), store.clone());
    let round_one = scheduler
        .run_round(trace_id, root, 0, &outcome.proposal_ids, 5, 32.0)
        .await
        .unwrap();

    assert_eq!(round_one.state, RoundState::Completed);
    assert!(!round_one.records.is_empty());
    assert!(round_one.records.iter().all(|r| r.is_inconclusive()));

    let after_round_one = repo.top(usize::MAX).await;
    for p in &before {
        let still = after_round_one.iter().find(|q| q.id == p.id).unwrap();
        assert_eq!(still.elo, p.elo);
    }

    let reply = verdict_reply("Tax single-use bags", "lower enforcement burden");
    let decisive_judge = Arc::new(ScriptedWorker::new(vec![reply.clone(), reply]));
    let scheduler_two = TournamentScheduler::new(decisive_judge, repo.clone(), store.clone());
    let round_two = scheduler_two
        .run_round(trace_id, root, 1, &outcome.proposal_ids, 5, 32.0)
        .await
        .unwrap();
    assert_eq!(round_two.state, RoundState::Completed);
    assert!(round_two.records.iter().any(|r| matches!(r.verdict, ComparisonVerdict::Decisive { .. })));
}

/// Scenario 4: supplying "maybe" to a yes/no-shaped field relocates it
/// into notes rather than discarding it, and every other field the caller
/// set survives untouched.
#[tokio::test]
async fn yes_no_relocation_preserves_other_fields() {
    let mut ctx = JurisdictionContext::new();
    ctx.set(field::JURISDICTION, "Elgin, Illinois");
    ctx.set(field::POPULATION, "114000");
    let relocated = ctx.set_yes_no("stakeholder_detail", "maybe");

    assert!(relocated.is_some());
    let relocated = relocated.unwrap();
    assert_eq!(relocated.field, "stakeholder_detail");

    assert!(ctx.get("stakeholder_detail").is_none());
    assert_eq!(ctx.get(field::JURISDICTION).unwrap().value(), "Elgin, Illinois");
    assert_eq!(ctx.get(field::POPULATION).unwrap().value(), "114000");
    assert!(ctx.notes().unwrap().contains("stakeholder_detail: maybe"));
}

/// Scenario 5: the Worker raises RateLimited partway through a round's
/// pair budget. The round ends cleanly rather than aborting, at least one
/// comparison is recorded, `partial_round` is set, and the run can still
/// move on to evolution afterward.
#[tokio::test]
async fn rate_limit_mid_round_yields_partial_round_and_run_still_proceeds() {
    let store = in_memory_trace_store();
    let repo = ProposalRepository::new();
    let trace_id = store.start_trace(TEST_QUERY, PolicyType::Integrated).await.unwrap();
    let root = store.open_span(trace_id, None, SpanType::Root, "orchestrator").await.unwrap();

    let generator_worker = Arc::new(ScriptedWorker::new(vec![generation_reply(&[
        "Ban single-use bags outright",
        "Tax single-use bags",
        "Municipal bag buyback",
    ])]));
    let (context, bundle_id) =
        assemble_sample_bundle(&store, trace_id, root, jurisdiction_with("Elgin, Illinois"), false).await;
    let generator = Generator::new(generator_worker, repo.clone(), store.clone(), context);
    let outcome = generator.generate(trace_id, root, bundle_id, 3, Utc::now()).await.unwrap();

    let reply = verdict_reply("Tax single-use bags", "cheaper to enforce");
    let limiter = Arc::new(ThenRateLimitedWorker::new(vec![reply.clone(), reply]));
    let scheduler = TournamentScheduler::with_max_inflight(limiter, repo.clone(), store.clone(), 1);
    let round = scheduler
        .run_round(trace_id, root, 2, &outcome.proposal_ids, 5, 32.0)
        .await
        .unwrap();

    assert_eq!(round.state, RoundState::Completed);
    assert!(round.partial_round);
    assert!(!round.records.is_empty(), "the pair completed before the rate limit hit should still be recorded");
    assert!(round.records.len() < 2 * outcome.proposal_ids.len(), "the round must not have exhausted its full pair budget");

    let top = repo.top(2).await;
    let evolver_worker = Arc::new(ScriptedWorker::new(vec![crate::common::improvement_reply(
        "Tax single-use bags, phased over two years",
    )]));
    let evolver = Evolver::new(evolver_worker, repo.clone(), store.clone());
    let top_ids: Vec<Uuid> = top.iter().map(|p| p.id).collect();
    let children = evolver.evolve(trace_id, root, &top_ids, Utc::now()).await.unwrap();
    assert!(!children.is_empty());
}

/// Scenario 6: once the Elo gap between rank 1 and rank M stays under the
/// convergence threshold for two consecutive generations, the run should
/// stop early. This replicates the orchestrator binary's own convergence
/// check against the repository directly, since the binary crate itself
/// isn't a library dependency here.
#[tokio::test]
async fn converged_elo_gap_across_two_generations_signals_early_stop() {
    let repo = ProposalRepository::new();
    let a = pe_core::Proposal::new_original("Ban single-use bags outright", "d", "r", "", Utc::now());
    let b = pe_core::Proposal::new_original("Tax single-use bags", "d", "r", "", Utc::now());
    repo.add(a.clone()).await.unwrap();
    repo.add(b.clone()).await.unwrap();

    let convergence_epsilon = test_config().convergence_epsilon;
    let mut consecutive_converged_generations = 0u32;
    let mut converged = false;

    for _ in 0..2 {
        let top = repo.top(2).await;
        let gap = top.first().map(|p| p.elo).unwrap_or(0.0) - top.last().map(|p| p.elo).unwrap_or(0.0);
        if gap < convergence_epsilon {
            consecutive_converged_generations += 1;
        } else {
            consecutive_converged_generations = 0;
        }
        if consecutive_converged_generations >= 2 {
            converged = true;
            break;
        }
    }

    assert!(converged, "two ties in a row should converge when starting Elo gap is zero");
}

/// A Worker that fails with a non-retriable kind should surface that as an
/// `EngineError::Worker` with the expected `FailureKind`, so callers can
/// distinguish it from a retriable rate limit.
#[tokio::test]
async fn fatal_worker_failure_is_distinguishable_from_rate_limited() {
    let fatal = FailingWorker::fatal();
    let err = fatal
        .invoke(WorkerRequest {
            role: pe_gateway::WorkerRole::Judge,
            prompt: "irrelevant".to_string(),
            schema_hint: None,
        })
        .await
        .unwrap_err();
    match err {
        EngineError::Worker { kind: FailureKind::Fatal(_), .. } => {}
        other => panic!("expected Fatal, got {other:?}"),
    }
}
