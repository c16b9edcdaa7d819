//! Boundary conditions around round sizing and proposal-pool edges that
//! the seed scenarios don't otherwise exercise.

use std::sync::Arc;

use chrono::Utc;
use pe_core::{ComparisonVerdict, Proposal, SpanType};
use pe_repository::ProposalRepository;
use pe_tournament::{RoundState, TournamentScheduler};

use crate::common::{in_memory_trace_store, verdict_reply, ScriptedWorker, TEST_QUERY};

fn proposal(title: &str) -> Proposal {
    Proposal::new_original(title, "d", "r", "", Utc::now())
}

/// A pair budget of 1 over exactly two proposals runs one candidate pair,
/// which still means two Worker calls (the positional-swap re-evaluation).
#[tokio::test]
async fn pair_budget_of_one_still_runs_the_double_blind_swap() {
    let store = in_memory_trace_store();
    let trace_id = store.start_trace(TEST_QUERY, pe_core::PolicyType::Integrated).await.unwrap();
    let root = store.open_span(trace_id, None, SpanType::Root, "orchestrator").await.unwrap();

    let a = proposal("Ban single-use bags outright");
    let b = proposal("Tax single-use bags");
    let repo = ProposalRepository::new();
    repo.add(a.clone()).await.unwrap();
    repo.add(b.clone()).await.unwrap();

    let reply = verdict_reply("Tax single-use bags", "cheaper to enforce");
    let worker = Arc::new(ScriptedWorker::new(vec![reply.clone(), reply]));
    let scheduler = TournamentScheduler::new(worker.clone(), repo.clone(), store.clone());

    let outcome = scheduler.run_round(trace_id, root, 0, &[a.id, b.id], 1, 32.0).await.unwrap();

    assert_eq!(outcome.records.len(), 2);
    assert_eq!(worker.calls(), 2);
}

/// A single remaining active proposal can't be paired with anything; the
/// caller is expected to stop scheduling rounds once fewer than two
/// proposals remain, but the scheduler itself should not error if asked
/// to run a round over an empty id list.
#[tokio::test]
async fn empty_round_over_no_candidates_completes_without_error() {
    let store = in_memory_trace_store();
    let trace_id = store.start_trace(TEST_QUERY, pe_core::PolicyType::Integrated).await.unwrap();
    let root = store.open_span(trace_id, None, SpanType::Root, "orchestrator").await.unwrap();

    let repo = ProposalRepository::new();
    let worker = Arc::new(ScriptedWorker::new(vec![]));
    let scheduler = TournamentScheduler::new(worker, repo, store.clone());

    let outcome = scheduler.run_round(trace_id, root, 0, &[], 5, 32.0).await.unwrap();

    assert!(outcome.records.is_empty());
    assert_eq!(outcome.state, RoundState::Completed);
    assert!(!outcome.partial_round);
}

/// When the requested pair budget exceeds the number of candidate pairs
/// actually available, the round just runs every available pair once and
/// stops rather than erroring or repeating pairs.
#[tokio::test]
async fn pair_budget_larger_than_available_pairs_runs_every_pair_once() {
    let store = in_memory_trace_store();
    let trace_id = store.start_trace(TEST_QUERY, pe_core::PolicyType::Integrated).await.unwrap();
    let root = store.open_span(trace_id, None, SpanType::Root, "orchestrator").await.unwrap();

    let a = proposal("Ban single-use bags outright");
    let b = proposal("Tax single-use bags");
    let repo = ProposalRepository::new();
    repo.add(a.clone()).await.unwrap();
    repo.add(b.clone()).await.unwrap();

    let reply = verdict_reply("Ban single-use bags outright", "stronger deterrent");
    let worker = Arc::new(ScriptedWorker::new(vec![reply.clone(), reply]));
    let scheduler = TournamentScheduler::new(worker.clone(), repo.clone(), store.clone());

    let outcome = scheduler.run_round(trace_id, root, 0, &[a.id, b.id], 100, 32.0).await.unwrap();

    assert_eq!(outcome.records.len(), 2);
    assert!(outcome
        .records
        .iter()
        .any(|r| matches!(r.verdict, ComparisonVerdict::Decisive { .. })));
}
