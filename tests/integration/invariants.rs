//! Property checks over randomized round sequences: Elo conservation and
//! acyclic lineage should hold no matter how comparisons and evolutions are
//! interleaved.

use chrono::Utc;
use pe_core::Proposal;
use pe_repository::{apply_elo_update, ProposalRepository};
use proptest::prelude::*;

use crate::common::{assert_elo_conserved, assert_lineage_forest};

fn arb_k_factor() -> impl Strategy<Value = f64> {
    (8u32..=64u32).prop_map(|k| k as f64)
}

proptest! {
    /// Any sequence of winner/loser draws from a fixed pool conserves the
    /// sum of all ratings exactly (up to floating-point tolerance), since
    /// every update moves the same delta from loser to winner.
    #[test]
    fn elo_updates_conserve_total_rating(
        outcomes in prop::collection::vec((0usize..5, 0usize..5, arb_k_factor()), 0..50)
    ) {
        let mut ratings = [1200.0f64; 5];
        let total_before: f64 = ratings.iter().sum();

        for (winner_idx, loser_idx, k) in outcomes {
            if winner_idx == loser_idx {
                continue;
            }
            let (new_winner, new_loser) = apply_elo_update(ratings[winner_idx], ratings[loser_idx], k);
            ratings[winner_idx] = new_winner;
            ratings[loser_idx] = new_loser;
        }

        let total_after: f64 = ratings.iter().sum();
        prop_assert!((total_before - total_after).abs() < 1e-6);
    }

    /// Building a randomized child-of-child lineage tree never introduces a
    /// cycle and always satisfies generation = parent.generation + 1,
    /// regardless of how deep or wide the tree grows.
    #[test]
    fn randomized_lineage_trees_stay_acyclic(
        parent_choices in prop::collection::vec(0usize..8, 1..30)
    ) {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
            .block_on(async {
                let repo = ProposalRepository::new();
                let root = Proposal::new_original("Ban single-use bags outright", "d", "r", "", Utc::now());
                repo.add(root.clone()).await.unwrap();
                let mut pool = vec![root];

                for (i, choice) in parent_choices.into_iter().enumerate() {
                    let parent = &pool[choice % pool.len()];
                    let child = Proposal::new_child_of(
                        parent,
                        format!("Variant {i}"),
                        "d",
                        "r",
                        "",
                        Utc::now(),
                    );
                    repo.add(child.clone()).await.unwrap();
                    pool.push(child);
                }

                let all = repo.all_active().await;
                assert_lineage_forest(&all);
            });
    }

    /// A round of comparisons drawn from a randomized pairing order still
    /// conserves total Elo across the whole batch.
    #[test]
    fn comparison_batches_conserve_elo_across_the_whole_pool(
        rounds in prop::collection::vec((0usize..4, 0usize..4), 0..20)
    ) {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
            .block_on(async {
                let repo = ProposalRepository::new();
                let mut proposals = Vec::new();
                for i in 0..4 {
                    let p = Proposal::new_original(format!("Proposal {i}"), "d", "r", "", Utc::now());
                    repo.add(p.clone()).await.unwrap();
                    proposals.push(p);
                }
                let before = repo.all_active().await;

                for (a_idx, b_idx) in rounds {
                    if a_idx == b_idx {
                        continue;
                    }
                    let a = proposals[a_idx].id;
                    let b = proposals[b_idx].id;
                    repo.apply_comparison(a, b, 32.0).await.unwrap();
                }

                let after = repo.all_active().await;
                assert_elo_conserved(&before, &after);
            });
    }
}
