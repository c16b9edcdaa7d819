use std::collections::HashSet;

use pe_core::Proposal;
use uuid::Uuid;

/// One candidate pair, carrying what the ranking needs so the caller
/// doesn't have to look the proposals back up.
#[derive(Debug, Clone, Copy)]
pub struct CandidatePair {
    pub a: Uuid,
    pub b: Uuid,
    pub already_compared: bool,
    pub elo_gap: f64,
}

/// Builds every unordered pair of `proposals` and orders them the way
/// `run_round` selects from (spec §4.7): pairs not yet compared in this run
/// first, then by smallest absolute Elo gap, ties broken lexicographically
/// by (a, b) with a < b.
pub fn rank_candidate_pairs(proposals: &[Proposal], compared: &HashSet<(Uuid, Uuid)>) -> Vec<CandidatePair> {
    let mut pairs = Vec::new();
    for i in 0..proposals.len() {
        for j in (i + 1)..proposals.len() {
            let (a, b) = canonical(proposals[i].id, proposals[j].id);
            let already_compared = compared.contains(&(a, b));
            let elo_gap = (proposals[i].elo - proposals[j].elo).abs();
            pairs.push(CandidatePair {
                a,
                b,
                already_compared,
                elo_gap,
            });
        }
    }

    pairs.sort_by(|x, y| {
        x.already_compared
            .cmp(&y.already_compared)
            .then(x.elo_gap.partial_cmp(&y.elo_gap).unwrap_or(std::cmp::Ordering::Equal))
            .then((x.a, x.b).cmp(&(y.a, y.b)))
    });

    pairs
}

fn canonical(a: Uuid, b: Uuid) -> (Uuid, Uuid) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}
