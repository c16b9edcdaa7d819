use std::collections::HashMap;
use std::sync::Arc;

use pe_core::{EngineError, EngineResult, Proposal};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::elo::apply_elo_update;

/// Proposal Repository (C4): the sole mutator of `Proposal` state (spec §5).
/// Holds every proposal created during a run, keyed by its stable ID, and
/// never deletes one — only `superseded` and `elo` ever change after
/// insertion.
#[derive(Clone)]
pub struct ProposalRepository {
    proposals: Arc<RwLock<HashMap<Uuid, Proposal>>>,
}

impl Default for ProposalRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl ProposalRepository {
    pub fn new() -> Self {
        Self {
            proposals: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn add(&self, proposal: Proposal) -> EngineResult<()> {
        if let Some(parent_id) = proposal.parent_id {
            let proposals = self.proposals.read().await;
            let parent = proposals
                .get(&parent_id)
                .ok_or_else(|| EngineError::RepositoryInvariant(format!("parent {parent_id} does not exist")))?;
            if proposal.generation != parent.generation + 1 {
                return Err(EngineError::RepositoryInvariant(format!(
                    "child generation {} must be parent generation {} + 1",
                    proposal.generation, parent.generation
                )));
            }
        }

        debug!(id = %proposal.id, generation = proposal.generation, "adding proposal");
        self.proposals.write().await.insert(proposal.id, proposal);
        Ok(())
    }

    pub async fn get(&self, id: Uuid) -> Option<Proposal> {
        self.proposals.read().await.get(&id).cloned()
    }

    /// All proposals in the repository (spec §4.4/§4.8: a superseded
    /// proposal is never removed and remains comparable).
    pub async fn all_active(&self) -> Vec<Proposal> {
        self.proposals.read().await.values().cloned().collect()
    }

    /// Top `n` proposals ordered by Elo descending. Ties are broken by
    /// (higher generation, earlier created_at, then id) for stable
    /// enumeration across runs (spec §4.4).
    pub async fn top(&self, n: usize) -> Vec<Proposal> {
        let mut all: Vec<Proposal> = self.proposals.read().await.values().cloned().collect();
        all.sort_by(|a, b| {
            b.elo
                .partial_cmp(&a.elo)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.generation.cmp(&a.generation))
                .then_with(|| a.created_at.cmp(&b.created_at))
                .then_with(|| a.id.cmp(&b.id))
        });
        all.truncate(n);
        all
    }

    /// Applies one pairwise-comparison outcome to both proposals'
    /// ratings (spec §4.4). Serialized through this single write lock so
    /// concurrent comparisons' Elo updates apply in completion order
    /// (spec §5).
    pub async fn apply_comparison(&self, winner_id: Uuid, loser_id: Uuid, k_factor: f64) -> EngineResult<()> {
        let mut proposals = self.proposals.write().await;
        let winner_rating = proposals
            .get(&winner_id)
            .ok_or_else(|| EngineError::RepositoryInvariant(format!("unknown proposal: {winner_id}")))?
            .elo;
        let loser_rating = proposals
            .get(&loser_id)
            .ok_or_else(|| EngineError::RepositoryInvariant(format!("unknown proposal: {loser_id}")))?
            .elo;

        let (new_winner, new_loser) = apply_elo_update(winner_rating, loser_rating, k_factor);

        proposals.get_mut(&winner_id).expect("checked above").elo = new_winner;
        proposals.get_mut(&loser_id).expect("checked above").elo = new_loser;
        Ok(())
    }

    pub async fn update_elo(&self, id: Uuid, new_rating: f64) -> EngineResult<()> {
        let mut proposals = self.proposals.write().await;
        let proposal = proposals
            .get_mut(&id)
            .ok_or_else(|| EngineError::RepositoryInvariant(format!("unknown proposal: {id}")))?;
        proposal.elo = new_rating;
        Ok(())
    }

    pub async fn mark_superseded(&self, id: Uuid) -> EngineResult<()> {
        let mut proposals = self.proposals.write().await;
        let proposal = proposals
            .get_mut(&id)
            .ok_or_else(|| EngineError::RepositoryInvariant(format!("unknown proposal: {id}")))?;
        proposal.superseded = true;
        Ok(())
    }
}
