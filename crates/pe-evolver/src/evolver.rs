use std::sync::Arc;

use chrono::{DateTime, Utc};
use pe_core::{EngineError, EngineResult, Proposal, SpanType};
use pe_gateway::{WorkerGateway, WorkerRequest, WorkerRole};
use pe_repository::ProposalRepository;
use pe_trace::{SharedTraceStore, SpanCloseFields};
use serde_json::json;
use tracing::warn;
use uuid::Uuid;

use crate::improvement::parse_improvement;
use crate::prompt::build_improvement_prompt;

/// Evolver (C8): produces improved variants of top-ranked proposals.
///
/// Each child carries generation = parent.generation + 1, parent_id =
/// source.id, and an initial Elo equal to the parent's current rating
/// (momentum carries forward rather than resetting). The parent is marked
/// superseded but stays in the repository and remains comparable.
pub struct Evolver {
    worker: Arc<dyn WorkerGateway>,
    repository: ProposalRepository,
    trace: SharedTraceStore,
}

impl Evolver {
    pub fn new(worker: Arc<dyn WorkerGateway>, repository: ProposalRepository, trace: SharedTraceStore) -> Self {
        Self {
            worker,
            repository,
            trace,
        }
    }

    /// Evolves each proposal in `top_ids` independently. A single proposal
    /// that fails to evolve (unrecoverable Worker failure, or a malformed
    /// reply that never stabilizes) is skipped with a warning rather than
    /// aborting the whole batch — the caller still gets whatever variants
    /// succeeded.
    pub async fn evolve(
        &self,
        trace_id: Uuid,
        parent_span_id: Uuid,
        top_ids: &[Uuid],
        created_at: DateTime<Utc>,
    ) -> EngineResult<Vec<Uuid>> {
        let span_id = self
            .trace
            .open_span(trace_id, Some(parent_span_id), SpanType::Evolution, "evolver")
            .await?;

        let mut children = Vec::with_capacity(top_ids.len());
        for id in top_ids {
            match self.evolve_one(*id, created_at).await {
                Ok(Some(child_id)) => children.push(child_id),
                Ok(None) => warn!(proposal_id = %id, "evolver produced no usable variant, skipping"),
                Err(err) => warn!(proposal_id = %id, error = %err, "evolver failed on this proposal, skipping"),
            }
        }

        self.trace
            .close_span(
                span_id,
                SpanCloseFields {
                    output_text: Some(format!("{} variants produced from {} candidates", children.len(), top_ids.len())),
                    model: None,
                    tokens_used: None,
                },
            )
            .await?;

        Ok(children)
    }

    async fn evolve_one(&self, parent_id: Uuid, created_at: DateTime<Utc>) -> EngineResult<Option<Uuid>> {
        let parent = self
            .repository
            .get(parent_id)
            .await
            .ok_or_else(|| EngineError::RepositoryInvariant(format!("unknown proposal: {parent_id}")))?;

        let prompt = build_improvement_prompt(&parent);
        let response = self
            .worker
            .invoke(WorkerRequest {
                role: WorkerRole::Evolver,
                prompt,
                schema_hint: Some(json!({
                    "type": "object",
                    "properties": {
                        "title": {"type": "string"},
                        "description": {"type": "string"},
                        "rationale": {"type": "string"},
                        "implementation_notes": {"type": "string"},
                        "deltas": {"type": "array", "items": {"type": "string"}}
                    },
                    "required": ["title", "description", "rationale"]
                })),
            })
            .await?;

        let draft = match parse_improvement(response.parsed.as_ref(), &response.raw_text) {
            Some(draft) if draft.is_well_formed() => draft,
            _ => return Ok(None),
        };

        let child = Proposal::new_child_of(
            &parent,
            draft.title,
            draft.description,
            draft.rationale,
            draft.implementation_notes,
            created_at,
        );
        let child_id = child.id;

        self.repository.add(child).await?;
        self.repository.mark_superseded(parent_id).await?;

        Ok(Some(child_id))
    }
}
