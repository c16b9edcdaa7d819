use std::sync::Arc;

use chrono::{DateTime, Utc};
use pe_context::{ContextAssembler, ContextBundle};
use pe_core::{EngineError, EngineResult, Proposal, SpanType};
use pe_gateway::{WorkerGateway, WorkerRequest, WorkerRole};
use pe_repository::ProposalRepository;
use pe_trace::{SharedTraceStore, SpanCloseFields};
use serde_json::json;
use tracing::warn;
use uuid::Uuid;

use crate::drafts::{parse_drafts, ProposalDraft};
use crate::prompt::build_prompt;

/// Result of one `Generator::generate` call: the proposals it wrote into
/// the repository, plus whether the localization-deficit check flagged this
/// batch (spec §4.6, §4.9 step 6 — the Orchestrator surfaces this flag in
/// the report hand-off).
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub proposal_ids: Vec<Uuid>,
    pub localization_deficit: bool,
}

/// Generator (C6): produces the first generation of proposals for a run,
/// backed by the Worker Gateway and writing directly into the Proposal
/// Repository.
pub struct Generator {
    worker: Arc<dyn WorkerGateway>,
    repository: ProposalRepository,
    trace: SharedTraceStore,
    context: Arc<ContextAssembler>,
}

impl Generator {
    pub fn new(
        worker: Arc<dyn WorkerGateway>,
        repository: ProposalRepository,
        trace: SharedTraceStore,
        context: Arc<ContextAssembler>,
    ) -> Self {
        Self {
            worker,
            repository,
            trace,
            context,
        }
    }

    /// Generates up to `n` proposals from the bundle addressed by
    /// `bundle_id` (spec §4.5: `generate(bundle_id, n)`). Emits exactly the
    /// well-formed proposals the Worker returned, retrying once with an
    /// amplified diversity instruction if fewer than `ceil(n/2)` survive the
    /// well-formedness check (spec §4.6).
    pub async fn generate(
        &self,
        trace_id: Uuid,
        parent_span_id: Uuid,
        bundle_id: Uuid,
        n: usize,
        created_at: DateTime<Utc>,
    ) -> EngineResult<GenerationOutcome> {
        let bundle = self
            .context
            .get(bundle_id)
            .ok_or_else(|| EngineError::ContextBundleNotFound(bundle_id.to_string()))?;
        let bundle = &bundle;

        let span_id = self
            .trace
            .open_span(trace_id, Some(parent_span_id), SpanType::Generation, "generator")
            .await?;

        let mut well_formed = self.well_formed_drafts(bundle, n, false).await?;

        let min_required = n.div_ceil(2);
        if well_formed.len() < min_required {
            warn!(
                produced = well_formed.len(),
                min_required, "generator under-produced, retrying with amplified diversity instruction"
            );
            well_formed = self.well_formed_drafts(bundle, n, true).await?;
        }

        let localization_deficit = self.check_localization_deficit(bundle, &well_formed);
        self.trace
            .set_span_metadata(span_id, "localization_deficit", json!(localization_deficit))
            .await?;

        let mut ids = Vec::with_capacity(well_formed.len());
        for draft in well_formed {
            let proposal = Proposal::new_original(
                draft.title,
                draft.description,
                draft.rationale,
                draft.implementation_notes,
                created_at,
            );
            self.repository.add(proposal.clone()).await?;
            ids.push(proposal.id);
        }

        self.trace
            .close_span(
                span_id,
                SpanCloseFields {
                    output_text: Some(format!("{} proposals generated", ids.len())),
                    model: None,
                    tokens_used: None,
                },
            )
            .await?;

        Ok(GenerationOutcome {
            proposal_ids: ids,
            localization_deficit,
        })
    }

    async fn well_formed_drafts(&self, bundle: &ContextBundle, n: usize, amplified: bool) -> EngineResult<Vec<ProposalDraft>> {
        let prompt = build_prompt(bundle, n, amplified);
        let response = self
            .worker
            .invoke(WorkerRequest {
                role: WorkerRole::Generator,
                prompt,
                schema_hint: Some(json!({
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "title": {"type": "string"},
                            "description": {"type": "string"},
                            "rationale": {"type": "string"},
                            "implementation_notes": {"type": "string"}
                        },
                        "required": ["title", "description", "rationale"]
                    }
                })),
            })
            .await?;

        let drafts = parse_drafts(response.parsed.as_ref(), &response.raw_text);
        Ok(drafts.into_iter().filter(ProposalDraft::is_well_formed).collect())
    }

    /// Scans proposals for the jurisdiction identifier (case-insensitive
    /// substring). Flags a deficit when fewer than half mention it. If the
    /// bundle carries no jurisdiction identifier at all, there is nothing to
    /// check against and no flag is raised (spec §4.6).
    fn check_localization_deficit(&self, bundle: &ContextBundle, drafts: &[ProposalDraft]) -> bool {
        let identifier = match bundle.jurisdiction.get(pe_core::field::JURISDICTION) {
            Some(field) => field.value(),
            None => return false,
        };

        if drafts.is_empty() {
            return false;
        }

        let mentioning = drafts.iter().filter(|d| d.mentions(identifier)).count();
        mentioning * 2 < drafts.len()
    }
}
