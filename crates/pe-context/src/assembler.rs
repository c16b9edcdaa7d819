use std::sync::Arc;

use dashmap::DashMap;
use pe_core::{JurisdictionContext, PolicyQuery, ResearchBundle, SpanType};
use pe_gateway::SearchGateway;
use pe_trace::{SharedTraceStore, SpanCloseFields};
use uuid::Uuid;

use crate::bundle::ContextBundle;

/// Assembles the single `ContextBundle` consumed by every downstream
/// component of a run (§4.5). Every bundle it builds stays in its own
/// `bundles` store, keyed by `bundle_id`; `assemble` hands callers the ID
/// rather than the bundle itself, and `get` is the only way back to the
/// contents.
pub struct ContextAssembler {
    search: Arc<dyn SearchGateway>,
    trace: SharedTraceStore,
    bundles: DashMap<Uuid, ContextBundle>,
}

impl ContextAssembler {
    pub fn new(search: Arc<dyn SearchGateway>, trace: SharedTraceStore) -> Self {
        Self {
            search,
            trace,
            bundles: DashMap::new(),
        }
    }

    /// Looks up a bundle previously produced by `assemble`. Downstream
    /// components hold only the `bundle_id`; this is the one place that
    /// dereferences it back to the bundle's contents.
    pub fn get(&self, bundle_id: Uuid) -> Option<ContextBundle> {
        self.bundles.get(&bundle_id).map(|entry| entry.value().clone())
    }

    /// Builds a `ContextBundle` for `query_text` under the given jurisdiction
    /// profile. Opens a `ContextAssembly` span under `parent_span_id`; if the
    /// jurisdiction carries no fields at all, also opens and closes a
    /// `Warning` span rather than failing the assembly (§4.5).
    pub async fn assemble(
        &self,
        trace_id: Uuid,
        parent_span_id: Uuid,
        query_text: &str,
        jurisdiction: JurisdictionContext,
        max_search_results: u32,
    ) -> pe_core::EngineResult<Uuid> {
        let span_id = self
            .trace
            .open_span(trace_id, Some(parent_span_id), SpanType::ContextAssembly, "context-assembler")
            .await?;

        if jurisdiction.is_empty() {
            self.warn_empty_jurisdiction(trace_id, span_id).await?;
        }

        let outcome = self
            .search
            .search(query_text, max_search_results)
            .await
            .unwrap_or_else(|_| pe_gateway::SearchOutcome {
                hits: Vec::new(),
                degraded: true,
            });

        let research = ResearchBundle::new(
            outcome.hits.clone(),
            summarize(&outcome.hits),
            outcome.degraded,
        );

        let bundle_id = Uuid::new_v4();
        let query = PolicyQuery::new(query_text, &bundle_id.to_string());
        let bundle = ContextBundle::with_id(bundle_id, query, jurisdiction, research);

        self.trace
            .set_span_metadata(span_id, "search_degraded", serde_json::json!(bundle.research.degraded))
            .await?;

        self.trace
            .close_span(
                span_id,
                SpanCloseFields {
                    output_text: Some(format!("assembled bundle {}", bundle.bundle_id())),
                    model: None,
                    tokens_used: None,
                },
            )
            .await?;

        self.bundles.insert(bundle_id, bundle);
        Ok(bundle_id)
    }

    async fn warn_empty_jurisdiction(&self, trace_id: Uuid, parent_span_id: Uuid) -> pe_core::EngineResult<()> {
        let warning_span = self
            .trace
            .open_span(trace_id, Some(parent_span_id), SpanType::Warning, "context-assembler")
            .await?;
        self.trace
            .close_span(
                warning_span,
                SpanCloseFields {
                    output_text: Some("context bundle assembled with no jurisdiction fields".to_string()),
                    model: None,
                    tokens_used: None,
                },
            )
            .await
    }
}

fn summarize(hits: &[pe_core::SearchHit]) -> String {
    if hits.is_empty() {
        return String::new();
    }
    hits.iter()
        .map(|h| h.snippet.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}
