use pe_core::{JurisdictionContext, PolicyQuery, ResearchBundle};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-request context bundle (spec §4.5): a jurisdiction profile plus a
/// research synthesis, paired with the query they were assembled for.
///
/// Immutable once constructed. Downstream components thread `bundle_id`
/// rather than a clone of the bundle itself — only the assembler that built
/// it ever dereferences the ID against its own store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContextBundle {
    bundle_id: Uuid,
    pub query: PolicyQuery,
    pub jurisdiction: JurisdictionContext,
    pub research: ResearchBundle,
}

impl ContextBundle {
    /// `bundle_id` is minted by the caller before the query's fingerprint is
    /// computed, since the fingerprint is defined over the bundle it is
    /// paired with (see `PolicyQuery::new`).
    pub fn with_id(
        bundle_id: Uuid,
        query: PolicyQuery,
        jurisdiction: JurisdictionContext,
        research: ResearchBundle,
    ) -> Self {
        Self {
            bundle_id,
            query,
            jurisdiction,
            research,
        }
    }

    pub fn bundle_id(&self) -> Uuid {
        self.bundle_id
    }
}
