use serde::{Deserialize, Serialize};

/// One hit returned by the Search Gateway (§4.2).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchHit {
    pub query: String,
    pub snippet: String,
    pub url: String,
    pub source: String,
}

/// Ordered sequence of search hits plus a synthesized summary, assembled by
/// the Context Assembler (C5) before the Generator ever sees a prompt.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResearchBundle {
    pub hits: Vec<SearchHit>,
    pub summary: String,
    /// Propagated from the Search Gateway when every provider failed and a
    /// deterministic mock-hit list was substituted (§4.2).
    pub degraded: bool,
}

impl ResearchBundle {
    pub fn new(hits: Vec<SearchHit>, summary: impl Into<String>, degraded: bool) -> Self {
        Self {
            hits,
            summary: summary.into(),
            degraded,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }
}
