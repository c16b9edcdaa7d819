use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Structured token accounting, shared by `WorkerMetadata` and `Span`
/// (spec §3, §4.3: "stored in a structured form capturing prompt_tokens,
/// completion_tokens, total_tokens when available").
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkerMetadata {
    pub model: String,
    pub response_id: String,
    pub token_usage: TokenUsage,
}

/// Outcome of a single pairwise comparison. `Inconclusive` arises when the
/// Worker's verdict text cannot be matched to either proposal in the pair
/// (§4.7) — in that case no Elo change is applied but the comparison still
/// counts against the round's pair budget.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ComparisonVerdict {
    Decisive { winner_id: Uuid, loser_id: Uuid },
    Inconclusive,
}

/// Append-only record of one scheduled pairwise comparison (spec §3).
/// `pair` is canonicalized (`a_id < b_id`) so a comparison and its
/// positional-swap rerun dedup against the same logical pair while still
/// being recorded as two distinct `ComparisonRecord`s.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ComparisonRecord {
    pub round: u32,
    pub pair: (Uuid, Uuid),
    pub verdict: ComparisonVerdict,
    pub rationale_text: String,
    pub worker_metadata: WorkerMetadata,
    pub created_at: DateTime<Utc>,
}

impl ComparisonRecord {
    /// Canonicalizes `(a, b)` so the smaller UUID is always first,
    /// satisfying the dedup invariant from spec §3/§9.
    pub fn canonical_pair(a: Uuid, b: Uuid) -> (Uuid, Uuid) {
        if a < b {
            (a, b)
        } else {
            (b, a)
        }
    }

    pub fn decisive(
        round: u32,
        a: Uuid,
        b: Uuid,
        winner_id: Uuid,
        rationale_text: impl Into<String>,
        worker_metadata: WorkerMetadata,
        created_at: DateTime<Utc>,
    ) -> Self {
        let loser_id = if winner_id == a { b } else { a };
        Self {
            round,
            pair: Self::canonical_pair(a, b),
            verdict: ComparisonVerdict::Decisive { winner_id, loser_id },
            rationale_text: rationale_text.into(),
            worker_metadata,
            created_at,
        }
    }

    pub fn inconclusive(
        round: u32,
        a: Uuid,
        b: Uuid,
        rationale_text: impl Into<String>,
        worker_metadata: WorkerMetadata,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            round,
            pair: Self::canonical_pair(a, b),
            verdict: ComparisonVerdict::Inconclusive,
            rationale_text: rationale_text.into(),
            worker_metadata,
            created_at,
        }
    }

    pub fn is_inconclusive(&self) -> bool {
        matches!(self.verdict, ComparisonVerdict::Inconclusive)
    }
}
