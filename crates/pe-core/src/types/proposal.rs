use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const INITIAL_ELO: f64 = 1200.0;

/// A candidate policy recommendation. Owned exclusively by the Proposal
/// Repository (C4) — every other component refers to a proposal by `id`.
///
/// Invariants (spec §3, §8): `parent_id` forms a forest (no cycles);
/// `generation` of a child is exactly `generation` of its parent + 1.
/// Mutated only through Elo updates and `superseded`; never deleted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Proposal {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub rationale: String,
    pub implementation_notes: String,
    pub generation: u32,
    pub parent_id: Option<Uuid>,
    pub elo: f64,
    pub created_at: DateTime<Utc>,
    pub superseded: bool,
}

impl Proposal {
    /// Construct a generation-0 proposal (produced by the Generator).
    pub fn new_original(
        title: impl Into<String>,
        description: impl Into<String>,
        rationale: impl Into<String>,
        implementation_notes: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            description: description.into(),
            rationale: rationale.into(),
            implementation_notes: implementation_notes.into(),
            generation: 0,
            parent_id: None,
            elo: INITIAL_ELO,
            created_at,
            superseded: false,
        }
    }

    /// Construct a child proposal produced by the Evolver (§4.8): generation
    /// is parent.generation + 1, initial Elo carries forward the parent's
    /// rating rather than resetting to 1200.
    pub fn new_child_of(
        parent: &Proposal,
        title: impl Into<String>,
        description: impl Into<String>,
        rationale: impl Into<String>,
        implementation_notes: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            description: description.into(),
            rationale: rationale.into(),
            implementation_notes: implementation_notes.into(),
            generation: parent.generation + 1,
            parent_id: Some(parent.id),
            elo: parent.elo,
            created_at,
            superseded: false,
        }
    }

    pub fn is_well_formed(&self) -> bool {
        !self.title.trim().is_empty()
            && !self.description.trim().is_empty()
            && !self.rationale.trim().is_empty()
    }

    /// Case-insensitive substring match used by the Generator's localization
    /// check (§4.6).
    pub fn mentions(&self, needle: &str) -> bool {
        if needle.trim().is_empty() {
            return false;
        }
        let haystack = format!("{} {} {}", self.title, self.description, self.rationale).to_lowercase();
        haystack.contains(&needle.to_lowercase())
    }
}
