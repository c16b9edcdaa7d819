use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Replaces the dynamically-typed context fields of the collaborator CLI
/// with a closed sum type: every field is either a value that passed its
/// declared shape (`Typed`) or free text that didn't and was relocated
/// (`FreeText`). Nothing is ever dropped (§3 invariant, §9 design note).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum JurisdictionField {
    Typed(String),
    FreeText(String),
}

impl JurisdictionField {
    pub fn value(&self) -> &str {
        match self {
            JurisdictionField::Typed(v) => v,
            JurisdictionField::FreeText(v) => v,
        }
    }

    pub fn is_free_text(&self) -> bool {
        matches!(self, JurisdictionField::FreeText(_))
    }
}

/// Well-known field keys. Unknown keys are still accepted and preserved
/// verbatim (§3) — these constants only exist so components can refer to the
/// keys they care about without typo-prone string literals.
pub mod field {
    pub const JURISDICTION: &str = "jurisdiction";
    pub const POPULATION: &str = "population";
    pub const ECONOMIC_CONTEXT: &str = "economic_context";
    pub const EXISTING_POLICIES: &str = "existing_policies";
    pub const POLITICAL_LANDSCAPE: &str = "political_landscape";
    pub const BUDGET: &str = "budget";
    pub const LOCAL_CHALLENGES: &str = "local_challenges";
    pub const STAKEHOLDERS: &str = "stakeholders";
    pub const DEMOGRAPHICS: &str = "demographics";
    pub const PRIOR_ATTEMPTS: &str = "prior_attempts";
    pub const BUDGET_CYCLE: &str = "budget_cycle";
    pub const ELECTION_TIMELINE: &str = "election_timeline";
    pub const NOTES: &str = "notes";
}

/// Verbatim jurisdictional profile attached to a `PolicyQuery`. All fields
/// are optional and unknown keys are preserved so later prompt-construction
/// code can still see whatever the collaborator CLI collected.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct JurisdictionContext {
    fields: HashMap<String, JurisdictionField>,
}

/// Outcome of a strict-field validation attempt, used by the Context
/// Assembler to decide whether to emit a `ContextValidation` warning.
pub struct Relocated {
    pub field: String,
    pub reason: String,
}

impl JurisdictionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field verbatim as a typed value, no validation.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.fields
            .insert(key.into(), JurisdictionField::Typed(value.into()));
    }

    /// Set a field that the CLI expects to be yes/no-shaped. If the supplied
    /// value doesn't parse as yes/no, it is relocated into the free-text
    /// notes field instead of being discarded (§4.5, scenario 4).
    pub fn set_yes_no(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<Relocated> {
        let key = key.into();
        let value = value.into();
        match normalize_yes_no(&value) {
            Some(normalized) => {
                self.fields
                    .insert(key, JurisdictionField::Typed(normalized.to_string()));
                None
            }
            None => {
                let reason = format!("expected yes/no, got '{value}'");
                self.append_note(format!("{key}: {value}"));
                Some(Relocated { field: key, reason })
            }
        }
    }

    /// Set a field that the CLI expects to be a non-negative integer
    /// (e.g. population). Non-numeric input is relocated to notes.
    pub fn set_numeric(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<Relocated> {
        let key = key.into();
        let value = value.into();
        if value.trim().parse::<u64>().is_ok() {
            self.fields.insert(key, JurisdictionField::Typed(value));
            None
        } else {
            let reason = format!("expected a non-negative integer, got '{value}'");
            self.append_note(format!("{key}: {value}"));
            Some(Relocated { field: key, reason })
        }
    }

    pub fn append_note(&mut self, text: impl AsRef<str>) {
        let entry = self
            .fields
            .entry(field::NOTES.to_string())
            .or_insert_with(|| JurisdictionField::FreeText(String::new()));
        let JurisdictionField::FreeText(notes) = entry else {
            unreachable!("notes field is always FreeText by construction")
        };
        if !notes.is_empty() {
            notes.push_str("; ");
        }
        notes.push_str(text.as_ref());
    }

    pub fn get(&self, key: &str) -> Option<&JurisdictionField> {
        self.fields.get(key)
    }

    pub fn notes(&self) -> Option<&str> {
        self.fields.get(field::NOTES).map(JurisdictionField::value)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &JurisdictionField)> {
        self.fields.iter()
    }
}

fn normalize_yes_no(value: &str) -> Option<&'static str> {
    match value.trim().to_lowercase().as_str() {
        "yes" | "y" | "true" => Some("yes"),
        "no" | "n" | "false" => Some("no"),
        _ => None,
    }
}
