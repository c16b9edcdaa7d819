use serde::Deserialize;
use serde_json::Value;

/// One candidate proposal as returned by the Worker, before it is accepted
/// into the repository as a `Proposal`. Fields are optional on the wire so a
/// partially-shaped reply can still be recognized as malformed rather than
/// panicking on deserialization.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ProposalDraft {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub rationale: String,
    #[serde(default)]
    pub implementation_notes: String,
}

impl ProposalDraft {
    pub fn is_well_formed(&self) -> bool {
        !self.title.trim().is_empty() && !self.description.trim().is_empty() && !self.rationale.trim().is_empty()
    }

    pub fn mentions(&self, needle: &str) -> bool {
        if needle.trim().is_empty() {
            return false;
        }
        let haystack = format!("{} {} {}", self.title, self.description, self.rationale).to_lowercase();
        haystack.contains(&needle.to_lowercase())
    }
}

/// Parses a Worker reply into a list of drafts. Tries a direct array parse
/// first, then falls back to locating the first well-formed `[...]` block
/// in case the Worker wrapped its JSON in prose.
pub fn parse_drafts(parsed: Option<&Value>, raw_text: &str) -> Vec<ProposalDraft> {
    if let Some(value) = parsed {
        if let Ok(drafts) = serde_json::from_value::<Vec<ProposalDraft>>(value.clone()) {
            return drafts;
        }
    }

    if let Ok(drafts) = serde_json::from_str::<Vec<ProposalDraft>>(raw_text) {
        return drafts;
    }

    match extract_first_json_array(raw_text) {
        Some(value) => serde_json::from_value(value).unwrap_or_default(),
        None => Vec::new(),
    }
}

fn extract_first_json_array(text: &str) -> Option<Value> {
    let start = text.find('[')?;
    let mut depth = 0i32;
    for (offset, ch) in text[start..].char_indices() {
        match ch {
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth == 0 {
                    let end = start + offset + 1;
                    return serde_json::from_str(&text[start..end]).ok();
                }
            }
            _ => {}
        }
    }
    None
}
