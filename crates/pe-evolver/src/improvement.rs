use serde::Deserialize;
use serde_json::Value;

/// One improved variant as returned by the Worker, enumerating the deltas
/// from the proposal it improves on (spec §4.8).
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ImprovedDraft {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub rationale: String,
    #[serde(default)]
    pub implementation_notes: String,
    #[serde(default)]
    pub deltas: Vec<String>,
}

impl ImprovedDraft {
    pub fn is_well_formed(&self) -> bool {
        !self.title.trim().is_empty() && !self.description.trim().is_empty() && !self.rationale.trim().is_empty()
    }
}

/// Parses a Worker reply into an `ImprovedDraft`, tolerating prose wrapped
/// around the JSON object, the same way the Generator tolerates a
/// prose-wrapped array.
pub fn parse_improvement(parsed: Option<&Value>, raw_text: &str) -> Option<ImprovedDraft> {
    if let Some(value) = parsed {
        if let Ok(draft) = serde_json::from_value(value.clone()) {
            return Some(draft);
        }
    }
    if let Ok(draft) = serde_json::from_str(raw_text) {
        return Some(draft);
    }
    extract_first_json_object(raw_text).and_then(|v| serde_json::from_value(v).ok())
}

fn extract_first_json_object(text: &str) -> Option<Value> {
    let start = text.find('{')?;
    let mut depth = 0i32;
    for (offset, ch) in text[start..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
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
