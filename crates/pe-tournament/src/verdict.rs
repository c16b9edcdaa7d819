use pe_core::Proposal;
use serde::Deserialize;
use serde_json::Value;

/// Raw verdict shape the Worker is asked to return for a single pairwise
/// comparison (spec §4.7): the winning proposal identified by its full
/// title, plus a one-paragraph rationale.
#[derive(Debug, Clone, Deserialize)]
pub struct RawVerdict {
    pub winner_title: String,
    #[serde(default)]
    pub rationale: String,
}

/// Resolves a raw verdict to one of `a`/`b` by exact title match, then by
/// normalized title (lowercased, whitespace-collapsed), else `None` for an
/// inconclusive comparison (spec §4.7).
pub fn resolve_winner<'a>(raw: &RawVerdict, a: &'a Proposal, b: &'a Proposal) -> Option<&'a Proposal> {
    if raw.winner_title == a.title {
        return Some(a);
    }
    if raw.winner_title == b.title {
        return Some(b);
    }

    let normalized_winner = normalize(&raw.winner_title);
    if normalized_winner == normalize(&a.title) {
        return Some(a);
    }
    if normalized_winner == normalize(&b.title) {
        return Some(b);
    }

    None
}

fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// Parses a Worker reply into a `RawVerdict`, tolerating prose wrapped
/// around the JSON object.
pub fn parse_verdict(parsed: Option<&Value>, raw_text: &str) -> Option<RawVerdict> {
    if let Some(value) = parsed {
        if let Ok(verdict) = serde_json::from_value(value.clone()) {
            return Some(verdict);
        }
    }
    if let Ok(verdict) = serde_json::from_str(raw_text) {
        return Some(verdict);
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
