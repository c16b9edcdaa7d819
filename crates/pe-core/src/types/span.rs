use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::comparison::TokenUsage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanType {
    Root,
    ContextAssembly,
    Generation,
    Comparison,
    Evolution,
    Warning,
}

impl std::fmt::Display for SpanType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            SpanType::Root => "root",
            SpanType::ContextAssembly => "context_assembly",
            SpanType::Generation => "generation",
            SpanType::Comparison => "comparison",
            SpanType::Evolution => "evolution",
            SpanType::Warning => "warning",
        };
        write!(f, "{label}")
    }
}

/// A single timed record of one component operation (spec §3). Owned
/// exclusively by the Trace Store; every other component refers to spans by
/// ID when it needs to reference one (e.g. a `ComparisonRecord`'s span).
///
/// `ended_at`/`duration_ms` are `None` while the span is open. `forced`
/// records a span that was closed by `end_trace` rather than explicitly by
/// its owner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Span {
    pub span_id: Uuid,
    pub trace_id: Uuid,
    pub parent_span_id: Option<Uuid>,
    pub span_type: SpanType,
    pub agent_name: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub input_text: Option<String>,
    pub output_text: Option<String>,
    pub model: Option<String>,
    pub tokens_used: Option<TokenUsage>,
    pub metadata: HashMap<String, serde_json::Value>,
    pub forced: bool,
    pub dropped: bool,
}

impl Span {
    pub fn open(
        trace_id: Uuid,
        parent_span_id: Option<Uuid>,
        span_type: SpanType,
        agent_name: impl Into<String>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            span_id: Uuid::new_v4(),
            trace_id,
            parent_span_id,
            span_type,
            agent_name: agent_name.into(),
            started_at,
            ended_at: None,
            duration_ms: None,
            input_text: None,
            output_text: None,
            model: None,
            tokens_used: None,
            metadata: HashMap::new(),
            forced: false,
            dropped: false,
        }
    }

    pub fn is_open(&self) -> bool {
        self.ended_at.is_none()
    }

    pub fn close(
        &mut self,
        output_text: Option<String>,
        model: Option<String>,
        tokens_used: Option<TokenUsage>,
        ended_at: DateTime<Utc>,
        forced: bool,
    ) {
        self.ended_at = Some(ended_at);
        self.duration_ms = Some((ended_at - self.started_at).num_milliseconds().max(0));
        self.output_text = output_text;
        self.model = model;
        self.tokens_used = tokens_used;
        self.forced = forced;
    }

    pub fn set_metadata(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.metadata.insert(key.into(), value);
    }
}
