use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyType {
    Research,
    Analysis,
    Evolution,
    Integrated,
}

impl std::fmt::Display for PolicyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            PolicyType::Research => "research",
            PolicyType::Analysis => "analysis",
            PolicyType::Evolution => "evolution",
            PolicyType::Integrated => "integrated",
        };
        write!(f, "{label}")
    }
}

/// The root record aggregating all spans produced by a single run (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trace {
    pub trace_id: Uuid,
    pub policy_query: String,
    pub policy_type: PolicyType,
    pub created_at: DateTime<Utc>,
    pub agent_count: u32,
    pub total_duration_ms: Option<i64>,
    pub external_trace_id: Option<String>,
    pub metadata: std::collections::HashMap<String, serde_json::Value>,
}

impl Trace {
    pub fn new(
        policy_query: impl Into<String>,
        policy_type: PolicyType,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            trace_id: Uuid::new_v4(),
            policy_query: policy_query.into(),
            policy_type,
            created_at,
            agent_count: 0,
            total_duration_ms: None,
            external_trace_id: None,
            metadata: std::collections::HashMap::new(),
        }
    }
}
