use async_trait::async_trait;
use serde::Serialize;

/// Health check trait shared by gateways, the trace store, and the repository
/// so the orchestrator can report readiness before committing to a run.
#[async_trait]
pub trait HealthCheck
where
    Self: Send + Sync,
{
    async fn check(&self) -> HealthStatus;

    fn name(&self) -> &str;
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub healthy: bool,
    pub message: Option<String>,
    pub details: Option<serde_json::Value>,
}

impl HealthStatus {
    pub fn healthy() -> Self {
        Self {
            healthy: true,
            message: None,
            details: None,
        }
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self {
            healthy: false,
            message: Some(message.into()),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}
