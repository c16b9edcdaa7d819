use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure classification shared by the Worker and Search Gateways (§7).
///
/// `Transient` and `RateLimited` are recoverable by the caller; `Malformed`
/// gets exactly one reinforced retry at the gateway; `Fatal` always
/// propagates to the orchestrator.
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum FailureKind {
    #[error("transient failure: {0}")]
    Transient(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("fatal: {0}")]
    Fatal(String),
}

impl FailureKind {
    pub fn is_retriable_by_backoff(&self) -> bool {
        matches!(self, FailureKind::Transient(_))
    }

    pub fn aborts_round(&self) -> bool {
        matches!(self, FailureKind::RateLimited(_) | FailureKind::Fatal(_))
    }
}

/// Top-level error type threaded through every Policy Evolution Engine crate.
///
/// Each variant maps onto one of the severities in spec §7. Gateways never
/// raise anything but `Worker`/`Search` (wrapping `FailureKind::Fatal`) to the
/// orchestrator; everything else is handled internally per the component's
/// own contract.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("worker gateway exhausted after {attempts} attempt(s): {last_message}")]
    Worker {
        kind: FailureKind,
        attempts: u32,
        last_message: String,
    },

    #[error("search gateway failure: {0}")]
    Search(String),

    #[error("span parent invalid: {0}")]
    SpanParentInvalid(String),

    #[error("span not open: {0}")]
    SpanNotOpen(String),

    #[error("span closed out of order: {0}")]
    SpanCloseOrder(String),

    #[error("trace store file sink failure: {0}")]
    TraceFileSink(String),

    #[error("repository invariant violated: {0}")]
    RepositoryInvariant(String),

    #[error("context validation relocated field {field} to notes: {reason}")]
    ContextValidation { field: String, reason: String },

    #[error("context bundle not found: {0}")]
    ContextBundleNotFound(String),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("fatal: {0}")]
    Fatal(String),
}

impl EngineError {
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EngineError::SpanParentInvalid(_)
                | EngineError::SpanNotOpen(_)
                | EngineError::SpanCloseOrder(_)
                | EngineError::TraceFileSink(_)
                | EngineError::RepositoryInvariant(_)
                | EngineError::ContextBundleNotFound(_)
                | EngineError::Fatal(_)
        ) || matches!(self, EngineError::Worker { kind, .. } if matches!(kind, FailureKind::Fatal(_)))
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
