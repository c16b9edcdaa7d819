mod comparison;
mod jurisdiction;
mod proposal;
mod query;
mod research;
mod span;
mod trace;

pub use comparison::{ComparisonRecord, ComparisonVerdict, TokenUsage, WorkerMetadata};
pub use jurisdiction::{field, JurisdictionContext, JurisdictionField};
pub use proposal::Proposal;
pub use query::PolicyQuery;
pub use research::{ResearchBundle, SearchHit};
pub use span::{Span, SpanType};
pub use trace::{PolicyType, Trace};
