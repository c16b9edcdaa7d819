pub mod drafts;
pub mod generator;
pub mod prompt;

pub use drafts::ProposalDraft;
pub use generator::{GenerationOutcome, Generator};
