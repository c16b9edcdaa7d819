pub mod pairing;
pub mod prompt;
pub mod scheduler;
pub mod verdict;

pub use pairing::{rank_candidate_pairs, CandidatePair};
pub use scheduler::{RoundOutcome, RoundState, TournamentScheduler};
