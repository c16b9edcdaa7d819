pub mod elo;
pub mod proposals;

pub use elo::apply_elo_update;
pub use proposals::ProposalRepository;
