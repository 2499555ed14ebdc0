//! Role compatibility, candidate scoring and the matching queue

pub mod factory;
pub mod queue;
pub mod roles;
pub mod scorer;

pub use factory::RelationshipFactory;
pub use queue::{ClaimedMatch, MatchQueue};
pub use roles::{complement, Role, RoleInfo};
pub use scorer::{CandidateProfile, MatchScorer, RequesterProfile, ScoreBreakdown, WeightedMatchScorer};
