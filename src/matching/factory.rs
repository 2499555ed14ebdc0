//! Builds the records written when a pair is claimed

use crate::types::{MatchRequest, Milestone, MilestoneKind, Relationship, RelationshipStatus};
use crate::utils::{current_timestamp, generate_id};

/// Display value of the milestone every new relationship starts with
const FIRST_MATCH_POINTS: u32 = 5;

/// Creates bonded pairs from two claimed queue entries
#[derive(Debug, Clone, Copy, Default)]
pub struct RelationshipFactory;

impl RelationshipFactory {
    pub fn new() -> Self {
        Self
    }

    /// The requester becomes member A; each side keeps the role it offered
    pub fn pair(&self, requester: &MatchRequest, candidate: &MatchRequest) -> Relationship {
        Relationship {
            id: generate_id(),
            user_a_id: requester.user_id.clone(),
            user_b_id: candidate.user_id.clone(),
            user_a_role: requester.offering_role.clone(),
            user_b_role: candidate.offering_role.clone(),
            status: RelationshipStatus::Active,
            level: 1,
            bond_points: 0,
            care_score: 0,
            contests_completed: 0,
            contests_won: 0,
            matched_at: current_timestamp(),
        }
    }

    /// The "First Match!" entry that opens a relationship's timeline
    pub fn first_milestone(&self, relationship: &Relationship) -> Milestone {
        Milestone {
            id: generate_id(),
            relationship_id: relationship.id,
            kind: MilestoneKind::Matched,
            title: "First Match!".to_string(),
            description: "A beautiful bond has begun!".to_string(),
            bond_points_awarded: FIRST_MATCH_POINTS,
            achieved_at: relationship.matched_at,
        }
    }
}
