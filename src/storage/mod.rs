//! Repository interfaces consumed by the engine
//!
//! Every multi-row write the engine performs is expressed as a single
//! repository call so an implementation can apply it as one unit of work:
//! pair claims, contest creation and contest completion.

pub mod memory;

pub use memory::InMemoryStore;

use crate::error::Result;
use crate::matching::roles::Role;
use crate::types::*;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;

/// Read access to user profiles
#[async_trait]
pub trait ProfileRepository: Send + Sync {
    async fn get_profile(&self, user_id: &str) -> Result<Option<Profile>>;

    /// Language codes the user speaks; empty when none are recorded
    async fn get_languages(&self, user_id: &str) -> Result<Vec<String>>;
}

/// Storage for matching queue entries
#[async_trait]
pub trait QueueRepository: Send + Sync {
    /// Cancel the user's live entries and insert `entry` in one step.
    /// Returns the ids of the entries that were cancelled.
    async fn enqueue(&self, entry: MatchRequest) -> Result<Vec<EntryId>>;

    async fn get_entry(&self, entry_id: EntryId) -> Result<Option<MatchRequest>>;

    /// The user's live `searching` entry, if any
    async fn searching_entry_for(&self, user_id: &str) -> Result<Option<MatchRequest>>;

    /// Searching entries with exactly these roles, oldest first
    async fn list_searching(&self, seeking_role: &Role, offering_role: &Role)
        -> Result<Vec<MatchRequest>>;

    /// Searching entries seeking `seeking_role` created no later than `created_at`
    async fn count_searching_since(
        &self,
        seeking_role: &Role,
        created_at: DateTime<Utc>,
    ) -> Result<usize>;

    /// Move the user's searching entries to `cancelled`; returns the affected ids
    async fn cancel_searching(&self, user_id: &str) -> Result<Vec<EntryId>>;

    /// Conditionally flip both entries `searching -> matched` and persist the
    /// relationship with its opening milestone. Fails with `Conflict` and
    /// writes nothing if either entry has already left `searching`.
    async fn claim_pair(
        &self,
        requester_entry: EntryId,
        candidate_entry: EntryId,
        relationship: Relationship,
        milestone: Milestone,
    ) -> Result<Relationship>;
}

/// Storage for bonded pairs
#[async_trait]
pub trait RelationshipRepository: Send + Sync {
    async fn get_relationship(&self, id: RelationshipId) -> Result<Option<Relationship>>;

    /// Users that currently share an active relationship with `user_id`
    async fn active_partners_of(&self, user_id: &str) -> Result<HashSet<UserId>>;

    async fn list_relationships_for(&self, user_id: &str) -> Result<Vec<Relationship>>;

    /// Timeline of a relationship, newest first
    async fn list_milestones(&self, relationship_id: RelationshipId) -> Result<Vec<Milestone>>;
}

/// Storage for extracted facts
#[async_trait]
pub trait FactRepository: Send + Sync {
    async fn insert_facts(&self, facts: Vec<Fact>) -> Result<()>;

    /// Unused facts about `user_id` in one relationship, in insertion order
    async fn unused_facts(&self, user_id: &str, relationship_id: RelationshipId)
        -> Result<Vec<Fact>>;

    async fn list_facts(&self, relationship_id: RelationshipId) -> Result<Vec<Fact>>;
}

/// Final scores and progression changes applied when a contest closes
#[derive(Debug, Clone, PartialEq)]
pub struct ContestCompletion {
    pub contest_id: ContestId,
    pub user_a_score: u32,
    pub user_b_score: u32,
    pub total_score: u32,
    pub is_synchronized: bool,
    pub bond_points_awarded: u32,
    pub care_gain: u32,
    pub care_cap: u32,
    pub won: bool,
    pub completed_at: DateTime<Utc>,
}

/// Storage for contests and their questions
#[async_trait]
pub trait ContestRepository: Send + Sync {
    /// Flag `consumed_facts` as used and insert the contest with its
    /// questions in one step. Fails with `Conflict` and writes nothing if
    /// any of the facts was already used.
    async fn create_contest(
        &self,
        contest: Contest,
        questions: Vec<ContestQuestion>,
        consumed_facts: &[FactId],
    ) -> Result<Contest>;

    async fn get_contest(&self, contest_id: ContestId) -> Result<Option<Contest>>;

    /// Contests of one relationship, newest first
    async fn list_contests(&self, relationship_id: RelationshipId) -> Result<Vec<Contest>>;

    /// Questions of one contest ordered by `question_order`
    async fn get_questions(&self, contest_id: ContestId) -> Result<Vec<ContestQuestion>>;

    async fn get_question(&self, question_id: QuestionId) -> Result<Option<ContestQuestion>>;

    /// Write one member's answer slot, replacing any earlier answer.
    /// Fails with `Conflict` once the contest is completed.
    async fn record_answer(
        &self,
        question_id: QuestionId,
        slot: MemberSlot,
        answer: AnswerRecord,
    ) -> Result<ContestQuestion>;

    /// Freeze the contest scores and fold the award into its relationship.
    /// Fails with `Conflict` if the contest is already completed.
    async fn commit_completion(&self, completion: ContestCompletion)
        -> Result<(Contest, Relationship)>;
}
