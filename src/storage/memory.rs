//! In-memory implementation of every repository
//!
//! All tables live behind one lock, so each trait method is a single
//! critical section and the multi-row writes are atomic.

use crate::error::{BondError, Result};
use crate::matching::roles::Role;
use crate::storage::{
    ContestCompletion, ContestRepository, FactRepository, ProfileRepository, QueueRepository,
    RelationshipRepository,
};
use crate::types::*;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Default)]
struct StoreState {
    profiles: HashMap<UserId, Profile>,
    languages: HashMap<UserId, Vec<String>>,
    queue: Vec<MatchRequest>,
    relationships: HashMap<RelationshipId, Relationship>,
    milestones: Vec<Milestone>,
    facts: Vec<Fact>,
    contests: HashMap<ContestId, Contest>,
    questions: HashMap<QuestionId, ContestQuestion>,
}

/// Process-local store used by the service binary and the test suites
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<StoreState>,
    offline: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every repository call fail with `RepositoryUnavailable`
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, StoreState>> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(BondError::unavailable("store is offline"));
        }
        self.state
            .read()
            .map_err(|_| BondError::unavailable("Failed to acquire store read lock"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, StoreState>> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(BondError::unavailable("store is offline"));
        }
        self.state
            .write()
            .map_err(|_| BondError::unavailable("Failed to acquire store write lock"))
    }

    /// Insert or replace a profile together with its language codes
    pub fn upsert_profile(&self, profile: Profile, languages: Vec<String>) -> Result<()> {
        let mut state = self.write()?;
        state.languages.insert(profile.user_id.clone(), languages);
        state.profiles.insert(profile.user_id.clone(), profile);
        Ok(())
    }

    /// Insert a relationship directly, bypassing the queue
    pub fn insert_relationship(&self, relationship: Relationship) -> Result<()> {
        let mut state = self.write()?;
        state.relationships.insert(relationship.id, relationship);
        Ok(())
    }

    pub fn set_relationship_status(
        &self,
        id: RelationshipId,
        status: RelationshipStatus,
    ) -> Result<()> {
        let mut state = self.write()?;
        let relationship = state
            .relationships
            .get_mut(&id)
            .ok_or_else(|| BondError::not_found("relationship", id))?;
        relationship.status = status;
        Ok(())
    }

    pub fn relationship_count(&self) -> Result<usize> {
        Ok(self.read()?.relationships.len())
    }
}

#[async_trait]
impl ProfileRepository for InMemoryStore {
    async fn get_profile(&self, user_id: &str) -> Result<Option<Profile>> {
        Ok(self.read()?.profiles.get(user_id).cloned())
    }

    async fn get_languages(&self, user_id: &str) -> Result<Vec<String>> {
        Ok(self
            .read()?
            .languages
            .get(user_id)
            .cloned()
            .unwrap_or_default())
    }
}

fn cancel_live_entries(state: &mut StoreState, user_id: &str) -> Vec<EntryId> {
    state
        .queue
        .iter_mut()
        .filter(|entry| entry.user_id == user_id && entry.status == QueueStatus::Searching)
        .map(|entry| {
            entry.status = QueueStatus::Cancelled;
            entry.id
        })
        .collect()
}

#[async_trait]
impl QueueRepository for InMemoryStore {
    async fn enqueue(&self, entry: MatchRequest) -> Result<Vec<EntryId>> {
        let mut state = self.write()?;
        let cancelled = cancel_live_entries(&mut state, &entry.user_id);
        state.queue.push(entry);
        Ok(cancelled)
    }

    async fn get_entry(&self, entry_id: EntryId) -> Result<Option<MatchRequest>> {
        Ok(self
            .read()?
            .queue
            .iter()
            .find(|entry| entry.id == entry_id)
            .cloned())
    }

    async fn searching_entry_for(&self, user_id: &str) -> Result<Option<MatchRequest>> {
        Ok(self
            .read()?
            .queue
            .iter()
            .rev()
            .find(|entry| entry.user_id == user_id && entry.status == QueueStatus::Searching)
            .cloned())
    }

    async fn list_searching(
        &self,
        seeking_role: &Role,
        offering_role: &Role,
    ) -> Result<Vec<MatchRequest>> {
        Ok(self
            .read()?
            .queue
            .iter()
            .filter(|entry| {
                entry.status == QueueStatus::Searching
                    && &entry.seeking_role == seeking_role
                    && &entry.offering_role == offering_role
            })
            .cloned()
            .collect())
    }

    async fn count_searching_since(
        &self,
        seeking_role: &Role,
        created_at: DateTime<Utc>,
    ) -> Result<usize> {
        Ok(self
            .read()?
            .queue
            .iter()
            .filter(|entry| {
                entry.status == QueueStatus::Searching
                    && &entry.seeking_role == seeking_role
                    && entry.created_at <= created_at
            })
            .count())
    }

    async fn cancel_searching(&self, user_id: &str) -> Result<Vec<EntryId>> {
        let mut state = self.write()?;
        Ok(cancel_live_entries(&mut state, user_id))
    }

    async fn claim_pair(
        &self,
        requester_entry: EntryId,
        candidate_entry: EntryId,
        relationship: Relationship,
        milestone: Milestone,
    ) -> Result<Relationship> {
        let mut state = self.write()?;

        let requester_idx = state
            .queue
            .iter()
            .position(|entry| entry.id == requester_entry)
            .ok_or_else(|| BondError::not_found("queue entry", requester_entry))?;
        let candidate_idx = state
            .queue
            .iter()
            .position(|entry| entry.id == candidate_entry)
            .ok_or_else(|| BondError::not_found("queue entry", candidate_entry))?;

        // Compare both before touching either
        for idx in [requester_idx, candidate_idx] {
            if state.queue[idx].status != QueueStatus::Searching {
                return Err(BondError::conflict(format!(
                    "queue entry {} is no longer searching",
                    state.queue[idx].id
                )));
            }
        }

        let requester_user = state.queue[requester_idx].user_id.clone();
        let candidate_user = state.queue[candidate_idx].user_id.clone();
        let matched_at = relationship.matched_at;

        let requester = &mut state.queue[requester_idx];
        requester.status = QueueStatus::Matched;
        requester.matched_with = Some(candidate_user);
        requester.matched_at = Some(matched_at);

        let candidate = &mut state.queue[candidate_idx];
        candidate.status = QueueStatus::Matched;
        candidate.matched_with = Some(requester_user);
        candidate.matched_at = Some(matched_at);

        state
            .relationships
            .insert(relationship.id, relationship.clone());
        state.milestones.push(milestone);
        Ok(relationship)
    }
}

#[async_trait]
impl RelationshipRepository for InMemoryStore {
    async fn get_relationship(&self, id: RelationshipId) -> Result<Option<Relationship>> {
        Ok(self.read()?.relationships.get(&id).cloned())
    }

    async fn active_partners_of(&self, user_id: &str) -> Result<HashSet<UserId>> {
        Ok(self
            .read()?
            .relationships
            .values()
            .filter(|rel| rel.is_active())
            .filter_map(|rel| rel.partner_of(user_id).cloned())
            .collect())
    }

    async fn list_relationships_for(&self, user_id: &str) -> Result<Vec<Relationship>> {
        let mut relationships: Vec<Relationship> = self
            .read()?
            .relationships
            .values()
            .filter(|rel| rel.slot_of(user_id).is_some())
            .cloned()
            .collect();
        relationships.sort_by(|a, b| b.matched_at.cmp(&a.matched_at));
        Ok(relationships)
    }

    async fn list_milestones(&self, relationship_id: RelationshipId) -> Result<Vec<Milestone>> {
        let mut milestones: Vec<Milestone> = self
            .read()?
            .milestones
            .iter()
            .filter(|milestone| milestone.relationship_id == relationship_id)
            .cloned()
            .collect();
        milestones.sort_by(|a, b| b.achieved_at.cmp(&a.achieved_at));
        Ok(milestones)
    }
}

#[async_trait]
impl FactRepository for InMemoryStore {
    async fn insert_facts(&self, facts: Vec<Fact>) -> Result<()> {
        self.write()?.facts.extend(facts);
        Ok(())
    }

    async fn unused_facts(
        &self,
        user_id: &str,
        relationship_id: RelationshipId,
    ) -> Result<Vec<Fact>> {
        Ok(self
            .read()?
            .facts
            .iter()
            .filter(|fact| {
                fact.user_id == user_id
                    && fact.relationship_id == relationship_id
                    && !fact.used_in_contest
            })
            .cloned()
            .collect())
    }

    async fn list_facts(&self, relationship_id: RelationshipId) -> Result<Vec<Fact>> {
        Ok(self
            .read()?
            .facts
            .iter()
            .filter(|fact| fact.relationship_id == relationship_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ContestRepository for InMemoryStore {
    async fn create_contest(
        &self,
        contest: Contest,
        questions: Vec<ContestQuestion>,
        consumed_facts: &[FactId],
    ) -> Result<Contest> {
        let mut state = self.write()?;

        let wanted: HashSet<&FactId> = consumed_facts.iter().collect();
        let mut found = 0;
        for fact in state.facts.iter().filter(|f| wanted.contains(&f.id)) {
            if fact.used_in_contest {
                return Err(BondError::conflict(format!(
                    "fact {} already used in a contest",
                    fact.id
                )));
            }
            found += 1;
        }
        if found != wanted.len() {
            return Err(BondError::not_found("fact", "one or more consumed facts"));
        }

        for fact in state.facts.iter_mut().filter(|f| wanted.contains(&f.id)) {
            fact.used_in_contest = true;
        }
        for question in questions {
            state.questions.insert(question.id, question);
        }
        state.contests.insert(contest.id, contest.clone());
        Ok(contest)
    }

    async fn get_contest(&self, contest_id: ContestId) -> Result<Option<Contest>> {
        Ok(self.read()?.contests.get(&contest_id).cloned())
    }

    async fn list_contests(&self, relationship_id: RelationshipId) -> Result<Vec<Contest>> {
        let mut contests: Vec<Contest> = self
            .read()?
            .contests
            .values()
            .filter(|contest| contest.relationship_id == relationship_id)
            .cloned()
            .collect();
        contests.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(contests)
    }

    async fn get_questions(&self, contest_id: ContestId) -> Result<Vec<ContestQuestion>> {
        let mut questions: Vec<ContestQuestion> = self
            .read()?
            .questions
            .values()
            .filter(|q| q.contest_id == contest_id)
            .cloned()
            .collect();
        questions.sort_by_key(|q| q.question_order);
        Ok(questions)
    }

    async fn get_question(&self, question_id: QuestionId) -> Result<Option<ContestQuestion>> {
        Ok(self.read()?.questions.get(&question_id).cloned())
    }

    async fn record_answer(
        &self,
        question_id: QuestionId,
        slot: MemberSlot,
        answer: AnswerRecord,
    ) -> Result<ContestQuestion> {
        let mut state = self.write()?;

        let contest_id = state
            .questions
            .get(&question_id)
            .map(|q| q.contest_id)
            .ok_or_else(|| BondError::not_found("question", question_id))?;
        let contest_status = state
            .contests
            .get(&contest_id)
            .map(|c| c.status)
            .ok_or_else(|| BondError::not_found("contest", contest_id))?;
        if contest_status == ContestStatus::Completed {
            return Err(BondError::conflict("contest already completed"));
        }

        let question = state
            .questions
            .get_mut(&question_id)
            .ok_or_else(|| BondError::not_found("question", question_id))?;
        match slot {
            MemberSlot::A => question.user_a_answer = Some(answer),
            MemberSlot::B => question.user_b_answer = Some(answer),
        }
        Ok(question.clone())
    }

    async fn commit_completion(
        &self,
        completion: ContestCompletion,
    ) -> Result<(Contest, Relationship)> {
        let mut state = self.write()?;

        let contest = state
            .contests
            .get(&completion.contest_id)
            .ok_or_else(|| BondError::not_found("contest", completion.contest_id))?;
        if contest.status == ContestStatus::Completed {
            return Err(BondError::conflict("contest already completed"));
        }
        let relationship_id = contest.relationship_id;
        if !state.relationships.contains_key(&relationship_id) {
            return Err(BondError::not_found("relationship", relationship_id));
        }

        let relationship = state
            .relationships
            .get_mut(&relationship_id)
            .ok_or_else(|| BondError::not_found("relationship", relationship_id))?;
        relationship.bond_points += u64::from(completion.bond_points_awarded);
        relationship.care_score = relationship
            .care_score
            .saturating_add(completion.care_gain)
            .min(completion.care_cap)
            .max(relationship.care_score);
        relationship.contests_completed += 1;
        if completion.won {
            relationship.contests_won += 1;
        }
        let relationship = relationship.clone();

        let contest = state
            .contests
            .get_mut(&completion.contest_id)
            .ok_or_else(|| BondError::not_found("contest", completion.contest_id))?;
        contest.status = ContestStatus::Completed;
        contest.completed_at = Some(completion.completed_at);
        contest.user_a_score = completion.user_a_score;
        contest.user_b_score = completion.user_b_score;
        contest.total_score = completion.total_score;
        contest.is_synchronized = completion.is_synchronized;
        contest.bond_points_awarded = completion.bond_points_awarded;

        Ok((contest.clone(), relationship))
    }
}
