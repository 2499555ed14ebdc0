//! Bond service: the operations exposed to the API layer
//!
//! Wires the matching queue and the contest pipeline to storage, the
//! notification sink and the live chat rooms. Notifications are delivered
//! after the core write has committed; a failed or slow delivery is logged
//! and counted but never undoes or fails the operation that triggered it.

use crate::config::{AppConfig, ContestSettings};
use crate::contest::{
    AnswerReceipt, AnswerScorer, ContestAggregator, ContestGenerator, ContestSummary,
    FactExtractor, GeneratedContest, RuleTableExtractor,
};
use crate::error::{BondError, Result};
use crate::matching::{MatchQueue, MatchScorer, Role, RoleInfo, WeightedMatchScorer};
use crate::metrics::MetricsCollector;
use crate::notify::{NotificationSink, RoomMessage, RoomRegistry};
use crate::storage::{
    ContestRepository, FactRepository, ProfileRepository, QueueRepository,
    RelationshipRepository,
};
use crate::types::*;
use crate::utils::{current_timestamp, generate_id, RandomSource};
use serde::Serialize;
use serde_json::json;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Characters of a chat message carried in the partner's notification
const MESSAGE_PREVIEW_CHARS: usize = 100;

/// Outcome of a search request
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SearchOutcome {
    /// A partner was claimed; `score` is absent when the pairing was made
    /// by the partner's concurrent search
    Matched {
        relationship: Relationship,
        partner_id: UserId,
        score: Option<u32>,
    },
    /// No partner yet; the entry stays in the queue
    Searching { ticket: QueueTicket },
}

/// A live search entry and where it stands
#[derive(Debug, Clone, Serialize)]
pub struct QueueStatusReport {
    pub entry: MatchRequest,
    pub queue_position: usize,
}

/// Running totals since startup
#[derive(Debug, Clone, Default, Serialize)]
pub struct BondServiceStats {
    pub searches: u64,
    pub matches: u64,
    pub claim_conflicts: u64,
    pub searches_cancelled: u64,
    pub messages_recorded: u64,
    pub facts_extracted: u64,
    pub contests_created: u64,
    pub contests_completed: u64,
    pub answers_recorded: u64,
    pub bond_points_awarded: u64,
    pub notification_failures: u64,
}

/// Storage the service needs, as one handle
pub trait BondStore:
    ProfileRepository
    + QueueRepository
    + RelationshipRepository
    + FactRepository
    + ContestRepository
    + 'static
{
}

impl<T> BondStore for T where
    T: ProfileRepository
        + QueueRepository
        + RelationshipRepository
        + FactRepository
        + ContestRepository
        + 'static
{
}

pub struct BondService {
    relationships: Arc<dyn RelationshipRepository>,
    facts: Arc<dyn FactRepository>,
    contests: Arc<dyn ContestRepository>,
    queue: MatchQueue,
    extractor: Arc<dyn FactExtractor>,
    generator: ContestGenerator,
    answers: AnswerScorer,
    aggregator: ContestAggregator,
    notifier: Arc<dyn NotificationSink>,
    rooms: Arc<RoomRegistry>,
    metrics: Arc<MetricsCollector>,
    settings: ContestSettings,
    notification_timeout: Duration,
    stats: RwLock<BondServiceStats>,
}

impl BondService {
    /// Build the service over `store` using the built-in scorer and rule table
    pub fn new<S: BondStore>(
        config: &AppConfig,
        store: Arc<S>,
        notifier: Arc<dyn NotificationSink>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        let scorer: Arc<dyn MatchScorer> =
            Arc::new(WeightedMatchScorer::new(config.matching.clone()));
        Self::with_components(
            config,
            store,
            scorer,
            Arc::new(RuleTableExtractor::builtin()),
            notifier,
            metrics,
        )
    }

    /// Build the service with a caller-supplied scorer and extractor
    pub fn with_components<S: BondStore>(
        config: &AppConfig,
        store: Arc<S>,
        scorer: Arc<dyn MatchScorer>,
        extractor: Arc<dyn FactExtractor>,
        notifier: Arc<dyn NotificationSink>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        let rng = Arc::new(match config.service.rng_seed {
            Some(seed) => RandomSource::seeded(seed),
            None => RandomSource::from_entropy(),
        });

        let queue = MatchQueue::new(
            store.clone(),
            store.clone(),
            store.clone(),
            scorer,
            rng.clone(),
            config.matching.clone(),
        )
        .with_metrics(metrics.clone());
        let generator = ContestGenerator::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            rng,
            config.contest.clone(),
        );
        let answers = AnswerScorer::new(store.clone(), store.clone());
        let aggregator = ContestAggregator::new(store.clone(), config.contest.clone());

        Self {
            relationships: store.clone(),
            facts: store.clone(),
            contests: store,
            queue,
            extractor,
            generator,
            answers,
            aggregator,
            notifier,
            rooms: Arc::new(RoomRegistry::new(config.service.room_channel_capacity)),
            metrics,
            settings: config.contest.clone(),
            notification_timeout: config.notification_timeout(),
            stats: RwLock::new(BondServiceStats::default()),
        }
    }

    /// Live chat rooms, shared with whatever serves the websocket side
    pub fn rooms(&self) -> Arc<RoomRegistry> {
        self.rooms.clone()
    }

    pub fn metrics(&self) -> Arc<MetricsCollector> {
        self.metrics.clone()
    }

    /// Roles a user may seek or offer
    pub fn role_catalog(&self) -> Vec<RoleInfo> {
        Role::catalog()
    }

    /// Queue `user_id` and try to pair them right away
    pub async fn search(&self, user_id: &str, criteria: SearchCriteria) -> Result<SearchOutcome> {
        let timer = self.metrics.start_timer();
        let seeking = criteria.seeking_role.clone();
        let offering = criteria.offering_role.clone();

        let ticket = self
            .queue
            .submit(user_id, criteria)
            .await
            .inspect_err(|e| log_failure("search", e))?;
        if !ticket.cancelled_entries.is_empty() {
            self.metrics
                .record_queue_cancellations(ticket.cancelled_entries.len());
        }

        let claimed = self
            .queue
            .find_and_claim(user_id, &seeking, &offering)
            .await
            .inspect_err(|e| log_failure("search", e))?;

        let outcome = match claimed {
            Some(claimed) => {
                let score = claimed.score.total();
                self.metrics.record_match(score);
                self.notify_match(&claimed.relationship).await;
                SearchOutcome::Matched {
                    relationship: claimed.relationship,
                    partner_id: claimed.partner_id,
                    score: Some(score),
                }
            }
            None => self.resolve_unclaimed(user_id, ticket).await?,
        };

        let matched = matches!(outcome, SearchOutcome::Matched { .. });
        // Pairings claimed by the partner's search are counted there
        let claimed_here = matches!(outcome, SearchOutcome::Matched { score: Some(_), .. });
        let duration = timer.stop();
        self.metrics.record_search(matched, duration);
        self.metrics.record_operation("search", duration);
        self.update_stats(|stats| {
            stats.searches += 1;
            if claimed_here {
                stats.matches += 1;
            }
            stats.claim_conflicts = self.queue.claim_conflicts();
        });

        Ok(outcome)
    }

    /// A search that claimed nobody may still have been claimed itself by
    /// a concurrent search between submit and find.
    async fn resolve_unclaimed(&self, user_id: &str, ticket: QueueTicket) -> Result<SearchOutcome> {
        let entry = self.queue.get_entry(ticket.entry_id).await?;
        let partner_id = match entry {
            Some(MatchRequest {
                status: QueueStatus::Matched,
                matched_with: Some(partner_id),
                ..
            }) => partner_id,
            _ => return Ok(SearchOutcome::Searching { ticket }),
        };

        let relationship = self
            .relationships
            .list_relationships_for(user_id)
            .await?
            .into_iter()
            .filter(|r| r.is_active() && r.pairs(user_id, &partner_id))
            .max_by_key(|r| r.matched_at);

        match relationship {
            Some(relationship) => {
                debug!(
                    "Search of {} was claimed concurrently by {}",
                    user_id, partner_id
                );
                Ok(SearchOutcome::Matched {
                    relationship,
                    partner_id,
                    score: None,
                })
            }
            None => Ok(SearchOutcome::Searching { ticket }),
        }
    }

    /// Leave the queue; returns how many entries were cancelled
    pub async fn cancel_search(&self, user_id: &str) -> Result<usize> {
        let cancelled = self.queue.cancel(user_id).await?;
        if !cancelled.is_empty() {
            self.metrics.record_queue_cancellations(cancelled.len());
            self.update_stats(|stats| stats.searches_cancelled += cancelled.len() as u64);
        }
        Ok(cancelled.len())
    }

    pub async fn queue_status(&self, user_id: &str) -> Result<Option<QueueStatusReport>> {
        let entry = match self.queue.status(user_id).await? {
            Some(entry) => entry,
            None => return Ok(None),
        };
        let queue_position = self.queue.queue_position(&entry).await?;
        Ok(Some(QueueStatusReport {
            entry,
            queue_position,
        }))
    }

    pub async fn relationships_for(&self, user_id: &str) -> Result<Vec<Relationship>> {
        self.relationships.list_relationships_for(user_id).await
    }

    /// Timeline of a relationship, newest first
    pub async fn milestones(&self, relationship_id: RelationshipId) -> Result<Vec<Milestone>> {
        self.relationships.list_milestones(relationship_id).await
    }

    /// Harvest facts from a chat message and relay it to the partner.
    ///
    /// Returns the facts that were stored.
    pub async fn record_message(
        &self,
        sender_id: &str,
        relationship_id: RelationshipId,
        message_id: &str,
        text: &str,
    ) -> Result<Vec<Fact>> {
        let timer = self.metrics.start_timer();
        let relationship = self
            .relationships
            .get_relationship(relationship_id)
            .await?
            .ok_or_else(|| BondError::not_found("relationship", relationship_id))?;
        if !relationship.is_active() {
            return Err(BondError::validation("relationship is not active"));
        }
        let partner_id = relationship
            .partner_of(sender_id)
            .cloned()
            .ok_or_else(|| {
                BondError::validation(format!("user {} is not part of this relationship", sender_id))
            })?;

        let now = current_timestamp();
        let facts: Vec<Fact> = self
            .extractor
            .extract(text)
            .into_iter()
            .map(|extracted| Fact {
                id: generate_id(),
                user_id: sender_id.to_string(),
                relationship_id,
                source_message_id: message_id.to_string(),
                category: extracted.category,
                value: extracted.value,
                confidence: self.settings.fact_confidence,
                used_in_contest: false,
                created_at: now,
            })
            .collect();

        if !facts.is_empty() {
            self.facts
                .insert_facts(facts.clone())
                .await
                .inspect_err(|e| log_failure("record_message", e))?;
            for fact in &facts {
                self.metrics.record_fact_extracted(fact.category);
            }
            info!(
                "Extracted {} facts from message {} in relationship {}",
                facts.len(),
                message_id,
                relationship_id
            );
        }

        self.rooms.broadcast(RoomMessage {
            relationship_id,
            sender_id: sender_id.to_string(),
            message_id: message_id.to_string(),
            text: text.to_string(),
            sent_at: now,
        });

        let preview: String = text.chars().take(MESSAGE_PREVIEW_CHARS).collect();
        self.deliver(Notification::new(
            partner_id,
            NotificationKind::NewMessage,
            "New message",
            preview,
            json!({
                "relationship_id": relationship_id,
                "message_id": message_id,
                "sender_id": sender_id,
            }),
        ))
        .await;

        self.metrics
            .record_operation("record_message", timer.stop());
        self.update_stats(|stats| {
            stats.messages_recorded += 1;
            stats.facts_extracted += facts.len() as u64;
        });

        Ok(facts)
    }

    pub async fn list_facts(&self, relationship_id: RelationshipId) -> Result<Vec<Fact>> {
        self.facts.list_facts(relationship_id).await
    }

    /// Generate a contest and tell both members it has started
    pub async fn create_contest(
        &self,
        relationship_id: RelationshipId,
        contest_type: ContestType,
    ) -> Result<GeneratedContest> {
        let timer = self.metrics.start_timer();
        let generated = self
            .generator
            .generate(relationship_id, contest_type)
            .await
            .inspect_err(|e| log_failure("create_contest", e))?;
        self.metrics
            .record_contest_created(contest_type, timer.stop());

        let contest = &generated.contest;
        let members = match self.relationships.get_relationship(relationship_id).await {
            Ok(Some(relationship)) => relationship
                .member_ids()
                .map(|member| member.clone())
                .to_vec(),
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(
                    "Contest {} created but members could not be loaded for notification: {}",
                    contest.id, e
                );
                Vec::new()
            }
        };
        for member in members {
            self.deliver(Notification::new(
                member,
                NotificationKind::ContestStarted,
                format!("{} is live!", contest.title),
                format!(
                    "Answer {} questions within {} minutes",
                    generated.questions.len(),
                    contest.time_limit_minutes
                ),
                json!({
                    "relationship_id": relationship_id,
                    "contest_id": contest.id,
                }),
            ))
            .await;
        }

        self.update_stats(|stats| stats.contests_created += 1);
        Ok(generated)
    }

    /// A contest and its questions in order, as `viewer_id` may see them.
    ///
    /// Correct answers and the partner's answers are withheld until the
    /// contest is completed.
    pub async fn get_contest(
        &self,
        viewer_id: &str,
        contest_id: ContestId,
    ) -> Result<(Contest, Vec<QuestionView>)> {
        let contest = self
            .contests
            .get_contest(contest_id)
            .await?
            .ok_or_else(|| BondError::not_found("contest", contest_id))?;
        let relationship = self
            .relationships
            .get_relationship(contest.relationship_id)
            .await?
            .ok_or_else(|| BondError::not_found("relationship", contest.relationship_id))?;
        let viewer = relationship.slot_of(viewer_id).ok_or_else(|| {
            BondError::validation(format!("user {} is not part of this contest", viewer_id))
        })?;

        let revealed = contest.status == ContestStatus::Completed;
        let questions = self
            .contests
            .get_questions(contest_id)
            .await?
            .iter()
            .map(|question| question.view_for(viewer, revealed))
            .collect();
        Ok((contest, questions))
    }

    /// Contests of a relationship, newest first
    pub async fn list_contests(&self, relationship_id: RelationshipId) -> Result<Vec<Contest>> {
        self.contests.list_contests(relationship_id).await
    }

    pub async fn submit_answer(
        &self,
        question_id: QuestionId,
        user_id: &str,
        answer: &str,
    ) -> Result<AnswerReceipt> {
        let timer = self.metrics.start_timer();
        let receipt = self
            .answers
            .submit(question_id, user_id, answer)
            .await
            .inspect_err(|e| log_failure("submit_answer", e))?;
        self.metrics.record_answer(receipt.grade);
        self.metrics
            .record_operation("submit_answer", timer.stop());
        self.update_stats(|stats| stats.answers_recorded += 1);
        Ok(receipt)
    }

    /// Close a contest, fold its result into the relationship and tell both
    /// members how it went
    pub async fn complete_contest(&self, contest_id: ContestId) -> Result<ContestSummary> {
        let timer = self.metrics.start_timer();
        let summary = self
            .aggregator
            .complete(contest_id)
            .await
            .inspect_err(|e| log_failure("complete_contest", e))?;
        self.metrics
            .record_contest_completed(summary.is_synchronized, summary.bond_points_awarded);
        self.metrics
            .record_operation("complete_contest", timer.stop());

        let body = if summary.is_synchronized {
            format!(
                "You were in sync! {} bond points earned",
                summary.bond_points_awarded
            )
        } else {
            format!("{} bond points earned", summary.bond_points_awarded)
        };
        for member in summary.relationship.member_ids() {
            self.deliver(Notification::new(
                member.clone(),
                NotificationKind::ContestCompleted,
                format!("{} complete", summary.contest.title),
                body.clone(),
                json!({
                    "relationship_id": summary.relationship.id,
                    "contest_id": contest_id,
                    "total_score": summary.total_score,
                    "is_synchronized": summary.is_synchronized,
                    "bond_points_awarded": summary.bond_points_awarded,
                }),
            ))
            .await;
        }

        self.update_stats(|stats| {
            stats.contests_completed += 1;
            stats.bond_points_awarded += u64::from(summary.bond_points_awarded);
        });
        Ok(summary)
    }

    async fn notify_match(&self, relationship: &Relationship) {
        for member in relationship.member_ids() {
            let partner_id = relationship.partner_of(member).cloned().unwrap_or_default();
            self.deliver(Notification::new(
                member.clone(),
                NotificationKind::NewMatch,
                "You have a new match!",
                "Say hello to your new partner",
                json!({
                    "relationship_id": relationship.id,
                    "partner_id": partner_id,
                }),
            ))
            .await;
        }
    }

    /// Best-effort delivery bounded by the configured timeout
    async fn deliver(&self, notification: Notification) {
        let kind = notification.kind;
        let user_id = notification.user_id.clone();
        let timer = self.metrics.start_timer();

        let delivered = match tokio::time::timeout(
            self.notification_timeout,
            self.notifier.notify(notification),
        )
        .await
        {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!("Failed to notify {} ({:?}): {}", user_id, kind, e);
                false
            }
            Err(_) => {
                warn!(
                    "Notification to {} ({:?}) timed out after {:?}",
                    user_id, kind, self.notification_timeout
                );
                false
            }
        };

        self.metrics
            .record_notification(kind, delivered, timer.stop());
        if !delivered {
            self.update_stats(|stats| stats.notification_failures += 1);
        }
    }

    /// Called after the counted write has committed; a lock failure leaves
    /// the totals stale and is only logged
    fn update_stats(&self, apply: impl FnOnce(&mut BondServiceStats)) {
        match self.stats.write() {
            Ok(mut stats) => apply(&mut stats),
            Err(_) => warn!("Failed to acquire stats lock; service totals not updated"),
        }
    }

    pub fn get_stats(&self) -> Result<BondServiceStats> {
        let stats = self
            .stats
            .read()
            .map_err(|_| BondError::unavailable("Failed to acquire stats lock"))?;
        let mut snapshot = stats.clone();
        snapshot.claim_conflicts = self.queue.claim_conflicts();
        Ok(snapshot)
    }
}

fn log_failure(operation: &str, error: &BondError) {
    if error.is_retryable() {
        error!("{} failed: {}", operation, error);
    } else {
        debug!("{} rejected: {}", operation, error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::MockNotificationSink;
    use crate::storage::InMemoryStore;
    use async_trait::async_trait;

    struct Harness {
        store: Arc<InMemoryStore>,
        sink: Arc<MockNotificationSink>,
        service: BondService,
    }

    fn harness() -> Harness {
        let mut config = AppConfig::default();
        config.service.rng_seed = Some(7);
        let store = Arc::new(InMemoryStore::new());
        let sink = Arc::new(MockNotificationSink::new());
        let service = BondService::new(
            &config,
            store.clone(),
            sink.clone(),
            Arc::new(MetricsCollector::new().unwrap()),
        );
        Harness {
            store,
            sink,
            service,
        }
    }

    fn seed(store: &InMemoryStore, user: &str, name: &str) {
        store
            .upsert_profile(Profile::new(user, name), vec!["en".to_string()])
            .unwrap();
    }

    async fn bonded(h: &Harness) -> Relationship {
        seed(&h.store, "ana", "Ana");
        seed(&h.store, "ben", "Ben");
        h.service
            .search("ben", SearchCriteria::new(Role::Friend, Role::Friend))
            .await
            .unwrap();
        match h
            .service
            .search("ana", SearchCriteria::new(Role::Friend, Role::Friend))
            .await
            .unwrap()
        {
            SearchOutcome::Matched { relationship, .. } => relationship,
            other => panic!("expected a match, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_search_waits_then_matches() {
        let h = harness();
        seed(&h.store, "ana", "Ana");
        seed(&h.store, "ben", "Ben");

        let first = h
            .service
            .search("ben", SearchCriteria::new(Role::Mentor, Role::Student))
            .await
            .unwrap();
        assert!(matches!(first, SearchOutcome::Searching { .. }));
        assert!(h.service.queue_status("ben").await.unwrap().is_some());

        let second = h
            .service
            .search("ana", SearchCriteria::new(Role::Mentor, Role::Student))
            .await
            .unwrap();
        match second {
            SearchOutcome::Matched {
                partner_id, score, ..
            } => {
                assert_eq!(partner_id, "ben");
                assert!(score.is_some());
            }
            other => panic!("expected a match, got {:?}", other),
        }

        assert!(h.service.queue_status("ben").await.unwrap().is_none());
        let kinds: Vec<_> = h.sink.get_notifications().iter().map(|n| n.kind).collect();
        assert_eq!(kinds, vec![NotificationKind::NewMatch; 2]);

        let stats = h.service.get_stats().unwrap();
        assert_eq!(stats.searches, 2);
        assert_eq!(stats.matches, 1);
    }

    #[tokio::test]
    async fn test_cancel_search_reports_count() {
        let h = harness();
        seed(&h.store, "ana", "Ana");
        h.service
            .search("ana", SearchCriteria::new(Role::Friend, Role::Friend))
            .await
            .unwrap();

        assert_eq!(h.service.cancel_search("ana").await.unwrap(), 1);
        assert_eq!(h.service.cancel_search("ana").await.unwrap(), 0);
        assert_eq!(h.service.get_stats().unwrap().searches_cancelled, 1);
    }

    #[tokio::test]
    async fn test_record_message_stores_facts_and_notifies_partner() {
        let h = harness();
        let relationship = bonded(&h).await;
        h.sink.clear();
        let mut room = h.service.rooms().subscribe(relationship.id);

        let facts = h
            .service
            .record_message(
                "ana",
                relationship.id,
                "m1",
                "My favorite food is dumplings. My hobby is hiking",
            )
            .await
            .unwrap();
        assert_eq!(facts.len(), 2);
        assert!(facts.iter().all(|f| (f.confidence - 0.85).abs() < f32::EPSILON));
        assert_eq!(
            h.service.list_facts(relationship.id).await.unwrap().len(),
            2
        );

        let sent = h.sink.get_notifications();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].user_id, "ben");
        assert_eq!(sent[0].kind, NotificationKind::NewMessage);

        assert_eq!(room.recv().await.unwrap().message_id, "m1");
    }

    #[tokio::test]
    async fn test_record_message_rejects_outsider_and_inactive() {
        let h = harness();
        let relationship = bonded(&h).await;

        let err = h
            .service
            .record_message("cleo", relationship.id, "m1", "hi")
            .await
            .unwrap_err();
        assert!(matches!(err, BondError::Validation { .. }));

        h.store
            .set_relationship_status(relationship.id, RelationshipStatus::Paused)
            .unwrap();
        let err = h
            .service
            .record_message("ana", relationship.id, "m2", "hi")
            .await
            .unwrap_err();
        assert!(matches!(err, BondError::Validation { .. }));

        let err = h
            .service
            .record_message("ana", generate_id(), "m3", "hi")
            .await
            .unwrap_err();
        assert!(matches!(err, BondError::NotFound { .. }));
    }

    struct BrokenSink;

    #[async_trait]
    impl NotificationSink for BrokenSink {
        async fn notify(&self, _notification: Notification) -> anyhow::Result<()> {
            Err(anyhow::anyhow!("push gateway down"))
        }
    }

    #[tokio::test]
    async fn test_notification_failure_does_not_fail_operation() {
        let mut config = AppConfig::default();
        config.service.rng_seed = Some(3);
        let store = Arc::new(InMemoryStore::new());
        let service = BondService::new(
            &config,
            store.clone(),
            Arc::new(BrokenSink),
            Arc::new(MetricsCollector::new().unwrap()),
        );
        seed(&store, "ana", "Ana");
        seed(&store, "ben", "Ben");

        service
            .search("ben", SearchCriteria::new(Role::Friend, Role::Friend))
            .await
            .unwrap();
        let outcome = service
            .search("ana", SearchCriteria::new(Role::Friend, Role::Friend))
            .await
            .unwrap();
        assert!(matches!(outcome, SearchOutcome::Matched { .. }));
        assert_eq!(service.get_stats().unwrap().notification_failures, 2);
        assert_eq!(store.relationship_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_contest_round_trip_through_service() {
        let h = harness();
        let relationship = bonded(&h).await;
        h.service
            .record_message("ana", relationship.id, "m1", "My favorite color is teal")
            .await
            .unwrap();
        h.sink.clear();

        let generated = h
            .service
            .create_contest(relationship.id, ContestType::Daily)
            .await
            .unwrap();
        assert_eq!(generated.questions.len(), 3);
        assert_eq!(generated.fact_question_count(), 1);

        let fact_question = generated
            .questions
            .iter()
            .find(|q| q.correct_answer.is_some())
            .unwrap();
        let receipt = h
            .service
            .submit_answer(fact_question.id, "ben", "Teal")
            .await
            .unwrap();
        assert!(receipt.is_correct);

        let summary = h
            .service
            .complete_contest(generated.contest.id)
            .await
            .unwrap();
        assert_eq!(summary.total_score, 10);
        assert!(!summary.is_synchronized);
        assert_eq!(summary.relationship.bond_points, 10);

        let again = h.service.complete_contest(generated.contest.id).await;
        assert!(matches!(again, Err(BondError::Conflict { .. })));

        let kinds: Vec<_> = h.sink.get_notifications().iter().map(|n| n.kind).collect();
        assert_eq!(
            kinds,
            vec![
                NotificationKind::ContestStarted,
                NotificationKind::ContestStarted,
                NotificationKind::ContestCompleted,
                NotificationKind::ContestCompleted,
            ]
        );

        let stats = h.service.get_stats().unwrap();
        assert_eq!(stats.contests_created, 1);
        assert_eq!(stats.contests_completed, 1);
        assert_eq!(stats.bond_points_awarded, 10);
    }

    #[tokio::test]
    async fn test_get_contest_withholds_answers_until_completed() {
        let h = harness();
        let relationship = bonded(&h).await;
        h.service
            .record_message("ana", relationship.id, "m1", "My favorite food is pizza")
            .await
            .unwrap();
        let generated = h
            .service
            .create_contest(relationship.id, ContestType::Daily)
            .await
            .unwrap();
        let contest_id = generated.contest.id;
        let fact_question = generated
            .questions
            .iter()
            .find(|q| q.correct_answer.is_some())
            .unwrap();
        h.service
            .submit_answer(fact_question.id, "ben", "pizza")
            .await
            .unwrap();

        let (contest, questions) = h.service.get_contest("ana", contest_id).await.unwrap();
        assert_eq!(contest.status, ContestStatus::Active);
        assert_eq!(questions.len(), 3);
        assert!(questions
            .iter()
            .all(|q| q.correct_answer.is_none() && q.partner_answer.is_none()));
        let json = serde_json::to_string(&questions).unwrap();
        assert!(!json.contains("pizza"));

        // Members still see their own answers
        let (_, ben_view) = h.service.get_contest("ben", contest_id).await.unwrap();
        let own = ben_view.iter().find(|q| q.id == fact_question.id).unwrap();
        assert_eq!(own.your_answer.as_ref().unwrap().answer, "pizza");
        assert!(own.correct_answer.is_none());

        let err = h
            .service
            .get_contest("cleo", contest_id)
            .await
            .unwrap_err();
        assert!(matches!(err, BondError::Validation { .. }));

        h.service.complete_contest(contest_id).await.unwrap();
        let (_, revealed) = h.service.get_contest("ana", contest_id).await.unwrap();
        let question = revealed.iter().find(|q| q.id == fact_question.id).unwrap();
        assert_eq!(question.correct_answer.as_deref(), Some("pizza"));
        assert_eq!(question.partner_answer.as_ref().unwrap().answer, "pizza");
    }

    #[tokio::test]
    async fn test_search_keeps_language_priority() {
        let h = harness();
        seed(&h.store, "ana", "Ana");

        let catalog = h.service.role_catalog();
        let friend = catalog.iter().find(|info| info.role == Role::Friend).unwrap();
        assert_eq!(friend.pairs_with, "friend");

        let criteria = SearchCriteria::new(friend.role.clone(), friend.role.clone())
            .with_language_priority(LanguagePriority::Learning);
        h.service.search("ana", criteria).await.unwrap();

        let report = h.service.queue_status("ana").await.unwrap().unwrap();
        assert_eq!(report.entry.language_priority, LanguagePriority::Learning);
        assert_eq!(report.queue_position, 1);
    }

    #[tokio::test]
    async fn test_new_relationship_opens_with_milestone() {
        let h = harness();
        let relationship = bonded(&h).await;

        let milestones = h.service.milestones(relationship.id).await.unwrap();
        assert_eq!(milestones.len(), 1);
        assert_eq!(milestones[0].kind, MilestoneKind::Matched);
        assert_eq!(milestones[0].title, "First Match!");
        assert_eq!(milestones[0].bond_points_awarded, 5);
        assert_eq!(relationship.bond_points, 0);
    }

    #[tokio::test]
    async fn test_committed_writes_survive_stats_lock_failure() {
        let h = harness();
        let relationship = bonded(&h).await;
        let generated = h
            .service
            .create_contest(relationship.id, ContestType::Daily)
            .await
            .unwrap();

        // Poison the stats lock
        std::thread::scope(|scope| {
            let joined = scope
                .spawn(|| {
                    let _guard = h.service.stats.write().unwrap();
                    panic!("stats writer died");
                })
                .join();
            assert!(joined.is_err());
        });
        assert!(h.service.get_stats().is_err());

        let summary = h
            .service
            .complete_contest(generated.contest.id)
            .await
            .unwrap();
        assert_eq!(summary.contest.status, ContestStatus::Completed);
        assert!(h.service.cancel_search("ana").await.is_ok());
        seed(&h.store, "cleo", "Cleo");
        assert!(h
            .service
            .search("cleo", SearchCriteria::new(Role::Friend, Role::Friend))
            .await
            .is_ok_and(|outcome| matches!(outcome, SearchOutcome::Searching { .. })));
    }
}
