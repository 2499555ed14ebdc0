//! Integration tests for the kinship-engine service
//!
//! These tests drive the public service API end to end:
//! - Matching two users into a relationship
//! - Harvesting facts from chat and turning them into contests
//! - Grading answers and folding results into the relationship
//! - Notification failures that must not affect the engine

mod fixtures;

use kinship_engine::contest::{ExtractedFact, FactExtractor, Grade};
use kinship_engine::error::BondError;
use kinship_engine::matching::WeightedMatchScorer;
use kinship_engine::metrics::MetricsCollector;
use kinship_engine::notify::MockNotificationSink;
use kinship_engine::service::{BondService, SearchOutcome};
use kinship_engine::storage::InMemoryStore;
use kinship_engine::types::*;
use std::sync::Arc;
use std::time::{Duration, Instant};

use fixtures::{
    bond_pair, build_service, create_test_system, grandparent_search, seed_user, test_config,
    FailingNotificationSink, SlowNotificationSink,
};

/// Answer every fact-backed question as the partner of the person it is about
async fn answer_all_correctly(
    service: &BondService,
    relationship: &Relationship,
    questions: &[ContestQuestion],
) {
    for question in questions {
        let Some(correct) = &question.correct_answer else {
            continue;
        };
        let answerer = relationship
            .partner_of(&question.question_about_user)
            .unwrap();
        let receipt = service
            .submit_answer(question.id, answerer, &correct.to_uppercase())
            .await
            .unwrap();
        assert_eq!(receipt.grade, Grade::Exact);
    }
}

#[tokio::test]
async fn test_complete_bonding_workflow() {
    let (store, sink, service) = create_test_system();
    seed_user(&store, "rosa", "Rosa", &["es", "en"]);
    seed_user(&store, "theo", "Theo", &["en"]);

    // Step 1: match
    let relationship = bond_pair(&service, "rosa", "theo").await;
    assert_eq!(relationship.user_a_id, "theo");
    assert_eq!(relationship.user_b_id, "rosa");
    assert_eq!(relationship.level, 1);
    assert_eq!(relationship.bond_points, 0);

    // Step 2: chat; theo mentions two facts, rosa one
    let theo_facts = service
        .record_message(
            "theo",
            relationship.id,
            "m1",
            "My favorite food is pho, and I have a dog named Max",
        )
        .await
        .unwrap();
    assert_eq!(theo_facts.len(), 2);
    let rosa_facts = service
        .record_message(
            "rosa",
            relationship.id,
            "m2",
            "Every morning I walk along the river.",
        )
        .await
        .unwrap();
    assert_eq!(rosa_facts.len(), 1);
    assert_eq!(rosa_facts[0].category, FactCategory::DailyRoutine);

    // Step 3: contest built from all three facts plus two open questions
    let generated = service
        .create_contest(relationship.id, ContestType::Weekly)
        .await
        .unwrap();
    assert_eq!(generated.questions.len(), 5);
    assert_eq!(generated.fact_question_count(), 3);
    assert_eq!(generated.contest.max_points, 50);
    assert_eq!(generated.contest.title, "Weekly Bond Challenge");
    let orders: Vec<u32> = generated.questions.iter().map(|q| q.question_order).collect();
    assert_eq!(orders, vec![0, 1, 2, 3, 4]);

    // Step 4: both answer what they know about the other
    answer_all_correctly(&service, &relationship, &generated.questions).await;
    let open_question = generated
        .questions
        .iter()
        .find(|q| q.correct_answer.is_none())
        .unwrap();
    let receipt = service
        .submit_answer(open_question.id, "theo", "Probably tea")
        .await
        .unwrap();
    assert_eq!(receipt.grade, Grade::Ungraded);
    assert_eq!(receipt.points_awarded, 0);

    // Step 5: rosa scored 20 on theo's facts, theo 10 on rosa's
    let summary = service.complete_contest(generated.contest.id).await.unwrap();
    assert_eq!(summary.user_a_score, 10);
    assert_eq!(summary.user_b_score, 20);
    assert_eq!(summary.total_score, 30);
    assert!(summary.is_synchronized);
    assert_eq!(summary.bond_points_awarded, 45);
    assert!(!summary.won);
    assert!(summary.passed);

    let stored = service
        .relationships_for("rosa")
        .await
        .unwrap()
        .into_iter()
        .next()
        .unwrap();
    assert_eq!(stored.bond_points, 45);
    assert_eq!(stored.care_score, 9);
    assert_eq!(stored.contests_completed, 1);
    assert_eq!(stored.contests_won, 0);

    let kinds: Vec<NotificationKind> = sink.get_notifications().iter().map(|n| n.kind).collect();
    assert_eq!(
        kinds.iter().filter(|k| **k == NotificationKind::NewMatch).count(),
        2
    );
    assert_eq!(
        kinds.iter().filter(|k| **k == NotificationKind::NewMessage).count(),
        2
    );
    assert_eq!(
        kinds
            .iter()
            .filter(|k| **k == NotificationKind::ContestCompleted)
            .count(),
        2
    );
}

#[tokio::test]
async fn test_facts_are_used_once() {
    let (store, _sink, service) = create_test_system();
    seed_user(&store, "rosa", "Rosa", &["en"]);
    seed_user(&store, "theo", "Theo", &["en"]);
    let relationship = bond_pair(&service, "rosa", "theo").await;

    service
        .record_message("rosa", relationship.id, "m1", "My favorite color is green")
        .await
        .unwrap();

    let first = service
        .create_contest(relationship.id, ContestType::Daily)
        .await
        .unwrap();
    assert_eq!(first.fact_question_count(), 1);

    let second = service
        .create_contest(relationship.id, ContestType::Daily)
        .await
        .unwrap();
    assert_eq!(second.fact_question_count(), 0);
    assert_eq!(second.questions.len(), 3);

    let facts = service.list_facts(relationship.id).await.unwrap();
    assert!(facts.iter().all(|f| f.used_in_contest));

    let contests = service.list_contests(relationship.id).await.unwrap();
    assert_eq!(contests.len(), 2);
}

#[tokio::test]
async fn test_completion_is_applied_once() {
    let (store, _sink, service) = create_test_system();
    seed_user(&store, "rosa", "Rosa", &["en"]);
    seed_user(&store, "theo", "Theo", &["en"]);
    let relationship = bond_pair(&service, "rosa", "theo").await;

    service
        .record_message("rosa", relationship.id, "m1", "My favorite movie is Coco")
        .await
        .unwrap();
    let generated = service
        .create_contest(relationship.id, ContestType::Daily)
        .await
        .unwrap();
    answer_all_correctly(&service, &relationship, &generated.questions).await;

    let summary = service.complete_contest(generated.contest.id).await.unwrap();
    assert_eq!(summary.relationship.bond_points, 10);

    let err = service
        .complete_contest(generated.contest.id)
        .await
        .unwrap_err();
    assert!(matches!(err, BondError::Conflict { .. }));

    // Answers after completion are rejected too
    let err = service
        .submit_answer(generated.questions[0].id, "rosa", "coco")
        .await
        .unwrap_err();
    assert!(matches!(err, BondError::Conflict { .. }));

    let (contest, questions) = service
        .get_contest("theo", generated.contest.id)
        .await
        .unwrap();
    assert_eq!(contest.status, ContestStatus::Completed);
    assert_eq!(questions.len(), 3);
    // Completed contests show the answer key
    assert!(questions.iter().any(|q| q.correct_answer.is_some()));

    let stored = service
        .relationships_for("theo")
        .await
        .unwrap()
        .into_iter()
        .next()
        .unwrap();
    assert_eq!(stored.bond_points, 10);
    assert_eq!(stored.contests_completed, 1);
}

#[tokio::test]
async fn test_outsider_cannot_answer() {
    let (store, _sink, service) = create_test_system();
    for (id, name) in [("rosa", "Rosa"), ("theo", "Theo"), ("mira", "Mira")] {
        seed_user(&store, id, name, &["en"]);
    }
    let relationship = bond_pair(&service, "rosa", "theo").await;
    let generated = service
        .create_contest(relationship.id, ContestType::Daily)
        .await
        .unwrap();

    let err = service
        .submit_answer(generated.questions[0].id, "mira", "anything")
        .await
        .unwrap_err();
    assert!(matches!(err, BondError::Validation { .. }));
}

#[tokio::test]
async fn test_failing_notifications_do_not_block_engine() {
    let store = Arc::new(InMemoryStore::new());
    let sink = Arc::new(FailingNotificationSink::new());
    let service = build_service(&test_config(), store.clone(), sink.clone());
    seed_user(&store, "rosa", "Rosa", &["en"]);
    seed_user(&store, "theo", "Theo", &["en"]);

    let relationship = bond_pair(&service, "rosa", "theo").await;
    let generated = service
        .create_contest(relationship.id, ContestType::Daily)
        .await
        .unwrap();
    let summary = service.complete_contest(generated.contest.id).await.unwrap();
    assert_eq!(summary.contest.status, ContestStatus::Completed);

    // 2 match + 2 started + 2 completed
    assert_eq!(sink.attempts(), 6);
    assert_eq!(service.get_stats().unwrap().notification_failures, 6);
}

#[tokio::test]
async fn test_slow_notifications_are_bounded() {
    let mut config = test_config();
    config.service.notification_timeout_ms = 20;
    let store = Arc::new(InMemoryStore::new());
    let service = build_service(
        &config,
        store.clone(),
        Arc::new(SlowNotificationSink::new(Duration::from_secs(5))),
    );
    seed_user(&store, "rosa", "Rosa", &["en"]);
    seed_user(&store, "theo", "Theo", &["en"]);

    let started = Instant::now();
    service.search("rosa", grandparent_search()).await.unwrap();
    let outcome = service.search("theo", grandparent_search()).await.unwrap();
    assert!(matches!(outcome, SearchOutcome::Matched { .. }));
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(service.get_stats().unwrap().notification_failures, 2);
    assert_eq!(store.relationship_count().unwrap(), 1);
}

#[tokio::test]
async fn test_storage_outage_is_retryable() {
    let (store, _sink, service) = create_test_system();
    seed_user(&store, "rosa", "Rosa", &["en"]);
    store.set_offline(true);

    let err = service
        .search("rosa", grandparent_search())
        .await
        .unwrap_err();
    assert!(matches!(err, BondError::RepositoryUnavailable { .. }));
    assert!(err.is_retryable());

    store.set_offline(false);
    assert!(service.search("rosa", grandparent_search()).await.is_ok());
}

#[tokio::test]
async fn test_research_supersedes_and_cancel_clears() {
    let (store, _sink, service) = create_test_system();
    seed_user(&store, "rosa", "Rosa", &["en"]);

    let first = service.search("rosa", grandparent_search()).await.unwrap();
    let second = service
        .search(
            "rosa",
            SearchCriteria::new(kinship_engine::Role::Friend, kinship_engine::Role::Friend),
        )
        .await
        .unwrap();

    let (SearchOutcome::Searching { ticket: first }, SearchOutcome::Searching { ticket: second }) =
        (first, second)
    else {
        panic!("nobody else is queued");
    };
    assert_eq!(second.cancelled_entries, vec![first.entry_id]);

    let status = service.queue_status("rosa").await.unwrap().unwrap();
    assert_eq!(status.entry.id, second.entry_id);
    assert_eq!(status.queue_position, 1);

    assert_eq!(service.cancel_search("rosa").await.unwrap(), 1);
    assert!(service.queue_status("rosa").await.unwrap().is_none());
}

/// Extractor that treats every message as a statement about a pet
struct PetOnlyExtractor;

impl FactExtractor for PetOnlyExtractor {
    fn extract(&self, text: &str) -> Vec<ExtractedFact> {
        vec![ExtractedFact {
            category: FactCategory::Pet,
            value: text.trim().to_lowercase(),
        }]
    }
}

#[tokio::test]
async fn test_custom_extractor_feeds_contests() {
    let config = test_config();
    let store = Arc::new(InMemoryStore::new());
    let service = BondService::with_components(
        &config,
        store.clone(),
        Arc::new(WeightedMatchScorer::new(config.matching.clone())),
        Arc::new(PetOnlyExtractor),
        Arc::new(MockNotificationSink::new()),
        Arc::new(MetricsCollector::new().unwrap()),
    );
    seed_user(&store, "rosa", "Rosa", &["en"]);
    seed_user(&store, "theo", "Theo", &["en"]);
    let relationship = bond_pair(&service, "rosa", "theo").await;

    let facts = service
        .record_message("theo", relationship.id, "m1", "A tortoise")
        .await
        .unwrap();
    assert_eq!(facts[0].value, "a tortoise");

    let generated = service
        .create_contest(relationship.id, ContestType::Daily)
        .await
        .unwrap();
    let question = &generated.questions[0];
    assert_eq!(question.question_about_user, "theo");
    assert_eq!(question.correct_answer.as_deref(), Some("a tortoise"));
    assert!(question.question_text.contains("Theo"));

    let receipt = service
        .submit_answer(question.id, "rosa", "tortoise")
        .await
        .unwrap();
    assert_eq!(receipt.grade, Grade::Partial);
    assert_eq!(receipt.points_awarded, 5);
}
