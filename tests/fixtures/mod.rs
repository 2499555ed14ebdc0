//! Test fixtures and notification sinks for integration testing

#![allow(dead_code)]

use anyhow::anyhow;
use async_trait::async_trait;
use kinship_engine::config::AppConfig;
use kinship_engine::matching::Role;
use kinship_engine::metrics::MetricsCollector;
use kinship_engine::notify::{MockNotificationSink, NotificationSink};
use kinship_engine::service::{BondService, SearchOutcome};
use kinship_engine::storage::InMemoryStore;
use kinship_engine::types::{Notification, Profile, Relationship, SearchCriteria};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Sink that always fails, counting attempts
#[derive(Debug, Default)]
pub struct FailingNotificationSink {
    attempts: AtomicUsize,
}

impl FailingNotificationSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NotificationSink for FailingNotificationSink {
    async fn notify(&self, _notification: Notification) -> anyhow::Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(anyhow!("delivery service unavailable"))
    }
}

/// Sink that takes longer than any sensible delivery timeout
#[derive(Debug)]
pub struct SlowNotificationSink {
    delay: Duration,
}

impl SlowNotificationSink {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl NotificationSink for SlowNotificationSink {
    async fn notify(&self, _notification: Notification) -> anyhow::Result<()> {
        tokio::time::sleep(self.delay).await;
        Ok(())
    }
}

/// Deterministic configuration for tests
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.service.rng_seed = Some(42);
    config
}

pub fn seed_user(store: &InMemoryStore, user_id: &str, name: &str, languages: &[&str]) {
    store
        .upsert_profile(
            Profile::new(user_id, name),
            languages.iter().map(|l| l.to_string()).collect(),
        )
        .unwrap();
}

pub fn build_service(
    config: &AppConfig,
    store: Arc<InMemoryStore>,
    sink: Arc<dyn NotificationSink>,
) -> BondService {
    BondService::new(
        config,
        store,
        sink,
        Arc::new(MetricsCollector::new().unwrap()),
    )
}

/// Store, recording sink and service wired together
pub fn create_test_system() -> (Arc<InMemoryStore>, Arc<MockNotificationSink>, BondService) {
    let store = Arc::new(InMemoryStore::new());
    let sink = Arc::new(MockNotificationSink::new());
    let service = build_service(&test_config(), store.clone(), sink.clone());
    (store, sink, service)
}

/// Criteria two users must both submit to be candidates for each other
pub fn grandparent_search() -> SearchCriteria {
    SearchCriteria::new(Role::Grandparent, Role::Grandchild)
}

/// Match `first` (who searches first and waits) with `second`
pub async fn bond_pair(service: &BondService, first: &str, second: &str) -> Relationship {
    let waiting = service
        .search(first, grandparent_search())
        .await
        .unwrap();
    assert!(matches!(waiting, SearchOutcome::Searching { .. }));

    match service
        .search(second, grandparent_search())
        .await
        .unwrap()
    {
        SearchOutcome::Matched { relationship, .. } => relationship,
        other => panic!("expected {} and {} to match, got {:?}", first, second, other),
    }
}
