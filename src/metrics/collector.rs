//! Metrics collection using Prometheus
//!
//! All metric names carry the `kinship_` prefix.

use crate::contest::Grade;
use crate::types::{ContestType, FactCategory, NotificationKind};
use anyhow::Result;
use prometheus::{
    Encoder, Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge,
    IntGaugeVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Main metrics collector for the bonding engine
#[derive(Clone)]
pub struct MetricsCollector {
    /// Prometheus registry
    registry: Arc<Registry>,

    service_metrics: ServiceMetrics,
    matching_metrics: MatchingMetrics,
    contest_metrics: ContestMetrics,
    performance_metrics: PerformanceMetrics,
}

/// Service-level metrics
#[derive(Clone)]
pub struct ServiceMetrics {
    /// Service uptime in seconds
    pub uptime_seconds: IntGauge,

    /// Health check status (0=unhealthy, 1=degraded, 2=healthy)
    pub health_status: IntGauge,

    /// Component health status
    pub component_health: IntGaugeVec,

    /// Notifications that failed or timed out, by kind
    pub notification_failures_total: IntCounterVec,
}

/// Matching queue metrics
#[derive(Clone)]
pub struct MatchingMetrics {
    /// Search requests by outcome (matched, searching)
    pub searches_total: IntCounterVec,

    /// Relationships created from claimed pairs
    pub matches_total: IntCounter,

    /// Claims lost to a concurrent search
    pub claim_conflicts_total: IntCounter,

    /// Queue entries cancelled by the user or superseded
    pub queue_cancellations_total: IntCounter,

    /// Score of the winning candidate
    pub match_score: Histogram,
}

/// Contest pipeline metrics
#[derive(Clone)]
pub struct ContestMetrics {
    /// Facts extracted from chat, by category
    pub facts_extracted_total: IntCounterVec,

    /// Contests created, by type
    pub contests_created_total: IntCounterVec,

    /// Contests completed, by synchrony
    pub contests_completed_total: IntCounterVec,

    /// Bond points awarded per completed contest
    pub bond_points_awarded: Histogram,

    /// Answers graded, by grade
    pub answers_total: IntCounterVec,
}

/// Performance metrics
#[derive(Clone)]
pub struct PerformanceMetrics {
    /// Engine operation durations
    pub operation_duration: HistogramVec,

    /// Notification delivery durations
    pub notification_duration: Histogram,
}

impl MetricsCollector {
    /// Create a new metrics collector with default registry
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());
        Self::with_registry(registry)
    }

    /// Create a new metrics collector with custom registry
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self> {
        let service_metrics = ServiceMetrics::new(&registry)?;
        let matching_metrics = MatchingMetrics::new(&registry)?;
        let contest_metrics = ContestMetrics::new(&registry)?;
        let performance_metrics = PerformanceMetrics::new(&registry)?;

        Ok(Self {
            registry,
            service_metrics,
            matching_metrics,
            contest_metrics,
            performance_metrics,
        })
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    /// Everything registered, in the Prometheus text format, with its
    /// content type
    pub fn encode_text(&self) -> Result<(String, String)> {
        let encoder = TextEncoder::new();
        let body = encoder.encode_to_string(&self.registry.gather())?;
        Ok((encoder.format_type().to_string(), body))
    }

    pub fn service(&self) -> &ServiceMetrics {
        &self.service_metrics
    }

    pub fn matching(&self) -> &MatchingMetrics {
        &self.matching_metrics
    }

    pub fn contest(&self) -> &ContestMetrics {
        &self.contest_metrics
    }

    pub fn performance(&self) -> &PerformanceMetrics {
        &self.performance_metrics
    }

    /// Record a search request and how it ended
    pub fn record_search(&self, matched: bool, duration: Duration) {
        let outcome = if matched { "matched" } else { "searching" };
        self.matching_metrics
            .searches_total
            .with_label_values(&[outcome])
            .inc();
        self.record_operation("search", duration);
    }

    /// Record a successful claim
    pub fn record_match(&self, score: u32) {
        self.matching_metrics.matches_total.inc();
        self.matching_metrics.match_score.observe(f64::from(score));
    }

    pub fn record_claim_conflict(&self) {
        self.matching_metrics.claim_conflicts_total.inc();
    }

    pub fn record_queue_cancellations(&self, count: usize) {
        self.matching_metrics
            .queue_cancellations_total
            .inc_by(count as u64);
    }

    pub fn record_fact_extracted(&self, category: FactCategory) {
        self.contest_metrics
            .facts_extracted_total
            .with_label_values(&[category.as_str()])
            .inc();
    }

    pub fn record_contest_created(&self, contest_type: ContestType, duration: Duration) {
        let contest_type = contest_type.to_string();
        self.contest_metrics
            .contests_created_total
            .with_label_values(&[contest_type.as_str()])
            .inc();
        self.record_operation("create_contest", duration);
    }

    pub fn record_contest_completed(&self, synchronized: bool, bond_points: u32) {
        let label = if synchronized { "true" } else { "false" };
        self.contest_metrics
            .contests_completed_total
            .with_label_values(&[label])
            .inc();
        self.contest_metrics
            .bond_points_awarded
            .observe(f64::from(bond_points));
    }

    pub fn record_answer(&self, grade: Grade) {
        self.contest_metrics
            .answers_total
            .with_label_values(&[grade.as_str()])
            .inc();
    }

    /// Record a notification delivery attempt
    pub fn record_notification(&self, kind: NotificationKind, success: bool, duration: Duration) {
        if !success {
            self.service_metrics
                .notification_failures_total
                .with_label_values(&[notification_label(kind)])
                .inc();
        }
        self.performance_metrics
            .notification_duration
            .observe(duration.as_secs_f64());
    }

    /// Record engine operation duration
    pub fn record_operation(&self, operation: &str, duration: Duration) {
        self.performance_metrics
            .operation_duration
            .with_label_values(&[operation])
            .observe(duration.as_secs_f64());
    }

    /// Update health status
    pub fn update_health_status(&self, status: u8) {
        self.service_metrics.health_status.set(status as i64);
    }

    /// Update component health
    pub fn update_component_health(&self, component: &str, healthy: bool) {
        let status = if healthy { 1 } else { 0 };
        self.service_metrics
            .component_health
            .with_label_values(&[component])
            .set(status);
    }

    /// Create a timer for measuring operation duration
    pub fn start_timer(&self) -> MetricsTimer {
        MetricsTimer::new()
    }
}

fn notification_label(kind: NotificationKind) -> &'static str {
    match kind {
        NotificationKind::NewMatch => "new_match",
        NotificationKind::NewMessage => "new_message",
        NotificationKind::ContestStarted => "contest_started",
        NotificationKind::ContestCompleted => "contest_completed",
    }
}

/// Timer for measuring operation durations
pub struct MetricsTimer {
    start: Instant,
}

impl MetricsTimer {
    fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get the elapsed duration
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stop the timer and return the duration
    pub fn stop(self) -> Duration {
        self.elapsed()
    }
}

impl ServiceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let uptime_seconds = IntGauge::new("kinship_uptime_seconds", "Service uptime in seconds")?;
        registry.register(Box::new(uptime_seconds.clone()))?;

        let health_status = IntGauge::new(
            "kinship_health_status",
            "Health status (0=unhealthy, 1=degraded, 2=healthy)",
        )?;
        registry.register(Box::new(health_status.clone()))?;

        let component_health = IntGaugeVec::new(
            Opts::new("kinship_component_health", "Component health status"),
            &["component"],
        )?;
        registry.register(Box::new(component_health.clone()))?;

        let notification_failures_total = IntCounterVec::new(
            Opts::new(
                "kinship_notification_failures_total",
                "Notifications that failed or timed out",
            ),
            &["kind"],
        )?;
        registry.register(Box::new(notification_failures_total.clone()))?;

        Ok(Self {
            uptime_seconds,
            health_status,
            component_health,
            notification_failures_total,
        })
    }
}

impl MatchingMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let searches_total = IntCounterVec::new(
            Opts::new("kinship_searches_total", "Search requests by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(searches_total.clone()))?;

        let matches_total = IntCounter::new("kinship_matches_total", "Relationships created")?;
        registry.register(Box::new(matches_total.clone()))?;

        let claim_conflicts_total = IntCounter::new(
            "kinship_claim_conflicts_total",
            "Claims lost to a concurrent search",
        )?;
        registry.register(Box::new(claim_conflicts_total.clone()))?;

        let queue_cancellations_total = IntCounter::new(
            "kinship_queue_cancellations_total",
            "Queue entries cancelled or superseded",
        )?;
        registry.register(Box::new(queue_cancellations_total.clone()))?;

        let match_score = Histogram::with_opts(
            HistogramOpts::new("kinship_match_score", "Score of the selected candidate")
                .buckets(vec![5.0, 10.0, 20.0, 40.0, 60.0, 80.0, 100.0, 150.0]),
        )?;
        registry.register(Box::new(match_score.clone()))?;

        Ok(Self {
            searches_total,
            matches_total,
            claim_conflicts_total,
            queue_cancellations_total,
            match_score,
        })
    }
}

impl ContestMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let facts_extracted_total = IntCounterVec::new(
            Opts::new("kinship_facts_extracted_total", "Facts extracted from chat"),
            &["category"],
        )?;
        registry.register(Box::new(facts_extracted_total.clone()))?;

        let contests_created_total = IntCounterVec::new(
            Opts::new("kinship_contests_created_total", "Contests created"),
            &["contest_type"],
        )?;
        registry.register(Box::new(contests_created_total.clone()))?;

        let contests_completed_total = IntCounterVec::new(
            Opts::new("kinship_contests_completed_total", "Contests completed"),
            &["synchronized"],
        )?;
        registry.register(Box::new(contests_completed_total.clone()))?;

        let bond_points_awarded = Histogram::with_opts(
            HistogramOpts::new(
                "kinship_bond_points_awarded",
                "Bond points awarded per contest",
            )
            .buckets(vec![0.0, 10.0, 20.0, 35.0, 50.0, 75.0, 100.0, 150.0]),
        )?;
        registry.register(Box::new(bond_points_awarded.clone()))?;

        let answers_total = IntCounterVec::new(
            Opts::new("kinship_answers_total", "Answers graded"),
            &["grade"],
        )?;
        registry.register(Box::new(answers_total.clone()))?;

        Ok(Self {
            facts_extracted_total,
            contests_created_total,
            contests_completed_total,
            bond_points_awarded,
            answers_total,
        })
    }
}

impl PerformanceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let operation_duration = HistogramVec::new(
            HistogramOpts::new(
                "kinship_operation_duration_seconds",
                "Engine operation duration",
            )
            .buckets(vec![0.0001, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
            &["operation"],
        )?;
        registry.register(Box::new(operation_duration.clone()))?;

        let notification_duration = Histogram::with_opts(
            HistogramOpts::new(
                "kinship_notification_duration_seconds",
                "Notification delivery time",
            )
            .buckets(vec![0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0]),
        )?;
        registry.register(Box::new(notification_duration.clone()))?;

        Ok(Self {
            operation_duration,
            notification_duration,
        })
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new().expect("Failed to create default metrics collector")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_collector_creation() {
        let collector = MetricsCollector::new().expect("Failed to create metrics collector");

        let _service = collector.service();
        let _matching = collector.matching();
        let _contest = collector.contest();
        let _performance = collector.performance();
    }

    #[test]
    fn test_matching_counters() {
        let collector = MetricsCollector::new().unwrap();

        collector.record_search(true, Duration::from_millis(3));
        collector.record_search(false, Duration::from_millis(1));
        collector.record_match(42);
        collector.record_claim_conflict();
        collector.record_queue_cancellations(2);

        let matching = collector.matching();
        assert_eq!(matching.searches_total.with_label_values(&["matched"]).get(), 1);
        assert_eq!(matching.matches_total.get(), 1);
        assert_eq!(matching.claim_conflicts_total.get(), 1);
        assert_eq!(matching.queue_cancellations_total.get(), 2);
    }

    #[test]
    fn test_encode_text() {
        let collector = MetricsCollector::new().unwrap();
        collector.record_claim_conflict();

        let (content_type, body) = collector.encode_text().unwrap();
        assert!(content_type.starts_with("text/plain"));
        assert!(body.contains("kinship_claim_conflicts_total 1"));
    }

    #[test]
    fn test_contest_counters() {
        let collector = MetricsCollector::new().unwrap();

        collector.record_fact_extracted(FactCategory::FavoriteFood);
        collector.record_contest_created(ContestType::Weekly, Duration::from_millis(2));
        collector.record_contest_completed(true, 67);
        collector.record_answer(Grade::Partial);

        let contest = collector.contest();
        assert_eq!(
            contest
                .facts_extracted_total
                .with_label_values(&["favorite_food"])
                .get(),
            1
        );
        assert_eq!(
            contest
                .contests_created_total
                .with_label_values(&["weekly"])
                .get(),
            1
        );
        assert_eq!(contest.answers_total.with_label_values(&["partial"]).get(), 1);
    }

    #[test]
    fn test_notification_failures_counted() {
        let collector = MetricsCollector::new().unwrap();
        collector.record_notification(NotificationKind::NewMatch, true, Duration::from_millis(1));
        collector.record_notification(NotificationKind::NewMatch, false, Duration::from_millis(1));

        assert_eq!(
            collector
                .service()
                .notification_failures_total
                .with_label_values(&["new_match"])
                .get(),
            1
        );
    }

    #[test]
    fn test_health_status_updates() {
        let collector = MetricsCollector::new().unwrap();

        collector.update_health_status(2);
        collector.update_component_health("bond_service", true);
        collector.update_component_health("store", false);
    }

    #[test]
    fn test_export_contains_prefix() {
        let collector = MetricsCollector::new().unwrap();
        collector.record_match(10);

        let families = collector.registry().gather();
        assert!(families.iter().any(|f| f.get_name() == "kinship_matches_total"));
        assert!(families.iter().all(|f| f.get_name().starts_with("kinship_")));
    }
}
