//! Prometheus metrics and the HTTP endpoints that expose them
//!
//! [`MetricsCollector`] is shared by every component that records; the
//! [`HealthServer`] is started by `AppState` and serves the collector next to
//! the health checks.

pub mod collector;
pub mod health;

pub use collector::{
    ContestMetrics, MatchingMetrics, MetricsCollector, MetricsTimer, PerformanceMetrics,
    ServiceMetrics,
};
pub use health::{HealthServer, StatsReport};
