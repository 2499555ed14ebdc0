//! Health check endpoints and monitoring
//!
//! This module provides health check functionality for the kinship-engine
//! service, including readiness and liveness checks.

use crate::service::app::AppState;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error};

/// Health check status
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    /// Gauge value exported as `kinship_health_status`
    pub fn as_gauge(&self) -> u8 {
        match self {
            HealthStatus::Healthy => 2,
            HealthStatus::Degraded => 1,
            HealthStatus::Unhealthy => 0,
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Degraded => write!(f, "degraded"),
            HealthStatus::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    /// Overall service status
    pub status: HealthStatus,
    /// Service name
    pub service: String,
    /// Service version (could be from environment)
    pub version: String,
    /// Current timestamp
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Detailed component checks
    pub checks: Vec<ComponentCheck>,
    /// Service statistics
    pub stats: ServiceStats,
}

/// Individual component health check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentCheck {
    /// Component name
    pub name: String,
    /// Component status
    pub status: HealthStatus,
    /// Optional error message if unhealthy
    pub message: Option<String>,
    /// Check duration in milliseconds
    pub duration_ms: u64,
}

/// Service statistics for health reporting
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceStats {
    pub searches: u64,
    pub matches: u64,
    pub claim_conflicts: u64,
    pub facts_extracted: u64,
    pub contests_created: u64,
    pub contests_completed: u64,
    pub notification_failures: u64,
    /// Relationships currently stored
    pub relationships: usize,
    /// Chat rooms with at least one listener
    pub open_rooms: usize,
}

impl HealthCheck {
    /// Perform a comprehensive health check of the service
    pub async fn check(app_state: Arc<AppState>) -> Result<Self> {
        let mut checks = Vec::new();
        let mut overall_status = HealthStatus::Healthy;

        // Check if service is running
        let service_check = Self::check_service_running(&app_state).await;
        if service_check.status != HealthStatus::Healthy {
            overall_status = HealthStatus::Unhealthy;
        }
        checks.push(service_check);

        for check in [
            Self::check_store(&app_state),
            Self::check_bond_service(&app_state),
        ] {
            if check.status == HealthStatus::Unhealthy {
                overall_status = HealthStatus::Unhealthy;
            } else if check.status == HealthStatus::Degraded
                && overall_status == HealthStatus::Healthy
            {
                overall_status = HealthStatus::Degraded;
            }
            checks.push(check);
        }

        let stats = Self::gather_service_stats(&app_state);

        Ok(HealthCheck {
            status: overall_status,
            service: app_state.config().service.name.clone(),
            version: std::env::var("SERVICE_VERSION")
                .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string()),
            timestamp: chrono::Utc::now(),
            checks,
            stats,
        })
    }

    /// Simple liveness check - just verify service is running
    pub async fn liveness_check(app_state: Arc<AppState>) -> Result<HealthStatus> {
        if app_state.is_running().await {
            Ok(HealthStatus::Healthy)
        } else {
            Ok(HealthStatus::Unhealthy)
        }
    }

    /// Readiness check - verify service can handle requests
    pub async fn readiness_check(app_state: Arc<AppState>) -> Result<HealthStatus> {
        if !app_state.is_running().await {
            return Ok(HealthStatus::Unhealthy);
        }
        Ok(Self::check_store(&app_state).status)
    }

    async fn check_service_running(app_state: &AppState) -> ComponentCheck {
        let start = std::time::Instant::now();

        let (status, message) = if app_state.is_running().await {
            (HealthStatus::Healthy, None)
        } else {
            (
                HealthStatus::Unhealthy,
                Some("Service is not running".to_string()),
            )
        };

        ComponentCheck {
            name: "service_running".to_string(),
            status,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    /// The store is the only hard dependency; if it cannot be read nothing works
    fn check_store(app_state: &AppState) -> ComponentCheck {
        let start = std::time::Instant::now();

        let (status, message) = match app_state.store().relationship_count() {
            Ok(_) => (HealthStatus::Healthy, None),
            Err(e) => {
                error!("Store health check failed: {}", e);
                (HealthStatus::Unhealthy, Some(e.to_string()))
            }
        };

        ComponentCheck {
            name: "store".to_string(),
            status,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    /// Notification failures degrade the service without taking it down
    fn check_bond_service(app_state: &AppState) -> ComponentCheck {
        let start = std::time::Instant::now();

        let (status, message) = match app_state.bond_service().get_stats() {
            Ok(stats) if stats.notification_failures > 0 => (
                HealthStatus::Degraded,
                Some(format!(
                    "{} notifications failed since startup",
                    stats.notification_failures
                )),
            ),
            Ok(_) => (HealthStatus::Healthy, None),
            Err(e) => (
                HealthStatus::Degraded,
                Some(format!("Stats check failed: {}", e)),
            ),
        };

        ComponentCheck {
            name: "bond_service".to_string(),
            status,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    fn gather_service_stats(app_state: &AppState) -> ServiceStats {
        let relationships = app_state.store().relationship_count().unwrap_or(0);
        let open_rooms = app_state.bond_service().rooms().room_count();

        match app_state.bond_service().get_stats() {
            Ok(stats) => ServiceStats {
                searches: stats.searches,
                matches: stats.matches,
                claim_conflicts: stats.claim_conflicts,
                facts_extracted: stats.facts_extracted,
                contests_created: stats.contests_created,
                contests_completed: stats.contests_completed,
                notification_failures: stats.notification_failures,
                relationships,
                open_rooms,
            },
            Err(e) => {
                debug!("Failed to get bond service stats for health check: {}", e);
                ServiceStats {
                    relationships,
                    open_rooms,
                    ..ServiceStats::default()
                }
            }
        }
    }
}

/// Convert health check to JSON string
impl HealthCheck {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| anyhow::anyhow!("Failed to serialize health check: {}", e))
    }
}
