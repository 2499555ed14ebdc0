//! Main application state and service coordination
//!
//! This module contains the production AppState that owns the store, the
//! bond service, the metrics endpoints and the background tasks.

use crate::config::AppConfig;
use crate::metrics::{HealthServer, MetricsCollector};
use crate::notify::{NotificationSink, TracingNotificationSink};
use crate::service::bond::BondService;
use crate::service::health::{HealthCheck, HealthStatus};
use crate::storage::InMemoryStore;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

/// Interval between uptime and health gauge refreshes
const HEALTH_METRICS_INTERVAL: Duration = Duration::from_secs(60);
/// Interval between sweeps of chat rooms nobody listens to
const ROOM_PRUNE_INTERVAL: Duration = Duration::from_secs(300);

/// Service-level errors
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Service initialization error: {message}")]
    Initialization { message: String },

    #[error("Background task error: {message}")]
    BackgroundTask { message: String },
}

/// Main application state containing all service components
pub struct AppState {
    /// Application configuration
    config: AppConfig,

    /// Backing store for profiles, queue, relationships, facts and contests
    store: Arc<InMemoryStore>,

    /// Matching and contest operations
    bond_service: Arc<BondService>,

    metrics: Arc<MetricsCollector>,

    /// Health and metrics endpoints, present while started
    health_server: Mutex<Option<Arc<HealthServer>>>,

    /// Background task handles
    background_tasks: Mutex<Vec<JoinHandle<()>>>,

    /// Service status
    is_running: Arc<RwLock<bool>>,
}

impl AppState {
    /// Initialize the application with a logging notification sink
    pub fn new(config: AppConfig) -> Result<Self, ServiceError> {
        Self::with_notifier(config, Arc::new(TracingNotificationSink))
    }

    /// Initialize the application with a caller-supplied notification sink
    pub fn with_notifier(
        config: AppConfig,
        notifier: Arc<dyn NotificationSink>,
    ) -> Result<Self, ServiceError> {
        info!("Initializing {} service", config.service.name);

        crate::config::validate_config(&config).map_err(|e| ServiceError::Configuration {
            message: e.to_string(),
        })?;

        let metrics =
            Arc::new(
                MetricsCollector::new().map_err(|e| ServiceError::Initialization {
                    message: format!("Failed to create metrics collector: {}", e),
                })?,
            );
        let store = Arc::new(InMemoryStore::new());
        let bond_service = Arc::new(BondService::new(
            &config,
            store.clone(),
            notifier,
            metrics.clone(),
        ));

        Ok(Self {
            config,
            store,
            bond_service,
            metrics,
            health_server: Mutex::new(None),
            background_tasks: Mutex::new(Vec::new()),
            is_running: Arc::new(RwLock::new(false)),
        })
    }

    /// Start the health endpoints and background tasks
    pub async fn start(self: &Arc<Self>) -> Result<(), ServiceError> {
        info!("Starting {} service", self.config.service.name);

        self.mark_running(true).await;
        self.start_health_server().await?;
        self.start_background_tasks().await;

        info!("{} service started successfully", self.config.service.name);
        Ok(())
    }

    /// Perform graceful shutdown
    pub async fn shutdown(&self) -> Result<(), ServiceError> {
        info!("Starting graceful shutdown of {}", self.config.service.name);

        self.mark_running(false).await;

        if let Some(server) = self.health_server.lock().await.take() {
            info!("Stopping health server on {}", server.addr());
            server.stop();
        }
        self.stop_background_tasks().await;

        let final_stats =
            self.bond_service
                .get_stats()
                .map_err(|e| ServiceError::BackgroundTask {
                    message: format!("Failed to get final stats: {}", e),
                })?;
        info!("Final service statistics: {:?}", final_stats);
        info!("{} shutdown completed", self.config.service.name);

        Ok(())
    }

    /// Get service configuration
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Check if service is running
    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    /// Flip the running flag without touching tasks or endpoints
    pub async fn mark_running(&self, running: bool) {
        *self.is_running.write().await = running;
    }

    pub fn store(&self) -> Arc<InMemoryStore> {
        self.store.clone()
    }

    pub fn bond_service(&self) -> Arc<BondService> {
        self.bond_service.clone()
    }

    pub fn metrics(&self) -> Arc<MetricsCollector> {
        self.metrics.clone()
    }

    async fn start_health_server(self: &Arc<Self>) -> Result<(), ServiceError> {
        let port = self.config.service.health_port;
        let server = Arc::new(HealthServer::new("0.0.0.0", port, self.clone()).map_err(|e| {
            ServiceError::Initialization {
                message: format!("Failed to configure health server: {}", e),
            }
        })?);
        info!("Starting health and metrics endpoints on {}", server.addr());

        let serving = server.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = serving.serve().await {
                error!("Health server failed: {:#}", e);
            }
        });

        *self.health_server.lock().await = Some(server);
        self.background_tasks.lock().await.push(handle);

        // Give the server a moment to bind
        tokio::time::sleep(Duration::from_millis(100)).await;
        Ok(())
    }

    async fn start_background_tasks(self: &Arc<Self>) {
        info!("Starting background maintenance tasks...");

        let health_metrics_task = {
            let state = self.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(HEALTH_METRICS_INTERVAL);
                let start_time = tokio::time::Instant::now();
                info!("Health metrics task started");

                while state.is_running().await {
                    interval.tick().await;

                    let uptime_seconds = start_time.elapsed().as_secs() as i64;
                    state.metrics.service().uptime_seconds.set(uptime_seconds);

                    match HealthCheck::check(state.clone()).await {
                        Ok(report) => {
                            state.metrics.update_health_status(report.status.as_gauge());
                            for check in &report.checks {
                                state.metrics.update_component_health(
                                    &check.name,
                                    check.status != HealthStatus::Unhealthy,
                                );
                            }
                            debug!(
                                "Updated service health metrics - uptime: {}s, status: {}",
                                uptime_seconds, report.status
                            );
                        }
                        Err(e) => warn!("Health check for metrics update failed: {}", e),
                    }
                }

                info!("Health metrics task stopped");
            })
        };

        let room_prune_task = {
            let rooms = self.bond_service.rooms();
            let is_running = self.is_running.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(ROOM_PRUNE_INTERVAL);
                info!("Room prune task started");

                while *is_running.read().await {
                    interval.tick().await;

                    let pruned = rooms.prune();
                    if pruned > 0 {
                        info!("Closed {} chat rooms without listeners", pruned);
                    } else {
                        debug!("Room prune completed - nothing to close");
                    }
                }

                info!("Room prune task stopped");
            })
        };

        let mut tasks = self.background_tasks.lock().await;
        tasks.push(health_metrics_task);
        tasks.push(room_prune_task);
        info!("{} background tasks running", tasks.len());
    }

    async fn stop_background_tasks(&self) {
        let mut tasks = self.background_tasks.lock().await;
        let task_count = tasks.len();
        if task_count == 0 {
            info!("No background tasks to stop");
            return;
        }

        info!("Stopping {} background tasks...", task_count);
        for (i, task) in tasks.drain(..).enumerate() {
            debug!("Aborting background task {}/{}", i + 1, task_count);
            task.abort();
        }

        info!("All {} background tasks stopped", task_count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = AppConfig::default();
        config.contest.points_per_question = 0;
        assert!(matches!(
            AppState::new(config),
            Err(ServiceError::Configuration { .. })
        ));
    }

    #[tokio::test]
    async fn test_start_and_shutdown() {
        let mut config = AppConfig::default();
        // Unlikely to collide with anything else bound during tests
        config.service.health_port = 38_917;
        let state = Arc::new(AppState::new(config).unwrap());

        state.start().await.unwrap();
        assert!(state.is_running().await);

        state.shutdown().await.unwrap();
        assert!(!state.is_running().await);
        assert!(state.health_server.lock().await.is_none());
    }
}
