//! HTTP surface for health checks and Prometheus scraping
//!
//! Every route reads from the running [`AppState`]. `/health` returns the
//! full component report, `/ready` and `/alive` answer in plain text,
//! `/metrics` is the Prometheus exposition and `/stats` groups the bond
//! service totals for people reading them.

use crate::service::app::AppState;
use crate::service::health::{ComponentCheck, HealthCheck, HealthStatus};
use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tracing::{debug, error, info};

const ROUTES: [&str; 5] = ["/health", "/ready", "/alive", "/metrics", "/stats"];

/// Health and metrics endpoints for one running service
pub struct HealthServer {
    addr: SocketAddr,
    app_state: Arc<AppState>,
    shutdown: Arc<Notify>,
}

impl HealthServer {
    pub fn new(host: &str, port: u16, app_state: Arc<AppState>) -> Result<Self> {
        let addr = format!("{}:{}", host, port)
            .parse()
            .with_context(|| format!("Invalid health server address {}:{}", host, port))?;
        Ok(Self {
            addr,
            app_state,
            shutdown: Arc::new(Notify::new()),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    fn router(&self) -> Router {
        Router::new()
            .route("/", get(index))
            .route("/health", get(health))
            .route("/ready", get(ready))
            .route("/alive", get(alive))
            .route("/metrics", get(metrics))
            .route("/stats", get(stats))
            .with_state(self.app_state.clone())
    }

    /// Serve until [`HealthServer::stop`] is called
    pub async fn serve(&self) -> Result<()> {
        let listener = TcpListener::bind(self.addr)
            .await
            .with_context(|| format!("Failed to bind health server to {}", self.addr))?;
        info!("Health server listening on http://{}", self.addr);

        let shutdown = self.shutdown.clone();
        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move { shutdown.notified().await })
            .await
            .context("Health server failed")?;

        info!("Health server stopped");
        Ok(())
    }

    /// Drain and exit; a stop requested before serving starts still counts
    pub fn stop(&self) {
        self.shutdown.notify_one();
    }
}

/// Totals served at `/stats`
#[derive(Debug, Serialize)]
pub struct StatsReport {
    pub service: String,
    pub version: String,
    pub status: HealthStatus,
    pub matching: MatchingTotals,
    pub contests: ContestTotals,
    pub notifications: NotificationTotals,
    pub components: Vec<ComponentCheck>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct MatchingTotals {
    pub searches: u64,
    pub matches: u64,
    pub claim_conflicts: u64,
    pub relationships: usize,
}

#[derive(Debug, Serialize)]
pub struct ContestTotals {
    pub facts_extracted: u64,
    pub created: u64,
    pub completed: u64,
}

#[derive(Debug, Serialize)]
pub struct NotificationTotals {
    pub failures: u64,
    pub open_rooms: usize,
}

impl From<HealthCheck> for StatsReport {
    fn from(report: HealthCheck) -> Self {
        let stats = report.stats;
        Self {
            service: report.service,
            version: report.version,
            status: report.status,
            matching: MatchingTotals {
                searches: stats.searches,
                matches: stats.matches,
                claim_conflicts: stats.claim_conflicts,
                relationships: stats.relationships,
            },
            contests: ContestTotals {
                facts_extracted: stats.facts_extracted,
                created: stats.contests_created,
                completed: stats.contests_completed,
            },
            notifications: NotificationTotals {
                failures: stats.notification_failures,
                open_rooms: stats.open_rooms,
            },
            components: report.checks,
            timestamp: report.timestamp,
        }
    }
}

#[derive(Serialize)]
struct Index {
    service: String,
    version: &'static str,
    endpoints: [&'static str; 5],
}

/// Degraded still serves traffic
fn status_code(status: &HealthStatus) -> StatusCode {
    match status {
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
    }
}

fn report_failed(route: &str, e: anyhow::Error) -> Response {
    error!("{} failed: {}", route, e);
    (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response()
}

fn plain_status(route: &str, outcome: Result<HealthStatus>) -> Response {
    match outcome {
        Ok(status) => (status_code(&status), status.to_string()).into_response(),
        Err(e) => report_failed(route, e),
    }
}

async fn index(State(app): State<Arc<AppState>>) -> Json<Index> {
    Json(Index {
        service: app.config().service.name.clone(),
        version: env!("CARGO_PKG_VERSION"),
        endpoints: ROUTES,
    })
}

async fn health(State(app): State<Arc<AppState>>) -> Response {
    debug!("Health report requested");
    match HealthCheck::check(app).await {
        Ok(report) => (status_code(&report.status), Json(report)).into_response(),
        Err(e) => report_failed("/health", e),
    }
}

async fn ready(State(app): State<Arc<AppState>>) -> Response {
    plain_status("/ready", HealthCheck::readiness_check(app).await)
}

async fn alive(State(app): State<Arc<AppState>>) -> Response {
    plain_status("/alive", HealthCheck::liveness_check(app).await)
}

async fn metrics(State(app): State<Arc<AppState>>) -> Response {
    match app.metrics().encode_text() {
        Ok((content_type, body)) => ([(header::CONTENT_TYPE, content_type)], body).into_response(),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics").into_response()
        }
    }
}

async fn stats(State(app): State<Arc<AppState>>) -> Response {
    match HealthCheck::check(app).await {
        Ok(report) => {
            let code = status_code(&report.status);
            (code, Json(StatsReport::from(report))).into_response()
        }
        Err(e) => report_failed("/stats", e),
    }
}
