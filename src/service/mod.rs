//! Service layer for the kinship-engine service
//!
//! This module contains the bond service that exposes engine operations,
//! the application state that owns it, and health reporting.

pub mod app;
pub mod bond;
pub mod health;

pub use app::{AppState, ServiceError};
pub use bond::{BondService, BondServiceStats, BondStore, QueueStatusReport, SearchOutcome};
pub use health::{HealthCheck, HealthStatus};
