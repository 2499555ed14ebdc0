//! Configuration management for the kinship-engine service
//!
//! This module handles configuration loading from environment variables and
//! TOML files, validation, and the default scoring constants.

pub mod app;
pub mod contest;
pub mod matching;

// Re-export commonly used types
pub use app::{validate_config, AppConfig, ServiceSettings};
pub use contest::ContestSettings;
pub use matching::MatchingSettings;
