//! Main application configuration
//!
//! This module defines the primary configuration structures for the
//! kinship-engine service, including environment variable loading, TOML
//! file loading and validation.

use crate::config::contest::ContestSettings;
use crate::config::matching::MatchingSettings;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub service: ServiceSettings,
    #[serde(default)]
    pub matching: MatchingSettings,
    #[serde(default)]
    pub contest: ContestSettings,
}

/// Service-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Service name for logging and metrics
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Port for health check endpoint
    pub health_port: u16,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,
    /// Upper bound on a single notification delivery attempt
    pub notification_timeout_ms: u64,
    /// Capacity of each relationship's room broadcast channel
    pub room_channel_capacity: usize,
    /// Fixed seed for the random source (jitter, filler questions)
    pub rng_seed: Option<u64>,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: "kinship-engine".to_string(),
            log_level: "info".to_string(),
            health_port: 8080,
            shutdown_timeout_seconds: 30,
            notification_timeout_ms: 2000,
            room_channel_capacity: 64,
            rng_seed: None,
        }
    }
}

/// Parse an environment variable into `target` if it is set
fn override_from_env<T: FromStr>(key: &str, target: &mut T) -> Result<()> {
    if let Ok(raw) = env::var(key) {
        *target = raw
            .parse()
            .map_err(|_| anyhow!("Invalid {} value: {}", key, raw))?;
    }
    Ok(())
}

impl AppConfig {
    /// Load configuration from environment variables with fallback to defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Load configuration from a TOML file, then apply environment overrides
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config = Self::from_toml_str(&raw)?;
        config.apply_env_overrides()?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Parse configuration from TOML text without touching the environment
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).context("Failed to parse TOML configuration")
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        // Service settings
        if let Ok(name) = env::var("SERVICE_NAME") {
            self.service.name = name;
        }
        if let Ok(log_level) = env::var("LOG_LEVEL") {
            self.service.log_level = log_level;
        }
        override_from_env("HEALTH_PORT", &mut self.service.health_port)?;
        override_from_env(
            "SHUTDOWN_TIMEOUT_SECONDS",
            &mut self.service.shutdown_timeout_seconds,
        )?;
        override_from_env(
            "NOTIFICATION_TIMEOUT_MS",
            &mut self.service.notification_timeout_ms,
        )?;
        if let Ok(seed) = env::var("RNG_SEED") {
            self.service.rng_seed = Some(
                seed.parse()
                    .map_err(|_| anyhow!("Invalid RNG_SEED value: {}", seed))?,
            );
        }

        // Matching settings
        override_from_env("LANGUAGE_WEIGHT", &mut self.matching.language_weight)?;
        override_from_env("VERIFIED_BONUS", &mut self.matching.verified_bonus)?;
        override_from_env("CARE_DIVISOR", &mut self.matching.care_divisor)?;
        override_from_env("RELIABILITY_DIVISOR", &mut self.matching.reliability_divisor)?;
        override_from_env("JITTER_MAX", &mut self.matching.jitter_max)?;
        override_from_env("ALLOW_CUSTOM_ROLES", &mut self.matching.allow_custom_roles)?;

        // Contest settings
        override_from_env("SYNC_THRESHOLD", &mut self.contest.sync_threshold)?;
        override_from_env(
            "SYNC_MULTIPLIER_PERCENT",
            &mut self.contest.sync_multiplier_percent,
        )?;
        override_from_env("WIN_PERCENT", &mut self.contest.win_percent)?;
        override_from_env("PASS_PERCENT", &mut self.contest.pass_percent)?;
        override_from_env("POINTS_PER_QUESTION", &mut self.contest.points_per_question)?;

        Ok(())
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.service.shutdown_timeout_seconds)
    }

    /// Get notification delivery timeout as Duration
    pub fn notification_timeout(&self) -> Duration {
        Duration::from_millis(self.service.notification_timeout_ms)
    }
}

/// Validate configuration values
pub fn validate_config(config: &AppConfig) -> Result<()> {
    // Validate log level
    match config.service.log_level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        _ => return Err(anyhow!("Invalid log level: {}", config.service.log_level)),
    }

    if config.service.health_port == 0 {
        return Err(anyhow!("Health port cannot be 0"));
    }
    if config.service.shutdown_timeout_seconds == 0 {
        return Err(anyhow!("Shutdown timeout must be greater than 0"));
    }
    if config.service.room_channel_capacity == 0 {
        return Err(anyhow!("Room channel capacity must be greater than 0"));
    }

    // Divisors feed integer division
    if config.matching.care_divisor == 0 || config.matching.reliability_divisor == 0 {
        return Err(anyhow!("Matching divisors must be greater than 0"));
    }
    if config.contest.care_divisor == 0 {
        return Err(anyhow!("Contest care divisor must be greater than 0"));
    }

    let contest = &config.contest;
    if contest.weekly_questions == 0 || contest.daily_questions == 0 {
        return Err(anyhow!("Contests must contain at least one question"));
    }
    if contest.points_per_question == 0 {
        return Err(anyhow!("Points per question must be greater than 0"));
    }
    if contest.sync_multiplier_percent < 100 {
        return Err(anyhow!("Synchrony multiplier cannot reduce bond points"));
    }
    if contest.win_percent > 100 || contest.pass_percent > 100 {
        return Err(anyhow!("Win and pass thresholds are percentages (0-100)"));
    }
    if contest.care_cap > 100 {
        return Err(anyhow!("Care score cap cannot exceed 100"));
    }
    if !(0.0..=1.0).contains(&contest.fact_confidence) {
        return Err(anyhow!("Fact confidence must be between 0 and 1"));
    }
    if contest.max_generation_attempts == 0 {
        return Err(anyhow!("Contest generation needs at least one attempt"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(validate_config(&config).is_ok());
        assert_eq!(config.service.name, "kinship-engine");
        assert_eq!(config.notification_timeout(), Duration::from_millis(2000));
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = AppConfig::default();
        config.service.log_level = "loud".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_zero_divisor_rejected() {
        let mut config = AppConfig::default();
        config.matching.care_divisor = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_multiplier_below_one_rejected() {
        let mut config = AppConfig::default();
        config.contest.sync_multiplier_percent = 90;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_toml_partial_sections() {
        let config = AppConfig::from_toml_str(
            r#"
            [service]
            health_port = 9191
            rng_seed = 42

            [contest]
            win_percent = 80
            "#,
        )
        .unwrap();

        assert_eq!(config.service.health_port, 9191);
        assert_eq!(config.service.rng_seed, Some(42));
        assert_eq!(config.service.log_level, "info");
        assert_eq!(config.contest.win_percent, 80);
        assert_eq!(config.contest.pass_percent, 50);
        assert_eq!(config.matching.verified_bonus, 30);
    }
}
