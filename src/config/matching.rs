//! Matching score configuration
//!
//! The constants are hand-tuned values carried over unchanged; they are
//! configurable so operators can adjust them without a rebuild.

use serde::{Deserialize, Serialize};

/// Weights used by the match scorer and queue
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingSettings {
    /// Points per shared (ease) or new (learning) language
    pub language_weight: u32,
    /// Bonus for verified candidates
    pub verified_bonus: u32,
    /// Candidate care score is divided by this
    pub care_divisor: u32,
    /// Candidate reliability score is divided by this
    pub reliability_divisor: u32,
    /// Reliability assumed when a profile has none
    pub default_reliability: u32,
    /// Jitter is drawn from `[0, jitter_max)`
    pub jitter_max: u32,
    /// Accept role names outside the built-in table
    pub allow_custom_roles: bool,
}

impl Default for MatchingSettings {
    fn default() -> Self {
        Self {
            language_weight: 20,
            verified_bonus: 30,
            care_divisor: 10,
            reliability_divisor: 20,
            default_reliability: 100,
            jitter_max: 15,
            allow_custom_roles: false,
        }
    }
}
