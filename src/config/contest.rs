//! Contest generation and aggregation configuration

use crate::types::ContestType;
use serde::{Deserialize, Serialize};

/// Shape of generated contests and the reward rules applied on completion
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContestSettings {
    pub weekly_questions: u32,
    pub daily_questions: u32,
    pub weekly_time_limit_minutes: u32,
    pub daily_time_limit_minutes: u32,
    pub points_per_question: u32,
    /// Maximum score gap between members that still counts as synchronized
    pub sync_threshold: u32,
    /// Bond point multiplier for synchronized contests, in percent
    pub sync_multiplier_percent: u32,
    /// Awarded bond points are divided by this to raise the care score
    pub care_divisor: u32,
    pub care_cap: u32,
    /// Share of max points needed to count as a win, in percent
    pub win_percent: u32,
    /// Share of max points needed to pass, in percent
    pub pass_percent: u32,
    /// Confidence recorded on facts produced by the rule table
    pub fact_confidence: f32,
    /// Attempts at claiming facts before contest creation gives up
    pub max_generation_attempts: u32,
}

impl Default for ContestSettings {
    fn default() -> Self {
        Self {
            weekly_questions: 5,
            daily_questions: 3,
            weekly_time_limit_minutes: 10,
            daily_time_limit_minutes: 5,
            points_per_question: 10,
            sync_threshold: 10,
            sync_multiplier_percent: 150,
            care_divisor: 5,
            care_cap: 100,
            win_percent: 70,
            pass_percent: 50,
            fact_confidence: 0.85,
            max_generation_attempts: 3,
        }
    }
}

impl ContestSettings {
    pub fn question_count(&self, contest_type: ContestType) -> u32 {
        match contest_type {
            ContestType::Weekly => self.weekly_questions,
            ContestType::Daily => self.daily_questions,
        }
    }

    pub fn time_limit_minutes(&self, contest_type: ContestType) -> u32 {
        match contest_type {
            ContestType::Weekly => self.weekly_time_limit_minutes,
            ContestType::Daily => self.daily_time_limit_minutes,
        }
    }

    pub fn max_points(&self, contest_type: ContestType) -> u32 {
        self.question_count(contest_type) * self.points_per_question
    }
}
