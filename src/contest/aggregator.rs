//! Contest completion and relationship progression
//!
//! The arithmetic lives in [`tally`], a pure function. Persisting the
//! result is one guarded repository write, so a contest can only ever be
//! folded into its relationship once.

use crate::config::ContestSettings;
use crate::error::{BondError, Result};
use crate::storage::{ContestCompletion, ContestRepository};
use crate::types::*;
use crate::utils::current_timestamp;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

/// Scores and rewards computed from both members' totals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ContestTally {
    pub user_a_score: u32,
    pub user_b_score: u32,
    pub total_score: u32,
    pub is_synchronized: bool,
    pub bond_points_awarded: u32,
    pub care_gain: u32,
    pub won: bool,
    pub passed: bool,
}

/// `total >= max_points * percent / 100`, without floating point
fn reaches(total: u32, max_points: u32, percent: u32) -> bool {
    u64::from(total) * 100 >= u64::from(max_points) * u64::from(percent)
}

/// Compute the outcome of a contest from each member's points
pub fn tally(
    user_a_score: u32,
    user_b_score: u32,
    max_points: u32,
    settings: &ContestSettings,
) -> ContestTally {
    let total_score = user_a_score + user_b_score;
    let is_synchronized = user_a_score > 0
        && user_b_score > 0
        && user_a_score.abs_diff(user_b_score) <= settings.sync_threshold;

    let bond_points_awarded = if is_synchronized {
        let boosted = u64::from(total_score) * u64::from(settings.sync_multiplier_percent) / 100;
        u32::try_from(boosted).unwrap_or(u32::MAX)
    } else {
        total_score
    };

    ContestTally {
        user_a_score,
        user_b_score,
        total_score,
        is_synchronized,
        bond_points_awarded,
        care_gain: bond_points_awarded / settings.care_divisor,
        won: reaches(total_score, max_points, settings.win_percent),
        passed: reaches(total_score, max_points, settings.pass_percent),
    }
}

/// Returned to the caller when a contest closes
#[derive(Debug, Clone, Serialize)]
pub struct ContestSummary {
    pub contest: Contest,
    pub relationship: Relationship,
    pub user_a_score: u32,
    pub user_b_score: u32,
    pub total_score: u32,
    pub is_synchronized: bool,
    pub bond_points_awarded: u32,
    pub won: bool,
    pub passed: bool,
}

/// Closes contests and updates relationship progression
pub struct ContestAggregator {
    contests: Arc<dyn ContestRepository>,
    settings: ContestSettings,
}

impl ContestAggregator {
    pub fn new(contests: Arc<dyn ContestRepository>, settings: ContestSettings) -> Self {
        Self { contests, settings }
    }

    /// Complete `contest_id`. Completing it a second time is a `Conflict`
    /// and leaves the relationship untouched.
    pub async fn complete(&self, contest_id: ContestId) -> Result<ContestSummary> {
        let contest = self
            .contests
            .get_contest(contest_id)
            .await?
            .ok_or_else(|| BondError::not_found("contest", contest_id))?;
        if contest.status == ContestStatus::Completed {
            return Err(BondError::conflict("contest already completed"));
        }

        let questions = self.contests.get_questions(contest_id).await?;
        let total_a = questions.iter().map(|q| q.points_for(MemberSlot::A)).sum();
        let total_b = questions.iter().map(|q| q.points_for(MemberSlot::B)).sum();
        let outcome = tally(total_a, total_b, contest.max_points, &self.settings);

        let (contest, relationship) = self
            .contests
            .commit_completion(ContestCompletion {
                contest_id,
                user_a_score: outcome.user_a_score,
                user_b_score: outcome.user_b_score,
                total_score: outcome.total_score,
                is_synchronized: outcome.is_synchronized,
                bond_points_awarded: outcome.bond_points_awarded,
                care_gain: outcome.care_gain,
                care_cap: self.settings.care_cap,
                won: outcome.won,
                completed_at: current_timestamp(),
            })
            .await?;

        info!(
            "Completed contest {}: {} + {} points, synchronized={}, {} bond points to relationship {}",
            contest_id,
            outcome.user_a_score,
            outcome.user_b_score,
            outcome.is_synchronized,
            outcome.bond_points_awarded,
            relationship.id
        );

        Ok(ContestSummary {
            contest,
            relationship,
            user_a_score: outcome.user_a_score,
            user_b_score: outcome.user_b_score,
            total_score: outcome.total_score,
            is_synchronized: outcome.is_synchronized,
            bond_points_awarded: outcome.bond_points_awarded,
            won: outcome.won,
            passed: outcome.passed,
        })
    }
}
