//! Free-text answer grading with partial credit

use crate::error::{BondError, Result};
use crate::storage::{ContestRepository, RelationshipRepository};
use crate::types::*;
use crate::utils::{current_timestamp, normalize_text};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// How a submitted answer was graded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Grade {
    Exact,
    Partial,
    Miss,
    /// The question has no recorded answer to compare against
    Ungraded,
}

impl Grade {
    pub fn as_str(&self) -> &'static str {
        match self {
            Grade::Exact => "exact",
            Grade::Partial => "partial",
            Grade::Miss => "miss",
            Grade::Ungraded => "ungraded",
        }
    }
}

/// Grade `submitted` against the question's recorded answer
pub fn grade(question: &ContestQuestion, submitted: &str) -> (Grade, u32) {
    let correct = match question.correct_answer.as_deref().map(normalize_text) {
        Some(correct) if !correct.is_empty() => correct,
        _ => return (Grade::Ungraded, 0),
    };
    let submitted = normalize_text(submitted);

    if submitted.is_empty() {
        (Grade::Miss, 0)
    } else if submitted == correct {
        (Grade::Exact, question.points)
    } else if correct.contains(&submitted) || submitted.contains(&correct) {
        (Grade::Partial, question.points / 2)
    } else {
        (Grade::Miss, 0)
    }
}

/// What the answering member is told after submitting
#[derive(Debug, Clone, Serialize)]
pub struct AnswerReceipt {
    pub question_id: QuestionId,
    pub grade: Grade,
    pub points_awarded: u32,
    pub is_correct: bool,
    pub correct_answer: Option<String>,
}

/// Grades answers and records them in the member's slot
pub struct AnswerScorer {
    contests: Arc<dyn ContestRepository>,
    relationships: Arc<dyn RelationshipRepository>,
}

impl AnswerScorer {
    pub fn new(
        contests: Arc<dyn ContestRepository>,
        relationships: Arc<dyn RelationshipRepository>,
    ) -> Self {
        Self {
            contests,
            relationships,
        }
    }

    /// Grade and store `answer`; a repeat submission replaces the earlier one
    pub async fn submit(
        &self,
        question_id: QuestionId,
        user_id: &str,
        answer: &str,
    ) -> Result<AnswerReceipt> {
        let question = self
            .contests
            .get_question(question_id)
            .await?
            .ok_or_else(|| BondError::not_found("question", question_id))?;
        let contest = self
            .contests
            .get_contest(question.contest_id)
            .await?
            .ok_or_else(|| BondError::not_found("contest", question.contest_id))?;
        if contest.status == ContestStatus::Completed {
            return Err(BondError::conflict("contest already completed"));
        }
        let relationship = self
            .relationships
            .get_relationship(contest.relationship_id)
            .await?
            .ok_or_else(|| BondError::not_found("relationship", contest.relationship_id))?;
        let slot = relationship.slot_of(user_id).ok_or_else(|| {
            BondError::validation(format!("user {} is not part of this contest", user_id))
        })?;

        let (grade, points) = grade(&question, answer);
        self.contests
            .record_answer(
                question_id,
                slot,
                AnswerRecord {
                    answer: answer.to_string(),
                    answered_at: current_timestamp(),
                    points,
                },
            )
            .await?;

        debug!(
            "User {} answered question {}: {} ({} points)",
            user_id,
            question_id,
            grade.as_str(),
            points
        );

        Ok(AnswerReceipt {
            question_id,
            grade,
            points_awarded: points,
            is_correct: grade == Grade::Exact,
            correct_answer: question.correct_answer.as_deref().map(normalize_text),
        })
    }
}
