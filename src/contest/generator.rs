//! Contest generation from unused facts plus a template pool

use crate::config::ContestSettings;
use crate::error::{BondError, Result};
use crate::storage::{ContestRepository, FactRepository, ProfileRepository, RelationshipRepository};
use crate::types::*;
use crate::utils::{current_timestamp, generate_id, RandomSource};
use chrono::Duration;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Categories with a question template, in pool order
pub const TEMPLATE_POOL: [FactCategory; 12] = [
    FactCategory::FavoriteFood,
    FactCategory::FavoriteColor,
    FactCategory::Hobby,
    FactCategory::Fear,
    FactCategory::Dream,
    FactCategory::Pet,
    FactCategory::FavoriteMovie,
    FactCategory::FavoriteMusic,
    FactCategory::FavoritePlace,
    FactCategory::Achievement,
    FactCategory::CulturalTradition,
    FactCategory::DailyRoutine,
];

const FALLBACK_NAME_A: &str = "Partner A";
const FALLBACK_NAME_B: &str = "Partner B";

/// Question template for a category; `{name}` is the subject's display name
pub fn question_template(category: FactCategory) -> Option<&'static str> {
    let template = match category {
        FactCategory::FavoriteFood => "What is {name}'s favorite food?",
        FactCategory::FavoriteColor => "What is {name}'s favorite color?",
        FactCategory::Hobby => "What is {name}'s biggest hobby?",
        FactCategory::Fear => "What was {name}'s childhood fear?",
        FactCategory::Dream => "What is {name}'s biggest dream?",
        FactCategory::Pet => "Does {name} have any pets? If so, what kind?",
        FactCategory::FavoriteMovie => "What is {name}'s favorite movie or show?",
        FactCategory::FavoriteMusic => "What kind of music does {name} like most?",
        FactCategory::FavoritePlace => "What is {name}'s favorite place to visit?",
        FactCategory::Achievement => "What is {name}'s proudest achievement?",
        FactCategory::CulturalTradition => "What cultural tradition is important to {name}?",
        FactCategory::DailyRoutine => "What does {name} usually do on weekends?",
        FactCategory::FamilyDetail => return None,
    };
    Some(template)
}

/// Render the question text for a category about `name`
pub fn render_question(category: FactCategory, name: &str) -> String {
    match question_template(category) {
        Some(template) => template.replace("{name}", name),
        None => format!("What did {} mention about their {}?", name, category),
    }
}

pub fn contest_title(contest_type: ContestType) -> &'static str {
    match contest_type {
        ContestType::Weekly => "Weekly Bond Challenge",
        ContestType::Daily => "Daily Bond Challenge",
    }
}

/// A freshly created contest with its questions in order
#[derive(Debug, Clone, Serialize)]
pub struct GeneratedContest {
    pub contest: Contest,
    pub questions: Vec<ContestQuestion>,
}

impl GeneratedContest {
    /// Number of questions backed by a recorded fact
    pub fn fact_question_count(&self) -> usize {
        self.questions
            .iter()
            .filter(|q| q.correct_answer.is_some())
            .count()
    }
}

struct Members {
    a: (UserId, String),
    b: (UserId, String),
}

impl Members {
    fn name_of(&self, user_id: &str) -> &str {
        if self.a.0 == user_id {
            &self.a.1
        } else {
            &self.b.1
        }
    }
}

/// Builds fixed-size quizzes for a relationship
pub struct ContestGenerator {
    relationships: Arc<dyn RelationshipRepository>,
    profiles: Arc<dyn ProfileRepository>,
    facts: Arc<dyn FactRepository>,
    contests: Arc<dyn ContestRepository>,
    rng: Arc<RandomSource>,
    settings: ContestSettings,
}

impl ContestGenerator {
    pub fn new(
        relationships: Arc<dyn RelationshipRepository>,
        profiles: Arc<dyn ProfileRepository>,
        facts: Arc<dyn FactRepository>,
        contests: Arc<dyn ContestRepository>,
        rng: Arc<RandomSource>,
        settings: ContestSettings,
    ) -> Self {
        Self {
            relationships,
            profiles,
            facts,
            contests,
            rng,
            settings,
        }
    }

    async fn display_name(&self, user_id: &str, fallback: &str) -> Result<String> {
        Ok(self
            .profiles
            .get_profile(user_id)
            .await?
            .map(|profile| profile.display_name)
            .unwrap_or_else(|| fallback.to_string()))
    }

    /// Create a contest for `relationship_id`.
    ///
    /// Facts consumed by a concurrent generation make the write conflict;
    /// the facts are then re-read and the draft rebuilt.
    pub async fn generate(
        &self,
        relationship_id: RelationshipId,
        contest_type: ContestType,
    ) -> Result<GeneratedContest> {
        let relationship = self
            .relationships
            .get_relationship(relationship_id)
            .await?
            .ok_or_else(|| BondError::not_found("relationship", relationship_id))?;

        let members = Members {
            a: (
                relationship.user_a_id.clone(),
                self.display_name(&relationship.user_a_id, FALLBACK_NAME_A)
                    .await?,
            ),
            b: (
                relationship.user_b_id.clone(),
                self.display_name(&relationship.user_b_id, FALLBACK_NAME_B)
                    .await?,
            ),
        };

        let mut last_conflict = None;
        for attempt in 1..=self.settings.max_generation_attempts {
            let mut facts = self
                .facts
                .unused_facts(&members.a.0, relationship_id)
                .await?;
            facts.extend(
                self.facts
                    .unused_facts(&members.b.0, relationship_id)
                    .await?,
            );

            let draft = self.draft(&relationship, &members, contest_type, &facts);
            // Fact-backed questions are always the leading ones
            let consumed: Vec<FactId> = facts
                .iter()
                .take(draft.fact_question_count())
                .map(|fact| fact.id)
                .collect();

            match self
                .contests
                .create_contest(draft.contest.clone(), draft.questions.clone(), &consumed)
                .await
            {
                Ok(contest) => {
                    info!(
                        "Created {} contest {} for relationship {} ({} of {} questions from facts)",
                        contest_type,
                        contest.id,
                        relationship_id,
                        consumed.len(),
                        draft.questions.len()
                    );
                    return Ok(GeneratedContest {
                        contest,
                        questions: draft.questions,
                    });
                }
                Err(BondError::Conflict { reason }) => {
                    warn!(
                        "Contest generation attempt {} for relationship {} conflicted: {}",
                        attempt, relationship_id, reason
                    );
                    last_conflict = Some(reason);
                }
                Err(e) => return Err(e),
            }
        }

        Err(BondError::conflict(format!(
            "could not claim facts for relationship {}: {}",
            relationship_id,
            last_conflict.unwrap_or_else(|| "no attempts made".to_string())
        )))
    }

    /// Build the contest and questions without writing anything
    fn draft(
        &self,
        relationship: &Relationship,
        members: &Members,
        contest_type: ContestType,
        facts: &[Fact],
    ) -> GeneratedContest {
        let num_questions = self.settings.question_count(contest_type) as usize;
        let time_limit = self.settings.time_limit_minutes(contest_type);
        let points = self.settings.points_per_question;
        let started_at = current_timestamp();

        let contest = Contest {
            id: generate_id(),
            relationship_id: relationship.id,
            contest_type,
            title: contest_title(contest_type).to_string(),
            status: ContestStatus::Active,
            time_limit_minutes: time_limit,
            max_points: self.settings.max_points(contest_type),
            started_at,
            ends_at: started_at + Duration::minutes(i64::from(time_limit)),
            completed_at: None,
            user_a_score: 0,
            user_b_score: 0,
            total_score: 0,
            is_synchronized: false,
            bond_points_awarded: 0,
        };

        let mut questions = Vec::with_capacity(num_questions);
        let mut used_categories = HashSet::new();

        for fact in facts.iter().take(num_questions) {
            questions.push(ContestQuestion {
                id: generate_id(),
                contest_id: contest.id,
                question_text: render_question(fact.category, members.name_of(&fact.user_id)),
                question_about_user: fact.user_id.clone(),
                correct_answer: Some(fact.value.clone()),
                confidence: Some(fact.confidence),
                points,
                question_order: questions.len() as u32,
                user_a_answer: None,
                user_b_answer: None,
            });
            used_categories.insert(fact.category);
        }

        let remaining = num_questions - questions.len();
        if remaining > 0 {
            let mut available: Vec<FactCategory> = TEMPLATE_POOL
                .iter()
                .copied()
                .filter(|category| !used_categories.contains(category))
                .collect();
            self.rng.shuffle(&mut available);

            let both = [&members.a.0, &members.b.0];
            for category in available.into_iter().take(remaining) {
                let about = match self.rng.choose(&both) {
                    Some(user) => (*user).clone(),
                    None => members.a.0.clone(),
                };
                questions.push(ContestQuestion {
                    id: generate_id(),
                    contest_id: contest.id,
                    question_text: render_question(category, members.name_of(&about)),
                    question_about_user: about,
                    correct_answer: None,
                    confidence: None,
                    points,
                    question_order: questions.len() as u32,
                    user_a_answer: None,
                    user_b_answer: None,
                });
            }
            debug!(
                "Filled {} open questions for relationship {}",
                remaining, relationship.id
            );
        }

        GeneratedContest { contest, questions }
    }
}
