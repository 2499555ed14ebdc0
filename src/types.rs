//! Common types used throughout the bonding engine

use crate::matching::roles::Role;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for users (owned by the identity service)
pub type UserId = String;

/// Identifier of the chat message a fact was extracted from
pub type MessageId = String;

/// Unique identifier for matching queue entries
pub type EntryId = Uuid;

/// Unique identifier for relationships
pub type RelationshipId = Uuid;

/// Unique identifier for extracted facts
pub type FactId = Uuid;

/// Unique identifier for contests
pub type ContestId = Uuid;

/// Unique identifier for contest questions
pub type QuestionId = Uuid;

/// How a searcher wants languages weighed against a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LanguagePriority {
    /// Prefer partners who already speak the same languages
    #[default]
    Ease,
    /// Prefer partners who speak languages the searcher does not
    Learning,
}

/// Lifecycle of a matching queue entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    Searching,
    Matched,
    Cancelled,
}

impl QueueStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, QueueStatus::Searching)
    }
}

/// Inclusive age range a searcher would accept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgeRange {
    pub min: u8,
    pub max: u8,
}

impl Default for AgeRange {
    fn default() -> Self {
        Self { min: 13, max: 99 }
    }
}

/// What a user submits when entering the matching queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchCriteria {
    pub seeking_role: Role,
    pub offering_role: Role,
    #[serde(default)]
    pub preferred_age_range: AgeRange,
    #[serde(default)]
    pub preferred_countries: Vec<String>,
    #[serde(default)]
    pub language_priority: LanguagePriority,
}

impl SearchCriteria {
    pub fn new(seeking_role: Role, offering_role: Role) -> Self {
        Self {
            seeking_role,
            offering_role,
            preferred_age_range: AgeRange::default(),
            preferred_countries: Vec::new(),
            language_priority: LanguagePriority::default(),
        }
    }

    pub fn with_language_priority(mut self, priority: LanguagePriority) -> Self {
        self.language_priority = priority;
        self
    }
}

/// A stored matching queue row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchRequest {
    pub id: EntryId,
    pub user_id: UserId,
    pub seeking_role: Role,
    pub offering_role: Role,
    pub preferred_age_range: AgeRange,
    pub preferred_countries: Vec<String>,
    pub language_priority: LanguagePriority,
    pub status: QueueStatus,
    pub matched_with: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub matched_at: Option<DateTime<Utc>>,
}

/// Receipt handed back when a search request is queued
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueTicket {
    pub entry_id: EntryId,
    pub user_id: UserId,
    pub queue_position: usize,
    /// Earlier searching entries of the same user that this request superseded
    pub cancelled_entries: Vec<EntryId>,
}

/// Matching preferences stored on a profile
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchingPreferences {
    #[serde(default)]
    pub language_priority: LanguagePriority,
}

/// The slice of a user profile the engine reads
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: UserId,
    pub display_name: String,
    pub is_verified: bool,
    pub is_banned: bool,
    pub care_score: u32,
    /// Absent for users without enough history; scored as 100
    pub reliability_score: Option<u32>,
    pub country: Option<String>,
    #[serde(default)]
    pub matching_preferences: MatchingPreferences,
}

impl Profile {
    pub fn new(user_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
            is_verified: false,
            is_banned: false,
            care_score: 0,
            reliability_score: None,
            country: None,
            matching_preferences: MatchingPreferences::default(),
        }
    }
}

/// Lifecycle of a bonded pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationshipStatus {
    Active,
    Paused,
    Ended,
}

/// Which side of a relationship a user sits on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemberSlot {
    A,
    B,
}

/// A long-running bond between two matched users
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    pub id: RelationshipId,
    pub user_a_id: UserId,
    pub user_b_id: UserId,
    pub user_a_role: Role,
    pub user_b_role: Role,
    pub status: RelationshipStatus,
    pub level: u32,
    pub bond_points: u64,
    pub care_score: u32,
    pub contests_completed: u32,
    pub contests_won: u32,
    pub matched_at: DateTime<Utc>,
}

impl Relationship {
    /// Slot of `user_id` in this relationship, if they are a member
    pub fn slot_of(&self, user_id: &str) -> Option<MemberSlot> {
        if self.user_a_id == user_id {
            Some(MemberSlot::A)
        } else if self.user_b_id == user_id {
            Some(MemberSlot::B)
        } else {
            None
        }
    }

    pub fn partner_of(&self, user_id: &str) -> Option<&UserId> {
        match self.slot_of(user_id)? {
            MemberSlot::A => Some(&self.user_b_id),
            MemberSlot::B => Some(&self.user_a_id),
        }
    }

    /// True if this relationship joins exactly these two users, in either order
    pub fn pairs(&self, first: &str, second: &str) -> bool {
        (self.user_a_id == first && self.user_b_id == second)
            || (self.user_a_id == second && self.user_b_id == first)
    }

    pub fn is_active(&self) -> bool {
        self.status == RelationshipStatus::Active
    }

    pub fn member_ids(&self) -> [&UserId; 2] {
        [&self.user_a_id, &self.user_b_id]
    }
}

/// Kinds of moments recorded on a relationship's timeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MilestoneKind {
    Matched,
}

/// A moment on a relationship's timeline.
///
/// `bond_points_awarded` is what the moment is worth on display; it is not
/// added to the relationship's bond points.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Milestone {
    pub id: Uuid,
    pub relationship_id: RelationshipId,
    pub kind: MilestoneKind,
    pub title: String,
    pub description: String,
    pub bond_points_awarded: u32,
    pub achieved_at: DateTime<Utc>,
}

/// Categories of personal facts harvested from chat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactCategory {
    FavoriteFood,
    FavoriteColor,
    Hobby,
    FavoriteMovie,
    FavoriteMusic,
    FavoritePlace,
    Pet,
    FamilyDetail,
    Fear,
    Dream,
    CulturalTradition,
    DailyRoutine,
    Achievement,
}

impl FactCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FactCategory::FavoriteFood => "favorite_food",
            FactCategory::FavoriteColor => "favorite_color",
            FactCategory::Hobby => "hobby",
            FactCategory::FavoriteMovie => "favorite_movie",
            FactCategory::FavoriteMusic => "favorite_music",
            FactCategory::FavoritePlace => "favorite_place",
            FactCategory::Pet => "pet",
            FactCategory::FamilyDetail => "family_detail",
            FactCategory::Fear => "fear",
            FactCategory::Dream => "dream",
            FactCategory::CulturalTradition => "cultural_tradition",
            FactCategory::DailyRoutine => "daily_routine",
            FactCategory::Achievement => "achievement",
        }
    }
}

impl std::fmt::Display for FactCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A personal detail pulled out of a chat message, scoped to one relationship
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fact {
    pub id: FactId,
    pub user_id: UserId,
    pub relationship_id: RelationshipId,
    pub source_message_id: MessageId,
    pub category: FactCategory,
    pub value: String,
    pub confidence: f32,
    pub used_in_contest: bool,
    pub created_at: DateTime<Utc>,
}

/// Contest cadence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContestType {
    Weekly,
    Daily,
}

impl std::fmt::Display for ContestType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContestType::Weekly => write!(f, "weekly"),
            ContestType::Daily => write!(f, "daily"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContestStatus {
    Active,
    Completed,
}

/// A quiz played by both members of a relationship
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contest {
    pub id: ContestId,
    pub relationship_id: RelationshipId,
    pub contest_type: ContestType,
    pub title: String,
    pub status: ContestStatus,
    pub time_limit_minutes: u32,
    pub max_points: u32,
    pub started_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub user_a_score: u32,
    pub user_b_score: u32,
    pub total_score: u32,
    pub is_synchronized: bool,
    pub bond_points_awarded: u32,
}

/// One member's answer to a question
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub answer: String,
    pub answered_at: DateTime<Utc>,
    pub points: u32,
}

/// A single quiz question about one member
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContestQuestion {
    pub id: QuestionId,
    pub contest_id: ContestId,
    pub question_text: String,
    pub question_about_user: UserId,
    /// Absent for open-ended filler questions
    pub correct_answer: Option<String>,
    pub confidence: Option<f32>,
    pub points: u32,
    pub question_order: u32,
    pub user_a_answer: Option<AnswerRecord>,
    pub user_b_answer: Option<AnswerRecord>,
}

impl ContestQuestion {
    pub fn points_for(&self, slot: MemberSlot) -> u32 {
        let record = match slot {
            MemberSlot::A => &self.user_a_answer,
            MemberSlot::B => &self.user_b_answer,
        };
        record.as_ref().map(|r| r.points).unwrap_or(0)
    }

    /// This question as the member in `viewer` may see it. The answer key
    /// and the partner's answer stay hidden until `revealed`.
    pub fn view_for(&self, viewer: MemberSlot, revealed: bool) -> QuestionView {
        let (own, partner) = match viewer {
            MemberSlot::A => (&self.user_a_answer, &self.user_b_answer),
            MemberSlot::B => (&self.user_b_answer, &self.user_a_answer),
        };
        QuestionView {
            id: self.id,
            question_text: self.question_text.clone(),
            question_about_user: self.question_about_user.clone(),
            points: self.points,
            question_order: self.question_order,
            your_answer: own.clone(),
            partner_answer: partner.clone().filter(|_| revealed),
            correct_answer: self.correct_answer.clone().filter(|_| revealed),
        }
    }
}

/// A contest question shown to one member
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionView {
    pub id: QuestionId,
    pub question_text: String,
    pub question_about_user: UserId,
    pub points: u32,
    pub question_order: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub your_answer: Option<AnswerRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partner_answer: Option<AnswerRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correct_answer: Option<String>,
}

/// Kinds of notification the engine asks the delivery layer to send
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    NewMatch,
    NewMessage,
    ContestStarted,
    ContestCompleted,
}

/// A notification handed to the delivery layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub user_id: UserId,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub data: serde_json::Value,
}

impl Notification {
    pub fn new(
        user_id: impl Into<String>,
        kind: NotificationKind,
        title: impl Into<String>,
        body: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            kind,
            title: title.into(),
            body: body.into(),
            data,
        }
    }
}
