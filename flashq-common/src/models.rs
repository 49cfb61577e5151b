//! Domain models shared by the storage layer, the engines and the HTTP API

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::Error;

/// Identity of an authenticated user, assigned by the upstream auth layer
pub type UserId = i64;

/// Course (external key: slug)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub id: i64,
    pub slug: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Module (external key: name)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One stored version of a card
///
/// Rows are append-only: a content change inserts a new row and flips the
/// previous one to `is_active = false`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub id: i64,
    pub uid: i64,
    pub hash: String,
    pub question: String,
    pub answer: String,
    pub tags: Vec<String>,
    pub module_id: i64,
    pub course_id: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Card definition as read from the content source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardDefinition {
    pub uid: i64,
    pub module_name: String,
    pub course_slug: String,
    /// Display name used when the course has to be created
    #[serde(default)]
    pub course_name: Option<String>,
    pub question: String,
    pub answer_body: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl CardDefinition {
    /// Content hash over the defining fields
    pub fn content_hash(&self) -> String {
        crate::hash::content_hash(
            &self.module_name,
            &self.course_slug,
            &self.question,
            &self.answer_body,
            &self.tags,
        )
    }
}

/// Resolution state of one card inside a test session
///
/// `Null` is the only non-terminal state; it moves exactly once to
/// `Remember` or `Forgot`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerStatus {
    Null,
    Remember,
    Forgot,
}

impl AnswerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnswerStatus::Null => "null",
            AnswerStatus::Remember => "remember",
            AnswerStatus::Forgot => "forgot",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, AnswerStatus::Null)
    }

    /// Human-readable resolution used in generated prompts
    pub fn condition(&self) -> &'static str {
        match self {
            AnswerStatus::Null => "Not answered",
            AnswerStatus::Remember => "Remembered",
            AnswerStatus::Forgot => "Forgot",
        }
    }
}

impl fmt::Display for AnswerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnswerStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "null" => Ok(AnswerStatus::Null),
            "remember" => Ok(AnswerStatus::Remember),
            "forgot" => Ok(AnswerStatus::Forgot),
            other => Err(Error::InvalidInput(format!(
                "unknown user answer status: {}",
                other
            ))),
        }
    }
}

/// Test session owned by one user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestSession {
    pub id: Uuid,
    pub user_id: UserId,
    pub course_id: i64,
    pub module_ids: Vec<i64>,
    pub is_shuffled: bool,
    pub is_active: bool,
    pub recommendation: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One card's answer slot inside a test session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAnswer {
    pub id: Uuid,
    pub card_id: i64,
    pub test_session_id: Uuid,
    /// Presentation order inside the session
    pub position: i64,
    pub status: AnswerStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Answer joined with the card it refers to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerView {
    #[serde(flatten)]
    pub answer: UserAnswer,
    pub uid: i64,
    pub question: String,
    pub answer_body: String,
    pub module_id: i64,
    pub module_name: String,
}

/// Per-session counters for the history listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: Uuid,
    pub is_active: bool,
    pub is_shuffled: bool,
    pub module_ids: Vec<i64>,
    pub has_recommendation: bool,
    pub count_null: i64,
    pub count_remember: i64,
    pub count_forgot: i64,
    pub course_name: String,
    pub created_at: DateTime<Utc>,
}

/// Leaderboard row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub user_id: UserId,
    pub remember_count: i64,
    pub forgot_count: i64,
    pub answered_count: i64,
    pub started_sessions: i64,
}

/// Audit record of one successful recommendation generation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendationRecord {
    pub id: Uuid,
    pub test_session_id: Uuid,
    pub model: String,
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub total_tokens: i64,
    pub generated_at: DateTime<Utc>,
}
