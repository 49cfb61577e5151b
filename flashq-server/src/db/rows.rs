//! Row decoding helpers

use flashq_common::models::{
    AnswerView, Card, Course, LeaderboardEntry, Module, RecommendationRecord, SessionSummary,
    TestSession, UserAnswer,
};
use flashq_common::{AnswerStatus, Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

pub(crate) const CARD_COLUMNS: &str =
    "id, uid, hash, question, answer, tags, module_id, course_id, is_active, created_at, updated_at";

pub(crate) const SESSION_COLUMNS: &str =
    "id, user_id, course_id, module_ids, is_shuffled, is_active, recommendation, created_at, updated_at";

pub(crate) const ANSWER_COLUMNS: &str =
    "id, card_id, test_session_id, position, status, created_at, updated_at";

/// Answer columns prefixed for joins against cards (c) and modules (m)
pub(crate) const ANSWER_VIEW_SELECT: &str = r#"
    SELECT ua.id, ua.card_id, ua.test_session_id, ua.position, ua.status,
           ua.created_at, ua.updated_at,
           c.uid, c.question, c.answer AS answer_body, c.module_id, m.name AS module_name
    FROM user_answers ua
    JOIN cards c ON c.id = ua.card_id
    JOIN modules m ON m.id = c.module_id
"#;

pub(crate) fn parse_uuid(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value)
        .map_err(|e| Error::Internal(format!("Invalid UUID in database '{}': {}", value, e)))
}

pub(crate) fn course_from_row(row: &SqliteRow) -> Result<Course> {
    Ok(Course {
        id: row.try_get("id")?,
        slug: row.try_get("slug")?,
        name: row.try_get("name")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub(crate) fn module_from_row(row: &SqliteRow) -> Result<Module> {
    Ok(Module {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub(crate) fn card_from_row(row: &SqliteRow) -> Result<Card> {
    let tags: String = row.try_get("tags")?;
    Ok(Card {
        id: row.try_get("id")?,
        uid: row.try_get("uid")?,
        hash: row.try_get("hash")?,
        question: row.try_get("question")?,
        answer: row.try_get("answer")?,
        tags: serde_json::from_str(&tags)?,
        module_id: row.try_get("module_id")?,
        course_id: row.try_get("course_id")?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub(crate) fn session_from_row(row: &SqliteRow) -> Result<TestSession> {
    let id: String = row.try_get("id")?;
    let module_ids: String = row.try_get("module_ids")?;
    Ok(TestSession {
        id: parse_uuid(&id)?,
        user_id: row.try_get("user_id")?,
        course_id: row.try_get("course_id")?,
        module_ids: serde_json::from_str(&module_ids)?,
        is_shuffled: row.try_get("is_shuffled")?,
        is_active: row.try_get("is_active")?,
        recommendation: row.try_get("recommendation")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub(crate) fn answer_from_row(row: &SqliteRow) -> Result<UserAnswer> {
    let id: String = row.try_get("id")?;
    let session_id: String = row.try_get("test_session_id")?;
    let status: String = row.try_get("status")?;
    Ok(UserAnswer {
        id: parse_uuid(&id)?,
        card_id: row.try_get("card_id")?,
        test_session_id: parse_uuid(&session_id)?,
        position: row.try_get("position")?,
        status: status.parse::<AnswerStatus>()?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub(crate) fn answer_view_from_row(row: &SqliteRow) -> Result<AnswerView> {
    Ok(AnswerView {
        answer: answer_from_row(row)?,
        uid: row.try_get("uid")?,
        question: row.try_get("question")?,
        answer_body: row.try_get("answer_body")?,
        module_id: row.try_get("module_id")?,
        module_name: row.try_get("module_name")?,
    })
}

pub(crate) fn summary_from_row(row: &SqliteRow) -> Result<SessionSummary> {
    let id: String = row.try_get("id")?;
    let module_ids: String = row.try_get("module_ids")?;
    Ok(SessionSummary {
        id: parse_uuid(&id)?,
        is_active: row.try_get("is_active")?,
        is_shuffled: row.try_get("is_shuffled")?,
        module_ids: serde_json::from_str(&module_ids)?,
        has_recommendation: row.try_get("has_recommendation")?,
        count_null: row.try_get("count_null")?,
        count_remember: row.try_get("count_remember")?,
        count_forgot: row.try_get("count_forgot")?,
        course_name: row.try_get("course_name")?,
        created_at: row.try_get("created_at")?,
    })
}

pub(crate) fn leaderboard_from_row(row: &SqliteRow) -> Result<LeaderboardEntry> {
    Ok(LeaderboardEntry {
        user_id: row.try_get("user_id")?,
        remember_count: row.try_get("remember_count")?,
        forgot_count: row.try_get("forgot_count")?,
        answered_count: row.try_get("answered_count")?,
        started_sessions: row.try_get("started_sessions")?,
    })
}

pub(crate) fn record_from_row(row: &SqliteRow) -> Result<RecommendationRecord> {
    let id: String = row.try_get("id")?;
    let session_id: String = row.try_get("test_session_id")?;
    Ok(RecommendationRecord {
        id: parse_uuid(&id)?,
        test_session_id: parse_uuid(&session_id)?,
        model: row.try_get("model")?,
        prompt_tokens: row.try_get("prompt_tokens")?,
        completion_tokens: row.try_get("completion_tokens")?,
        total_tokens: row.try_get("total_tokens")?,
        generated_at: row.try_get("generated_at")?,
    })
}
