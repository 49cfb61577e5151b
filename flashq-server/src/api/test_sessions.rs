//! Test session endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use flashq_common::models::{AnswerView, SessionSummary, TestSession};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::{auth::AuthUser, parse_id};
use crate::error::ApiResult;
use crate::sessions::NewSession;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub course_slug: String,
    #[serde(default)]
    pub module_ids: Vec<i64>,
    #[serde(default)]
    pub shuffle: bool,
}

#[derive(Debug, Serialize)]
pub struct SessionDetail {
    #[serde(flatten)]
    pub session: TestSession,
    pub answers: Vec<AnswerView>,
}

#[derive(Debug, Serialize)]
pub struct RetryResponse {
    pub session_id: Uuid,
    pub status: String,
}

/// POST /api/test-sessions
pub async fn create_session(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(request): Json<CreateSessionRequest>,
) -> ApiResult<(StatusCode, Json<TestSession>)> {
    let session = state
        .sessions
        .create_session(
            user_id,
            NewSession {
                course_slug: request.course_slug,
                module_ids: request.module_ids,
                shuffle: request.shuffle,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(session)))
}

/// GET /api/test-sessions
///
/// The caller's sessions, newest first.
pub async fn list_sessions(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> ApiResult<Json<Vec<SessionSummary>>> {
    Ok(Json(state.sessions.list_sessions(user_id).await?))
}

/// GET /api/test-sessions/:id
pub async fn get_session(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<SessionDetail>> {
    let id = parse_id(&id)?;
    let (session, answers) = state.sessions.get_session(id, user_id).await?;
    Ok(Json(SessionDetail { session, answers }))
}

/// POST /api/test-sessions/:id/recommendation
///
/// Start another generation attempt for a closed session that has no
/// recommendation. Output arrives on the event stream.
pub async fn retry_recommendation(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<(StatusCode, Json<RetryResponse>)> {
    let id = parse_id(&id)?;
    state.sessions.jobs().retry(id, user_id).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(RetryResponse {
            session_id: id,
            status: "started".to_string(),
        }),
    ))
}
