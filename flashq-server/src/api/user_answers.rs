//! Answer resolution endpoint

use axum::{
    extract::{Path, State},
    Json,
};
use flashq_common::models::{TestSession, UserAnswer};
use flashq_common::AnswerStatus;
use serde::{Deserialize, Serialize};

use crate::api::{auth::AuthUser, parse_id};
use crate::error::ApiResult;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct UpdateAnswerRequest {
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct UpdateAnswerResponse {
    pub answer: UserAnswer,
    pub session: TestSession,
}

/// PATCH /api/user-answers/:id
///
/// Body: `{"status": "remember" | "forgot"}`. Resolving the last open answer
/// closes the session and starts recommendation generation.
pub async fn update_answer(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<String>,
    Json(request): Json<UpdateAnswerRequest>,
) -> ApiResult<Json<UpdateAnswerResponse>> {
    let id = parse_id(&id)?;
    let status: AnswerStatus = request.status.parse()?;

    let update = state.sessions.update_answer(id, user_id, status).await?;

    Ok(Json(UpdateAnswerResponse {
        answer: update.answer,
        session: update.session,
    }))
}
