//! Leaderboard and metrics

use axum::{
    extract::{Query, State},
    Json,
};
use flashq_common::models::LeaderboardEntry;
use serde::Deserialize;

use crate::api::auth::AuthUser;
use crate::error::ApiResult;
use crate::metrics::MetricsSnapshot;
use crate::AppState;

const DEFAULT_LEADERBOARD_LIMIT: i64 = 20;
const MAX_LEADERBOARD_LIMIT: i64 = 100;

#[derive(Debug, Deserialize)]
pub struct LeaderboardQuery {
    pub limit: Option<i64>,
}

/// GET /api/leaderboard?limit=
pub async fn leaderboard(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(query): Query<LeaderboardQuery>,
) -> ApiResult<Json<Vec<LeaderboardEntry>>> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_LEADERBOARD_LIMIT)
        .clamp(1, MAX_LEADERBOARD_LIMIT);
    Ok(Json(state.repo.leaderboard(limit).await?))
}

/// GET /api/metrics
pub async fn metrics(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}
