//! Read-only catalog: courses, modules and active cards

use axum::{
    extract::{Query, State},
    Json,
};
use flashq_common::models::{Card, Course, Module};
use serde::Deserialize;

use crate::api::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CourseQuery {
    pub course_slug: String,
}

/// GET /api/courses
pub async fn list_courses(
    State(state): State<AppState>,
    _user: AuthUser,
) -> ApiResult<Json<Vec<Course>>> {
    Ok(Json(state.repo.list_courses().await?))
}

/// GET /api/modules?course_slug=
pub async fn list_modules(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(query): Query<CourseQuery>,
) -> ApiResult<Json<Vec<Module>>> {
    let course = find_course(&state, &query.course_slug).await?;
    Ok(Json(state.repo.list_modules(course.id).await?))
}

/// GET /api/cards?course_slug=
///
/// Active cards of the course ordered by uid.
pub async fn list_cards(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(query): Query<CourseQuery>,
) -> ApiResult<Json<Vec<Card>>> {
    let course = find_course(&state, &query.course_slug).await?;
    Ok(Json(state.repo.list_active_cards(course.id).await?))
}

async fn find_course(state: &AppState, slug: &str) -> ApiResult<Course> {
    state
        .repo
        .find_course_by_slug(slug)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("course {}", slug)))
}
