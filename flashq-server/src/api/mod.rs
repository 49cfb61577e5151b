//! HTTP API handlers for flashq-server

pub mod auth;
pub mod catalog;
pub mod events;
pub mod health;
pub mod stats;
pub mod test_sessions;
pub mod user_answers;

pub use auth::AuthUser;
pub use catalog::{list_cards, list_courses, list_modules};
pub use events::event_stream;
pub use health::health_routes;
pub use stats::{leaderboard, metrics};
pub use test_sessions::{create_session, get_session, list_sessions, retry_recommendation};
pub use user_answers::update_answer;

use flashq_common::uuid_utils;
use uuid::Uuid;

use crate::error::ApiError;

/// Parse a path id, rejecting malformed values with 400
pub(crate) fn parse_id(value: &str) -> Result<Uuid, ApiError> {
    uuid_utils::parse(value).map_err(|_| ApiError::BadRequest(format!("invalid id: {}", value)))
}
