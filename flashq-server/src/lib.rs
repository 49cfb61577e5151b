//! flashq-server library
//!
//! Flashcard quiz service: versioned card content, test sessions with
//! exactly-once answers, and streamed recommendation feedback.

use axum::Router;
use flashq_common::EventBus;
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod config;
pub mod content;
pub mod db;
pub mod error;
pub mod generation;
pub mod metrics;
pub mod recommendation;
pub mod sessions;

use db::Repository;
use generation::Generator;
use metrics::Metrics;
use recommendation::RecommendationJobs;
use sessions::SessionEngine;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub repo: Repository,
    pub sessions: SessionEngine,
    pub events: EventBus,
    pub metrics: Arc<Metrics>,
    /// Fired on shutdown; observed by event streams and recommendation jobs
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Wire the services together
    ///
    /// `generator` is `None` when recommendation generation is disabled.
    pub fn new(
        pool: SqlitePool,
        generator: Option<Arc<dyn Generator>>,
        event_queue_capacity: usize,
        shutdown: CancellationToken,
    ) -> Self {
        let repo = Repository::new(pool);
        let events = EventBus::new(event_queue_capacity);
        let metrics = Arc::new(Metrics::new());
        let jobs = RecommendationJobs::new(
            repo.clone(),
            generator,
            events.clone(),
            metrics.clone(),
            shutdown.clone(),
        );
        let sessions = SessionEngine::new(repo.clone(), jobs, metrics.clone());

        Self {
            repo,
            sessions,
            events,
            metrics,
            shutdown,
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::middleware;
    use axum::routing::{get, patch, post};

    let api = Router::new()
        .route("/api/courses", get(api::list_courses))
        .route("/api/modules", get(api::list_modules))
        .route("/api/cards", get(api::list_cards))
        .route(
            "/api/test-sessions",
            get(api::list_sessions).post(api::create_session),
        )
        .route("/api/test-sessions/:id", get(api::get_session))
        .route(
            "/api/test-sessions/:id/recommendation",
            post(api::retry_recommendation),
        )
        .route("/api/user-answers/:id", patch(api::update_answer))
        .route("/api/events", get(api::event_stream))
        .route("/api/leaderboard", get(api::leaderboard))
        .route("/api/metrics", get(api::metrics));

    Router::new()
        .merge(api)
        .merge(api::health_routes())
        .layer(middleware::from_fn_with_state(
            state.metrics.clone(),
            metrics::track_responses,
        ))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
