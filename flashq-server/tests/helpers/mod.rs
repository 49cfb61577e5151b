//! Shared fixtures for flashq-server integration tests
#![allow(dead_code)]

use flashq_common::models::{CardDefinition, TestSession};
use flashq_common::UserId;
use flashq_server::content::ingest;
use flashq_server::db::{init_database, Repository};
use flashq_server::generation::{Generator, ScriptedGenerator};
use flashq_server::sessions::NewSession;
use flashq_server::AppState;
use sqlx::SqlitePool;
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

pub const COURSE: &str = "ml101";
pub const ALICE: UserId = 1;
pub const BOB: UserId = 2;

/// Temp database plus fully wired application state
pub struct TestContext {
    pub dir: TempDir,
    pub pool: SqlitePool,
    pub repo: Repository,
    pub state: AppState,
    pub shutdown: CancellationToken,
}

pub async fn setup(generator: Option<ScriptedGenerator>) -> TestContext {
    setup_with_capacity(generator, 64).await
}

pub async fn setup_with_capacity(
    generator: Option<ScriptedGenerator>,
    event_queue_capacity: usize,
) -> TestContext {
    let dir = TempDir::new().expect("temp dir");
    let pool = init_database(&dir.path().join("flashq.db"))
        .await
        .expect("init database");
    let shutdown = CancellationToken::new();
    let state = state_for(&pool, generator, event_queue_capacity, shutdown.clone());

    TestContext {
        dir,
        repo: Repository::new(pool.clone()),
        pool,
        state,
        shutdown,
    }
}

/// Additional application state over an existing database
pub fn state_for(
    pool: &SqlitePool,
    generator: Option<ScriptedGenerator>,
    event_queue_capacity: usize,
    shutdown: CancellationToken,
) -> AppState {
    let generator = generator.map(|g| Arc::new(g) as Arc<dyn Generator>);
    AppState::new(pool.clone(), generator, event_queue_capacity, shutdown)
}

pub fn default_generator() -> ScriptedGenerator {
    ScriptedGenerator::new(["Review ", "decision ", "trees."])
}

pub fn card(uid: i64, module: &str, answer: &str) -> CardDefinition {
    CardDefinition {
        uid,
        module_name: module.to_string(),
        course_slug: COURSE.to_string(),
        course_name: Some("Machine Learning 101".to_string()),
        question: format!("Question {}?", uid),
        answer_body: answer.to_string(),
        tags: Vec::new(),
    }
}

/// Ingest `count` cards spread over modules "Trees" and "Nets"
pub async fn seed_cards(repo: &Repository, count: i64) {
    let defs: Vec<CardDefinition> = (1..=count)
        .map(|uid| {
            let module = if uid % 2 == 0 { "Nets" } else { "Trees" };
            card(uid, module, &format!("Answer {}", uid))
        })
        .collect();
    ingest(repo, &defs).await.expect("seed ingest");
}

/// Module ids of the seeded course, sorted
pub async fn module_ids(repo: &Repository) -> Vec<i64> {
    let course = repo
        .find_course_by_slug(COURSE)
        .await
        .unwrap()
        .expect("seeded course");
    let mut ids: Vec<i64> = repo
        .list_modules(course.id)
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.id)
        .collect();
    ids.sort_unstable();
    ids
}

pub async fn new_session(state: &AppState, user: UserId, shuffle: bool) -> TestSession {
    state
        .sessions
        .create_session(
            user,
            NewSession {
                course_slug: COURSE.to_string(),
                module_ids: Vec::new(),
                shuffle,
            },
        )
        .await
        .expect("create session")
}
