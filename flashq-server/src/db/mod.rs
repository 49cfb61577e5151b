//! Database access for flashq-server
//!
//! SQLite through sqlx. The schema is created idempotently at startup; every
//! mutation goes through a [`RepoTx`] obtained from [`Repository::begin`].

pub mod repository;
mod rows;

pub use repository::{RepoTx, Repository};

use flashq_common::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// How long a writer waits for SQLite's write lock before failing
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Open (or create) the database file and initialize the schema
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    // Pragmas are per connection, so they go on the connect options rather
    // than a one-off query against the pool
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true)
        .busy_timeout(BUSY_TIMEOUT);

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    init_schema(&pool).await?;

    Ok(pool)
}

/// Create all tables and indexes if they don't exist
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    create_courses_table(pool).await?;
    create_modules_table(pool).await?;
    create_cards_table(pool).await?;
    create_test_sessions_table(pool).await?;
    create_user_answers_table(pool).await?;
    create_recommendation_jobs_table(pool).await?;

    info!("Database tables initialized (courses, modules, cards, test_sessions, user_answers, recommendation_jobs)");

    Ok(())
}

async fn create_courses_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS courses (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            slug TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_modules_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS modules (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_cards_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS cards (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            uid INTEGER NOT NULL,
            hash TEXT NOT NULL,
            question TEXT NOT NULL,
            answer TEXT NOT NULL,
            tags TEXT NOT NULL DEFAULT '[]',
            module_id INTEGER NOT NULL REFERENCES modules(id),
            course_id INTEGER NOT NULL REFERENCES courses(id),
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // At most one active version per uid
    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_cards_active_uid ON cards(uid) WHERE is_active = 1",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_cards_uid_hash ON cards(uid, hash)")
        .execute(pool)
        .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_cards_course_module ON cards(course_id, module_id, is_active)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_test_sessions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS test_sessions (
            id TEXT PRIMARY KEY,
            user_id INTEGER NOT NULL,
            course_id INTEGER NOT NULL REFERENCES courses(id),
            module_ids TEXT NOT NULL DEFAULT '[]',
            is_shuffled INTEGER NOT NULL DEFAULT 0,
            is_active INTEGER NOT NULL DEFAULT 1,
            recommendation TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_test_sessions_user ON test_sessions(user_id, created_at)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_user_answers_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS user_answers (
            id TEXT PRIMARY KEY,
            card_id INTEGER NOT NULL REFERENCES cards(id),
            test_session_id TEXT NOT NULL REFERENCES test_sessions(id) ON DELETE CASCADE,
            position INTEGER NOT NULL,
            status TEXT NOT NULL DEFAULT 'null'
                CHECK (status IN ('null', 'remember', 'forgot')),
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_user_answers_session ON user_answers(test_session_id, status)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_recommendation_jobs_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS recommendation_jobs (
            id TEXT PRIMARY KEY,
            test_session_id TEXT NOT NULL UNIQUE REFERENCES test_sessions(id) ON DELETE CASCADE,
            model TEXT NOT NULL,
            prompt_tokens INTEGER NOT NULL DEFAULT 0,
            completion_tokens INTEGER NOT NULL DEFAULT 0,
            total_tokens INTEGER NOT NULL DEFAULT 0,
            generated_at TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
