//! Repository over the SQLite pool
//!
//! [`Repository`] serves reads that need no transactional context.
//! [`RepoTx`] is the repository bound to one open transaction; every mutation
//! goes through it. Committing consumes the handle, and dropping it without a
//! commit rolls the transaction back.
//!
//! UUIDs are stored as hyphenated TEXT, so every bind uses `to_string()`.

use chrono::{DateTime, Utc};
use flashq_common::models::{
    AnswerView, Card, CardDefinition, Course, LeaderboardEntry, Module, RecommendationRecord,
    SessionSummary, TestSession, UserAnswer,
};
use flashq_common::{AnswerStatus, Result, UserId};
use sqlx::{QueryBuilder, Sqlite, SqliteExecutor, SqlitePool, Transaction};
use uuid::Uuid;

use super::rows::{
    answer_from_row, answer_view_from_row, card_from_row, course_from_row,
    leaderboard_from_row, module_from_row, parse_uuid, record_from_row, session_from_row,
    summary_from_row, ANSWER_COLUMNS, ANSWER_VIEW_SELECT, CARD_COLUMNS, SESSION_COLUMNS,
};

/// Pool-backed repository
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open a write transaction
    ///
    /// `BEGIN IMMEDIATE` takes SQLite's write lock up front, waiting out the
    /// busy timeout if another connection holds it. A deferred transaction
    /// that reads first cannot upgrade once another writer has committed,
    /// and fails with SQLITE_BUSY without waiting.
    pub async fn begin(&self) -> Result<RepoTx> {
        let tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;
        Ok(RepoTx { tx })
    }

    /// Open a read-only snapshot; never writes, so it never needs the lock
    pub async fn snapshot(&self) -> Result<RepoTx> {
        let tx = self.pool.begin().await?;
        Ok(RepoTx { tx })
    }

    /// Session that owns an answer, read outside any transaction
    pub async fn answer_session_id(&self, answer_id: Uuid) -> Result<Option<Uuid>> {
        let id: Option<String> =
            sqlx::query_scalar("SELECT test_session_id FROM user_answers WHERE id = ?")
                .bind(answer_id.to_string())
                .fetch_optional(&self.pool)
                .await?;
        id.as_deref().map(parse_uuid).transpose()
    }

    pub async fn list_courses(&self) -> Result<Vec<Course>> {
        let rows = sqlx::query(
            "SELECT id, slug, name, created_at, updated_at FROM courses ORDER BY slug",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(course_from_row).collect()
    }

    pub async fn find_course_by_slug(&self, slug: &str) -> Result<Option<Course>> {
        fetch_course_by_slug(&self.pool, slug).await
    }

    /// Modules that currently hold at least one active card of the course
    pub async fn list_modules(&self, course_id: i64) -> Result<Vec<Module>> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT m.id, m.name, m.created_at, m.updated_at
            FROM modules m
            JOIN cards c ON c.module_id = m.id
            WHERE c.course_id = ? AND c.is_active = 1
            ORDER BY m.name
            "#,
        )
        .bind(course_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(module_from_row).collect()
    }

    pub async fn list_active_cards(&self, course_id: i64) -> Result<Vec<Card>> {
        fetch_active_cards(&self.pool, course_id, &[]).await
    }

    /// Every stored version of a card, oldest first
    pub async fn card_history(&self, uid: i64) -> Result<Vec<Card>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM cards WHERE uid = ? ORDER BY id",
            CARD_COLUMNS
        ))
        .bind(uid)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(card_from_row).collect()
    }

    pub async fn find_session(&self, id: Uuid) -> Result<Option<TestSession>> {
        fetch_session(&self.pool, id).await
    }

    pub async fn session_answers(&self, session_id: Uuid) -> Result<Vec<AnswerView>> {
        fetch_session_answers(&self.pool, session_id).await
    }

    /// History of one user's sessions, newest first
    pub async fn list_session_summaries(&self, user_id: UserId) -> Result<Vec<SessionSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT s.id, s.is_active, s.is_shuffled, s.module_ids, s.created_at,
                   s.recommendation IS NOT NULL AS has_recommendation,
                   co.name AS course_name,
                   COALESCE(SUM(CASE WHEN ua.status = 'null' THEN 1 ELSE 0 END), 0) AS count_null,
                   COALESCE(SUM(CASE WHEN ua.status = 'remember' THEN 1 ELSE 0 END), 0) AS count_remember,
                   COALESCE(SUM(CASE WHEN ua.status = 'forgot' THEN 1 ELSE 0 END), 0) AS count_forgot
            FROM test_sessions s
            JOIN courses co ON co.id = s.course_id
            LEFT JOIN user_answers ua ON ua.test_session_id = s.id
            WHERE s.user_id = ?
            GROUP BY s.id
            ORDER BY s.id DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(summary_from_row).collect()
    }

    /// Users ranked by remembered answers
    pub async fn leaderboard(&self, limit: i64) -> Result<Vec<LeaderboardEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT s.user_id,
                   COALESCE(SUM(CASE WHEN ua.status = 'remember' THEN 1 ELSE 0 END), 0) AS remember_count,
                   COALESCE(SUM(CASE WHEN ua.status = 'forgot' THEN 1 ELSE 0 END), 0) AS forgot_count,
                   COALESCE(SUM(CASE WHEN ua.status != 'null' THEN 1 ELSE 0 END), 0) AS answered_count,
                   COUNT(DISTINCT s.id) AS started_sessions
            FROM test_sessions s
            LEFT JOIN user_answers ua ON ua.test_session_id = s.id
            GROUP BY s.user_id
            ORDER BY remember_count DESC, answered_count DESC, s.user_id
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(leaderboard_from_row).collect()
    }

    pub async fn recommendation_records(
        &self,
        session_id: Uuid,
    ) -> Result<Vec<RecommendationRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, test_session_id, model, prompt_tokens, completion_tokens,
                   total_tokens, generated_at
            FROM recommendation_jobs
            WHERE test_session_id = ?
            "#,
        )
        .bind(session_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(record_from_row).collect()
    }
}

/// Repository bound to an open transaction
pub struct RepoTx {
    tx: Transaction<'static, Sqlite>,
}

impl RepoTx {
    // ---- cards ----

    /// Active card with exactly this content
    pub async fn find_card_by_uid_and_hash(&mut self, uid: i64, hash: &str) -> Result<Option<Card>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM cards WHERE uid = ? AND hash = ? AND is_active = 1",
            CARD_COLUMNS
        ))
        .bind(uid)
        .bind(hash)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.as_ref().map(card_from_row).transpose()
    }

    pub async fn find_active_card_by_uid(&mut self, uid: i64) -> Result<Option<Card>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM cards WHERE uid = ? AND is_active = 1",
            CARD_COLUMNS
        ))
        .bind(uid)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.as_ref().map(card_from_row).transpose()
    }

    /// Insert a new active card version
    pub async fn create_card(
        &mut self,
        definition: &CardDefinition,
        hash: &str,
        module_id: i64,
        course_id: i64,
    ) -> Result<Card> {
        let now = Utc::now();
        let tags = serde_json::to_string(&definition.tags)?;

        let id = sqlx::query(
            r#"
            INSERT INTO cards (uid, hash, question, answer, tags, module_id, course_id,
                               is_active, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, 1, ?, ?)
            "#,
        )
        .bind(definition.uid)
        .bind(hash)
        .bind(&definition.question)
        .bind(&definition.answer_body)
        .bind(&tags)
        .bind(module_id)
        .bind(course_id)
        .bind(now)
        .bind(now)
        .execute(&mut *self.tx)
        .await?
        .last_insert_rowid();

        Ok(Card {
            id,
            uid: definition.uid,
            hash: hash.to_string(),
            question: definition.question.clone(),
            answer: definition.answer_body.clone(),
            tags: definition.tags.clone(),
            module_id,
            course_id,
            is_active: true,
            created_at: now,
            updated_at: now,
        })
    }

    pub async fn deactivate_card(&mut self, card_id: i64) -> Result<()> {
        sqlx::query("UPDATE cards SET is_active = 0, updated_at = ? WHERE id = ? AND is_active = 1")
            .bind(Utc::now())
            .bind(card_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    // ---- modules and courses ----

    pub async fn find_module_by_name(&mut self, name: &str) -> Result<Option<Module>> {
        let row = sqlx::query("SELECT id, name, created_at, updated_at FROM modules WHERE name = ?")
            .bind(name)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(module_from_row).transpose()
    }

    pub async fn create_module(&mut self, name: &str) -> Result<Module> {
        let now = Utc::now();
        let id = sqlx::query("INSERT INTO modules (name, created_at, updated_at) VALUES (?, ?, ?)")
            .bind(name)
            .bind(now)
            .bind(now)
            .execute(&mut *self.tx)
            .await?
            .last_insert_rowid();

        Ok(Module {
            id,
            name: name.to_string(),
            created_at: now,
            updated_at: now,
        })
    }

    pub async fn find_course_by_slug(&mut self, slug: &str) -> Result<Option<Course>> {
        fetch_course_by_slug(&mut *self.tx, slug).await
    }

    pub async fn create_course(&mut self, slug: &str, name: &str) -> Result<Course> {
        let now = Utc::now();
        let id = sqlx::query(
            "INSERT INTO courses (slug, name, created_at, updated_at) VALUES (?, ?, ?, ?)",
        )
        .bind(slug)
        .bind(name)
        .bind(now)
        .bind(now)
        .execute(&mut *self.tx)
        .await?
        .last_insert_rowid();

        Ok(Course {
            id,
            slug: slug.to_string(),
            name: name.to_string(),
            created_at: now,
            updated_at: now,
        })
    }

    // ---- sessions and answers ----

    /// Active cards of a course, restricted to `module_ids` unless empty, ordered by uid
    pub async fn find_active_cards(&mut self, course_id: i64, module_ids: &[i64]) -> Result<Vec<Card>> {
        fetch_active_cards(&mut *self.tx, course_id, module_ids).await
    }

    /// Insert a session together with its answer rows
    pub async fn create_session(&mut self, session: &TestSession, answers: &[UserAnswer]) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO test_sessions (id, user_id, course_id, module_ids, is_shuffled,
                                       is_active, recommendation, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(session.id.to_string())
        .bind(session.user_id)
        .bind(session.course_id)
        .bind(serde_json::to_string(&session.module_ids)?)
        .bind(session.is_shuffled)
        .bind(session.is_active)
        .bind(session.recommendation.as_deref())
        .bind(session.created_at)
        .bind(session.updated_at)
        .execute(&mut *self.tx)
        .await?;

        for answer in answers {
            sqlx::query(
                r#"
                INSERT INTO user_answers (id, card_id, test_session_id, position, status,
                                          created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(answer.id.to_string())
            .bind(answer.card_id)
            .bind(answer.test_session_id.to_string())
            .bind(answer.position)
            .bind(answer.status.as_str())
            .bind(answer.created_at)
            .bind(answer.updated_at)
            .execute(&mut *self.tx)
            .await?;
        }

        Ok(())
    }

    pub async fn find_session(&mut self, id: Uuid) -> Result<Option<TestSession>> {
        fetch_session(&mut *self.tx, id).await
    }

    /// Touch the session row before anything else is read
    ///
    /// A no-op write; together with `BEGIN IMMEDIATE` two transactions on the
    /// same database can never both read the pre-update state. Returns false
    /// when the session does not exist.
    pub async fn lock_session(&mut self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("UPDATE test_sessions SET updated_at = updated_at WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Answers of the session still in `null` status
    pub async fn count_unanswered(&mut self, session_id: Uuid) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM user_answers WHERE test_session_id = ? AND status = 'null'",
        )
        .bind(session_id.to_string())
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(count)
    }

    pub async fn find_answer(&mut self, id: Uuid) -> Result<Option<UserAnswer>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM user_answers WHERE id = ?",
            ANSWER_COLUMNS
        ))
        .bind(id.to_string())
        .fetch_optional(&mut *self.tx)
        .await?;
        row.as_ref().map(answer_from_row).transpose()
    }

    /// Move an answer out of `null`; false when it was already resolved
    pub async fn resolve_answer(
        &mut self,
        id: Uuid,
        status: AnswerStatus,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE user_answers SET status = ?, updated_at = ? WHERE id = ? AND status = 'null'",
        )
        .bind(status.as_str())
        .bind(now)
        .bind(id.to_string())
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Flip the session to inactive; false when it was already closed
    pub async fn close_session(&mut self, id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE test_sessions SET is_active = 0, updated_at = ? WHERE id = ? AND is_active = 1",
        )
        .bind(now)
        .bind(id.to_string())
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Resolved answers of the session ordered by card uid
    pub async fn answered_cards(&mut self, session_id: Uuid) -> Result<Vec<AnswerView>> {
        let rows = sqlx::query(&format!(
            "{} WHERE ua.test_session_id = ? AND ua.status != 'null' ORDER BY c.uid",
            ANSWER_VIEW_SELECT
        ))
        .bind(session_id.to_string())
        .fetch_all(&mut *self.tx)
        .await?;
        rows.iter().map(answer_view_from_row).collect()
    }

    // ---- recommendations ----

    /// Store the recommendation text; false when the session already has one
    pub async fn attach_recommendation(
        &mut self,
        session_id: Uuid,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE test_sessions SET recommendation = ?, updated_at = ?
            WHERE id = ? AND recommendation IS NULL
            "#,
        )
        .bind(text)
        .bind(now)
        .bind(session_id.to_string())
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn create_recommendation_record(&mut self, record: &RecommendationRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO recommendation_jobs (id, test_session_id, model, prompt_tokens,
                                             completion_tokens, total_tokens, generated_at,
                                             created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.id.to_string())
        .bind(record.test_session_id.to_string())
        .bind(&record.model)
        .bind(record.prompt_tokens)
        .bind(record.completion_tokens)
        .bind(record.total_tokens)
        .bind(record.generated_at)
        .bind(Utc::now())
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    pub async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    pub async fn rollback(self) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

async fn fetch_course_by_slug<'e, E>(executor: E, slug: &str) -> Result<Option<Course>>
where
    E: SqliteExecutor<'e>,
{
    let row = sqlx::query("SELECT id, slug, name, created_at, updated_at FROM courses WHERE slug = ?")
        .bind(slug)
        .fetch_optional(executor)
        .await?;
    row.as_ref().map(course_from_row).transpose()
}

async fn fetch_active_cards<'e, E>(executor: E, course_id: i64, module_ids: &[i64]) -> Result<Vec<Card>>
where
    E: SqliteExecutor<'e>,
{
    let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
        "SELECT {} FROM cards WHERE is_active = 1 AND course_id = ",
        CARD_COLUMNS
    ));
    query.push_bind(course_id);

    if !module_ids.is_empty() {
        query.push(" AND module_id IN (");
        let mut separated = query.separated(", ");
        for module_id in module_ids {
            separated.push_bind(*module_id);
        }
        separated.push_unseparated(")");
    }
    query.push(" ORDER BY uid");

    let rows = query.build().fetch_all(executor).await?;
    rows.iter().map(card_from_row).collect()
}

async fn fetch_session<'e, E>(executor: E, id: Uuid) -> Result<Option<TestSession>>
where
    E: SqliteExecutor<'e>,
{
    let row = sqlx::query(&format!(
        "SELECT {} FROM test_sessions WHERE id = ?",
        SESSION_COLUMNS
    ))
    .bind(id.to_string())
    .fetch_optional(executor)
    .await?;
    row.as_ref().map(session_from_row).transpose()
}

async fn fetch_session_answers<'e, E>(executor: E, session_id: Uuid) -> Result<Vec<AnswerView>>
where
    E: SqliteExecutor<'e>,
{
    let rows = sqlx::query(&format!(
        "{} WHERE ua.test_session_id = ? ORDER BY ua.position",
        ANSWER_VIEW_SELECT
    ))
    .bind(session_id.to_string())
    .fetch_all(executor)
    .await?;
    rows.iter().map(answer_view_from_row).collect()
}
