//! Test session lifecycle
//!
//! Answers move `null -> remember | forgot` exactly once. The transaction
//! that resolves the last `null` answer also closes the session, and only
//! that transaction hands the session to the recommendation jobs.
//!
//! Resolving answers of one session is serialized three ways:
//!
//! 1. an in-process async lock per session, held for the whole transaction;
//! 2. the transaction starts with `BEGIN IMMEDIATE`, so SQLite's single
//!    writer lock is held before anything is read, and its first statement
//!    touches the session row;
//! 3. the writes themselves are compare-and-set (`status = 'null'`,
//!    `is_active = 1`) and the remaining count is read after the write.

use chrono::Utc;
use flashq_common::models::{AnswerView, SessionSummary, TestSession, UserAnswer};
use flashq_common::{uuid_utils, AnswerStatus, Error, Result, UserId};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::OwnedMutexGuard;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use crate::db::Repository;
use crate::metrics::Metrics;
use crate::recommendation::{JobOutcome, RecommendationJobs};

/// Request to start a session
#[derive(Debug, Clone)]
pub struct NewSession {
    pub course_slug: String,
    pub module_ids: Vec<i64>,
    pub shuffle: bool,
}

/// Result of resolving one answer
#[derive(Debug)]
pub struct AnswerUpdate {
    pub answer: UserAnswer,
    pub session: TestSession,
    /// True when this update closed the session
    pub closed: bool,
    /// Recommendation job started by this update
    pub job: Option<JoinHandle<JobOutcome>>,
}

/// Per-session async locks
///
/// Entries are weak so finished sessions do not accumulate.
#[derive(Debug, Clone, Default)]
pub struct SessionLocks {
    locks: Arc<Mutex<HashMap<Uuid, Weak<tokio::sync::Mutex<()>>>>>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, session_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks.retain(|_, weak| weak.strong_count() > 0);
            match locks.get(&session_id).and_then(Weak::upgrade) {
                Some(lock) => lock,
                None => {
                    let lock = Arc::new(tokio::sync::Mutex::new(()));
                    locks.insert(session_id, Arc::downgrade(&lock));
                    lock
                }
            }
        };
        lock.lock_owned().await
    }

    /// Sessions with a live lock
    pub fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Clone)]
pub struct SessionEngine {
    repo: Repository,
    jobs: RecommendationJobs,
    metrics: Arc<Metrics>,
    locks: SessionLocks,
}

impl SessionEngine {
    pub fn new(repo: Repository, jobs: RecommendationJobs, metrics: Arc<Metrics>) -> Self {
        Self {
            repo,
            jobs,
            metrics,
            locks: SessionLocks::new(),
        }
    }

    pub fn jobs(&self) -> &RecommendationJobs {
        &self.jobs
    }

    /// Create a session over the active cards of a course
    ///
    /// An empty `module_ids` selects every module of the course. Cards are
    /// ordered by uid unless `shuffle` is set. A selection without cards is
    /// rejected.
    pub async fn create_session(&self, user_id: UserId, request: NewSession) -> Result<TestSession> {
        let mut module_ids = request.module_ids;
        module_ids.sort_unstable();
        module_ids.dedup();

        let mut tx = self.repo.begin().await?;

        let course = tx
            .find_course_by_slug(&request.course_slug)
            .await?
            .ok_or_else(|| Error::NotFound(format!("course {}", request.course_slug)))?;

        let mut cards = tx.find_active_cards(course.id, &module_ids).await?;
        if cards.is_empty() {
            return Err(Error::InvalidInput(format!(
                "no active cards in course {} for the selected modules",
                course.slug
            )));
        }

        if request.shuffle {
            let mut rng = StdRng::from_entropy();
            cards.shuffle(&mut rng);
        }

        let now = Utc::now();
        let session = TestSession {
            id: uuid_utils::generate(),
            user_id,
            course_id: course.id,
            module_ids,
            is_shuffled: request.shuffle,
            is_active: true,
            recommendation: None,
            created_at: now,
            updated_at: now,
        };

        let answers: Vec<UserAnswer> = cards
            .iter()
            .enumerate()
            .map(|(position, card)| UserAnswer {
                id: uuid_utils::generate(),
                card_id: card.id,
                test_session_id: session.id,
                position: position as i64,
                status: AnswerStatus::Null,
                created_at: now,
                updated_at: now,
            })
            .collect();

        tx.create_session(&session, &answers).await?;
        tx.commit().await?;

        self.metrics.session_created();
        info!(
            session_id = %session.id,
            user_id,
            course = %course.slug,
            cards = answers.len(),
            shuffled = session.is_shuffled,
            "Test session created"
        );

        Ok(session)
    }

    /// Resolve one answer of a session owned by `user_id`
    pub async fn update_answer(
        &self,
        answer_id: Uuid,
        user_id: UserId,
        status: AnswerStatus,
    ) -> Result<AnswerUpdate> {
        if !status.is_terminal() {
            return Err(Error::InvalidInput(format!(
                "status must be remember or forgot, got {}",
                status
            )));
        }

        let session_id = self
            .repo
            .answer_session_id(answer_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("user answer {}", answer_id)))?;

        let _lock = self.locks.lock(session_id).await;

        let mut tx = self.repo.begin().await?;
        if !tx.lock_session(session_id).await? {
            return Err(Error::NotFound(format!("test session {}", session_id)));
        }

        let mut answer = tx
            .find_answer(answer_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("user answer {}", answer_id)))?;
        if answer.status.is_terminal() {
            return Err(Error::Forbidden("user answer already resolved".to_string()));
        }

        let mut session = tx
            .find_session(session_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("test session {}", session_id)))?;
        if session.user_id != user_id {
            return Err(Error::Forbidden(
                "test session belongs to another user".to_string(),
            ));
        }
        if !session.is_active {
            return Err(Error::Forbidden("test session already closed".to_string()));
        }

        let now = Utc::now();
        if !tx.resolve_answer(answer_id, status, now).await? {
            return Err(Error::Forbidden("user answer already resolved".to_string()));
        }
        answer.status = status;
        answer.updated_at = now;

        let remaining = tx.count_unanswered(session_id).await?;
        let closed = remaining == 0 && tx.close_session(session_id, now).await?;
        if closed {
            session.is_active = false;
            session.updated_at = now;
        }

        tx.commit().await?;

        self.metrics.answer_updated();
        debug!(
            answer_id = %answer_id,
            session_id = %session_id,
            status = %status,
            remaining,
            "User answer resolved"
        );

        let job = if closed {
            info!(session_id = %session_id, user_id, "Test session completed");
            Some(self.jobs.trigger(session_id, user_id))
        } else {
            None
        };

        Ok(AnswerUpdate {
            answer,
            session,
            closed,
            job,
        })
    }

    /// Owner-checked session with its answers in presentation order
    pub async fn get_session(
        &self,
        session_id: Uuid,
        user_id: UserId,
    ) -> Result<(TestSession, Vec<AnswerView>)> {
        let session = self
            .repo
            .find_session(session_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("test session {}", session_id)))?;
        if session.user_id != user_id {
            return Err(Error::Forbidden(
                "test session belongs to another user".to_string(),
            ));
        }

        let answers = self.repo.session_answers(session_id).await?;
        Ok((session, answers))
    }

    pub async fn list_sessions(&self, user_id: UserId) -> Result<Vec<SessionSummary>> {
        self.repo.list_session_summaries(user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_session_lock_serializes_same_session() {
        let locks = SessionLocks::new();
        let id = Uuid::now_v7();

        let guard = locks.lock(id).await;
        let waiting = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.lock(id).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiting.is_finished());

        drop(guard);
        waiting.await.unwrap();
    }

    #[tokio::test]
    async fn test_session_lock_independent_sessions() {
        let locks = SessionLocks::new();

        let _a = locks.lock(Uuid::now_v7()).await;
        let _b = locks.lock(Uuid::now_v7()).await;

        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn test_released_locks_are_pruned() {
        let locks = SessionLocks::new();

        drop(locks.lock(Uuid::now_v7()).await);

        assert!(locks.is_empty());
    }
}
