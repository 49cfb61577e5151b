//! Recommendation jobs
//!
//! When a session closes, one background job turns its resolved answers into
//! feedback text. Guarantees:
//!
//! - At most one job per session runs at a time ([`InFlight`]).
//! - A session gets at most one recommendation: the job skips sessions that
//!   already have one, and the final write is guarded by
//!   `recommendation IS NULL`.
//! - Output is streamed to the session owner through the [`EventBus`] as
//!   `start`, `delta` (accumulated text) and `end` events. Publishing never
//!   blocks generation.
//! - Failures roll back, are logged and are not retried automatically. The
//!   owner can ask for another attempt through [`RecommendationJobs::retry`].

pub mod prompt;

pub use prompt::build_prompt;

use chrono::Utc;
use flashq_common::models::{RecommendationRecord, UserId};
use flashq_common::{uuid_utils, Error, EventBus, UserEvent};
use futures::StreamExt;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::db::Repository;
use crate::generation::{GenerationChunk, GenerationError, Generator, Usage};
use crate::metrics::Metrics;

/// How a job ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// Recommendation stored and published
    Completed { text: String },
    /// Another job for the session was running
    AlreadyRunning,
    /// The session already had a recommendation
    AlreadyCompleted,
    /// The session had no resolved answers
    NothingAnswered,
    /// No generator is configured
    Disabled,
    /// Shutdown interrupted generation
    Cancelled,
    /// Storage or generation failed; nothing was stored
    Failed(String),
}

#[derive(Debug, Error)]
enum JobError {
    #[error(transparent)]
    Store(#[from] Error),

    #[error(transparent)]
    Generation(#[from] GenerationError),
}

/// Why an explicit retry was refused
#[derive(Debug, Error)]
pub enum RetryError {
    #[error(transparent)]
    Store(#[from] Error),

    #[error("Recommendation for session {0} is already being generated")]
    InFlight(Uuid),

    #[error("Session {0} already has a recommendation")]
    Completed(Uuid),

    #[error("Session {0} is still active")]
    SessionActive(Uuid),
}

/// Sessions with a running job
#[derive(Debug, Clone, Default)]
pub struct InFlight {
    ids: Arc<Mutex<HashSet<Uuid>>>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `session_id`; `None` when it is already registered
    pub fn try_acquire(&self, session_id: Uuid) -> Option<InFlightGuard> {
        let mut ids = self.ids.lock().unwrap_or_else(|e| e.into_inner());
        if !ids.insert(session_id) {
            return None;
        }
        Some(InFlightGuard {
            ids: self.ids.clone(),
            session_id,
        })
    }

    pub fn contains(&self, session_id: Uuid) -> bool {
        self.ids
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&session_id)
    }

    pub fn len(&self) -> usize {
        self.ids.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Releases the registration on drop, including on panic or task abort
#[derive(Debug)]
pub struct InFlightGuard {
    ids: Arc<Mutex<HashSet<Uuid>>>,
    session_id: Uuid,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.ids
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.session_id);
    }
}

/// Spawns and runs recommendation jobs
#[derive(Clone)]
pub struct RecommendationJobs {
    repo: Repository,
    generator: Option<Arc<dyn Generator>>,
    events: EventBus,
    metrics: Arc<Metrics>,
    in_flight: InFlight,
    shutdown: CancellationToken,
}

impl RecommendationJobs {
    pub fn new(
        repo: Repository,
        generator: Option<Arc<dyn Generator>>,
        events: EventBus,
        metrics: Arc<Metrics>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            repo,
            generator,
            events,
            metrics,
            in_flight: InFlight::new(),
            shutdown,
        }
    }

    pub fn in_flight(&self) -> &InFlight {
        &self.in_flight
    }

    /// Start a job for a session that just closed
    ///
    /// Fire-and-forget: the handle is only useful to wait for the outcome.
    /// Triggering a session whose job is already running returns
    /// [`JobOutcome::AlreadyRunning`] without starting anything.
    pub fn trigger(&self, session_id: Uuid, user_id: UserId) -> JoinHandle<JobOutcome> {
        match self.in_flight.try_acquire(session_id) {
            Some(guard) => self.spawn(guard, session_id, user_id),
            None => {
                debug!(session_id = %session_id, "Recommendation job already running, trigger ignored");
                tokio::spawn(async { JobOutcome::AlreadyRunning })
            }
        }
    }

    /// Owner-requested new attempt for a closed session without recommendation
    pub async fn retry(
        &self,
        session_id: Uuid,
        user_id: UserId,
    ) -> Result<JoinHandle<JobOutcome>, RetryError> {
        let session = self
            .repo
            .find_session(session_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("test session {}", session_id)))?;

        if session.user_id != user_id {
            return Err(Error::Forbidden("test session belongs to another user".to_string()).into());
        }
        if session.is_active {
            return Err(RetryError::SessionActive(session_id));
        }
        if session.recommendation.is_some() {
            return Err(RetryError::Completed(session_id));
        }

        let guard = self
            .in_flight
            .try_acquire(session_id)
            .ok_or(RetryError::InFlight(session_id))?;

        info!(session_id = %session_id, user_id, "Recommendation retry requested");
        Ok(self.spawn(guard, session_id, user_id))
    }

    fn spawn(&self, guard: InFlightGuard, session_id: Uuid, user_id: UserId) -> JoinHandle<JobOutcome> {
        let jobs = self.clone();
        tokio::spawn(async move {
            let _guard = guard;
            match jobs.run(session_id, user_id).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(session_id = %session_id, "Recommendation job failed: {}", e);
                    JobOutcome::Failed(e.to_string())
                }
            }
        })
    }

    async fn run(&self, session_id: Uuid, user_id: UserId) -> Result<JobOutcome, JobError> {
        let generator = match &self.generator {
            Some(generator) => generator.clone(),
            None => {
                debug!(session_id = %session_id, "Generation disabled, no recommendation");
                return Ok(JobOutcome::Disabled);
            }
        };

        // Read snapshot; released before the slow generation call
        let mut tx = self.repo.snapshot().await?;
        let session = tx
            .find_session(session_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("test session {}", session_id)))?;
        if session.recommendation.is_some() {
            tx.rollback().await?;
            info!(session_id = %session_id, "Session already has a recommendation, job skipped");
            return Ok(JobOutcome::AlreadyCompleted);
        }
        let answers = tx.answered_cards(session_id).await?;
        tx.rollback().await?;

        if answers.is_empty() {
            info!(session_id = %session_id, "No answered cards, job skipped");
            return Ok(JobOutcome::NothingAnswered);
        }

        let prompt = build_prompt(&answers);
        info!(
            session_id = %session_id,
            cards = answers.len(),
            model = generator.model(),
            "Generating recommendation"
        );

        self.events.publish(user_id, UserEvent::start(session_id));

        let mut stream = tokio::select! {
            _ = self.shutdown.cancelled() => return Ok(JobOutcome::Cancelled),
            stream = generator.stream(&prompt) => stream?,
        };

        let mut text = String::new();
        let mut finished: Option<(String, Usage)> = None;

        loop {
            let next = tokio::select! {
                _ = self.shutdown.cancelled() => {
                    warn!(session_id = %session_id, "Shutdown during generation, recommendation dropped");
                    return Ok(JobOutcome::Cancelled);
                }
                next = stream.next() => next,
            };

            match next {
                Some(Ok(GenerationChunk::Delta(delta))) => {
                    text.push_str(&delta);
                    self.events.publish(user_id, UserEvent::delta(text.clone()));
                }
                Some(Ok(GenerationChunk::Finished { model, usage })) => {
                    finished = Some((model, usage));
                }
                Some(Err(e)) => return Err(e.into()),
                None => break,
            }
        }

        let (model, usage) = finished.ok_or(GenerationError::Incomplete)?;

        let now = Utc::now();
        let mut tx = self.repo.begin().await?;
        if !tx.attach_recommendation(session_id, &text, now).await? {
            tx.rollback().await?;
            info!(session_id = %session_id, "Recommendation stored concurrently, result discarded");
            return Ok(JobOutcome::AlreadyCompleted);
        }
        tx.create_recommendation_record(&RecommendationRecord {
            id: uuid_utils::generate(),
            test_session_id: session_id,
            model,
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
            generated_at: now,
        })
        .await?;
        tx.commit().await?;

        self.metrics.recommendation_generated();
        self.events.publish(user_id, UserEvent::end(text.clone()));

        info!(
            session_id = %session_id,
            total_tokens = usage.total_tokens,
            "Recommendation stored"
        );
        Ok(JobOutcome::Completed { text })
    }
}
