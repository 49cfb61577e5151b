//! Deterministic generator
//!
//! Replays a fixed list of deltas. Used for offline runs and tests; it can
//! pause between deltas and fail after the last delta.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::{GenerationChunk, GenerationError, GenerationStream, Generator, Usage};

pub const SCRIPTED_MODEL: &str = "scripted";

#[derive(Debug, Clone)]
pub struct ScriptedGenerator {
    deltas: Vec<String>,
    delay: Option<Duration>,
    failure: Option<String>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedGenerator {
    pub fn new<I, S>(deltas: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            deltas: deltas.into_iter().map(Into::into).collect(),
            delay: None,
            failure: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Sleep before every delta
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail with `message` instead of finishing
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    /// Number of streams started so far (shared between clones)
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn usage(&self, prompt: &str) -> Usage {
        let prompt_tokens = prompt.split_whitespace().count() as i64;
        let completion_tokens = self
            .deltas
            .iter()
            .map(|d| d.split_whitespace().count() as i64)
            .sum();
        Usage {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    fn model(&self) -> &str {
        SCRIPTED_MODEL
    }

    async fn stream(&self, prompt: &str) -> Result<GenerationStream, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let deltas = self.deltas.clone();
        let delay = self.delay;
        let failure = self.failure.clone();
        let usage = self.usage(prompt);

        let stream = async_stream::stream! {
            for delta in deltas {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                yield Ok(GenerationChunk::Delta(delta));
            }
            match failure {
                Some(message) => {
                    yield Err(GenerationError::Failed(message));
                }
                None => {
                    yield Ok(GenerationChunk::Finished {
                        model: SCRIPTED_MODEL.to_string(),
                        usage,
                    });
                }
            }
        };

        Ok(Box::pin(stream))
    }
}
