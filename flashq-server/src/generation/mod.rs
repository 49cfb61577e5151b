//! Text generation port
//!
//! A [`Generator`] turns a prompt into a one-shot stream of text deltas
//! followed by a single [`GenerationChunk::Finished`] carrying the model name
//! and token usage. [`Generator::complete`] drains that stream.

pub mod openai;
pub mod scripted;

pub use openai::OpenAiGenerator;
pub use scripted::ScriptedGenerator;

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Generation errors
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Stream ended before completion")]
    Incomplete,

    #[error("Generation failed: {0}")]
    Failed(String),
}

/// Token accounting reported by the backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub total_tokens: i64,
}

/// One item of a generation stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationChunk {
    /// Next piece of text
    Delta(String),
    /// Last item of a successful stream
    Finished { model: String, usage: Usage },
}

/// Full result of a non-streaming call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    pub model: String,
    pub usage: Usage,
}

pub type GenerationStream = BoxStream<'static, Result<GenerationChunk, GenerationError>>;

#[async_trait]
pub trait Generator: Send + Sync {
    /// Model requested from the backend
    fn model(&self) -> &str;

    /// Start generating; the returned stream can be consumed once
    async fn stream(&self, prompt: &str) -> Result<GenerationStream, GenerationError>;

    /// Generate the whole text in one call
    async fn complete(&self, prompt: &str) -> Result<Completion, GenerationError> {
        let mut stream = self.stream(prompt).await?;
        let mut text = String::new();

        while let Some(chunk) = stream.next().await {
            match chunk? {
                GenerationChunk::Delta(delta) => text.push_str(&delta),
                GenerationChunk::Finished { model, usage } => {
                    return Ok(Completion { text, model, usage });
                }
            }
        }

        Err(GenerationError::Incomplete)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_complete_concatenates_deltas() {
        let generator = ScriptedGenerator::new(["Review ", "decision ", "trees."]);

        let completion = generator.complete("prompt").await.unwrap();

        assert_eq!(completion.text, "Review decision trees.");
        assert_eq!(completion.model, generator.model());
        assert!(completion.usage.total_tokens > 0);
    }

    #[tokio::test]
    async fn test_complete_propagates_failure() {
        let generator = ScriptedGenerator::new(["partial"]).failing("backend down");

        let result = generator.complete("prompt").await;

        assert!(matches!(result, Err(GenerationError::Failed(_))));
    }
}
