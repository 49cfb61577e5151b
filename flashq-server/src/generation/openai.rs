//! OpenAI-compatible chat completions client
//!
//! Streams `POST {base_url}/chat/completions` with `stream: true` and reads
//! the server-sent `data:` lines until `[DONE]`. Usage arrives in the last
//! chunk because `stream_options.include_usage` is requested.

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::{GenerationChunk, GenerationError, GenerationStream, Generator, Usage};

const USER_AGENT: &str = concat!("flashq/", env!("CARGO_PKG_VERSION"));
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

pub struct OpenAiGenerator {
    http_client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    stream_options: StreamOptions,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    usage: Option<ChunkUsage>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkUsage {
    #[serde(default)]
    prompt_tokens: i64,
    #[serde(default)]
    completion_tokens: i64,
    #[serde(default)]
    total_tokens: i64,
}

/// One decoded line of the event stream
#[derive(Debug, PartialEq)]
enum StreamLine {
    /// Blank line, comment or non-data field
    Skip,
    /// Terminal `[DONE]` marker
    Done,
    Chunk {
        model: Option<String>,
        content: Option<String>,
        usage: Option<Usage>,
    },
}

impl OpenAiGenerator {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
    ) -> Result<Self, GenerationError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| GenerationError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
            model: model.into(),
        })
    }
}

#[async_trait]
impl Generator for OpenAiGenerator {
    fn model(&self) -> &str {
        &self.model
    }

    async fn stream(&self, prompt: &str) -> Result<GenerationStream, GenerationError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            stream: true,
            stream_options: StreamOptions {
                include_usage: true,
            },
        };

        debug!(model = %self.model, prompt_len = prompt.len(), "Requesting chat completion stream");

        let mut request = self.http_client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| GenerationError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(GenerationError::Api(status.as_u16(), text));
        }

        let mut model = self.model.clone();
        let mut bytes = Box::pin(response.bytes_stream());

        let stream = async_stream::stream! {
            let mut buffer: Vec<u8> = Vec::new();
            let mut usage = Usage::default();
            let mut done = false;

            'read: while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        yield Err(GenerationError::Network(e.to_string()));
                        return;
                    }
                };
                buffer.extend_from_slice(&chunk);

                while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=pos).collect();
                    let line = String::from_utf8_lossy(&line).into_owned();

                    match parse_line(&line) {
                        Ok(StreamLine::Skip) => {}
                        Ok(StreamLine::Done) => {
                            done = true;
                            break 'read;
                        }
                        Ok(StreamLine::Chunk { model: chunk_model, content, usage: chunk_usage }) => {
                            if let Some(chunk_model) = chunk_model {
                                model = chunk_model;
                            }
                            if let Some(chunk_usage) = chunk_usage {
                                usage = chunk_usage;
                            }
                            if let Some(content) = content {
                                yield Ok(GenerationChunk::Delta(content));
                            }
                        }
                        Err(e) => {
                            yield Err(e);
                            return;
                        }
                    }
                }
            }

            if done {
                yield Ok(GenerationChunk::Finished { model, usage });
            } else {
                yield Err(GenerationError::Incomplete);
            }
        };

        Ok(Box::pin(stream))
    }
}

fn parse_line(line: &str) -> Result<StreamLine, GenerationError> {
    let line = line.trim_end_matches(['\r', '\n']);
    let data = match line.strip_prefix("data:") {
        Some(data) => data.trim_start(),
        None => return Ok(StreamLine::Skip),
    };

    if data.is_empty() {
        return Ok(StreamLine::Skip);
    }
    if data == "[DONE]" {
        return Ok(StreamLine::Done);
    }

    let chunk: ChatChunk =
        serde_json::from_str(data).map_err(|e| GenerationError::Parse(e.to_string()))?;

    let content = chunk
        .choices
        .into_iter()
        .filter_map(|c| c.delta.content)
        .filter(|c| !c.is_empty())
        .reduce(|mut acc, c| {
            acc.push_str(&c);
            acc
        });

    Ok(StreamLine::Chunk {
        model: chunk.model,
        content,
        usage: chunk.usage.map(|u| Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        }),
    })
}
