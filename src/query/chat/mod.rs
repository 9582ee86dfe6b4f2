
use futures::StreamExt;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::config::Config;
use crate::embeddings::client::build_agent;
use crate::{RagError, Result};

/// Upper bound for connecting and for the response head of a streamed answer
const STREAM_START_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    #[inline]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    #[inline]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
///
/// Single completions are blocking, streamed completions are async so that
/// dropping the stream closes the upstream connection.
#[derive(Debug, Clone)]
pub struct ChatClient {
    endpoint: Url,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    idle_timeout: Duration,
    agent: ureq::Agent,
    http: reqwest::Client,
}

impl ChatClient {
    #[inline]
    pub fn new(config: &Config) -> Result<Self> {
        let endpoint = config
            .llm
            .url()
            .map_err(|e| RagError::Config(e.to_string()))?
            .join("chat/completions")
            .map_err(|e| RagError::Config(format!("Failed to build chat URL: {}", e)))?;

        // No total timeout, the body stays open for as long as the model writes
        let http = reqwest::Client::builder()
            .connect_timeout(STREAM_START_TIMEOUT)
            .build()
            .map_err(|e| RagError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            endpoint,
            api_key: config.llm.api_key.clone(),
            model: config.chat.model.clone(),
            temperature: config.chat.temperature,
            max_tokens: config.chat.max_tokens,
            idle_timeout: Duration::from_millis(config.chat.stream_idle_timeout_ms),
            agent: build_agent(Duration::from_secs(config.llm.timeout_seconds)),
            http,
        })
    }

    /// Content of the first choice
    #[inline]
    pub fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let body = self.request_body(messages, false)?;
        debug!("Requesting chat completion from {}", self.model);

        let mut response = self
            .agent
            .post(self.endpoint.as_str())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .send(&body)?;

        let status = response.status().as_u16();
        let body = response.body_mut().read_to_string()?;
        if status != 200 {
            warn!("Chat request failed with status {}: {}", status, body);
            return Err(RagError::ChatService { status, body });
        }

        let parsed: ChatResponse = serde_json::from_str(&body).map_err(|e| {
            RagError::MalformedResponse(format!("Failed to parse chat response: {}", e))
        })?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| RagError::MalformedResponse("chat response has no choices".into()))?;
        choice.message.content.ok_or_else(|| {
            RagError::MalformedResponse("first chat choice has no message content".into())
        })
    }

    /// Start a streamed completion. The status is checked before any line is read.
    #[inline]
    pub async fn open_stream(&self, messages: &[ChatMessage]) -> Result<ChatStream> {
        let body = self.request_body(messages, true)?;
        debug!("Requesting streamed chat completion from {}", self.model);

        let request = self
            .http
            .post(self.endpoint.as_str())
            .bearer_auth(&self.api_key)
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream")
            .body(body)
            .send();
        let response = tokio::time::timeout(STREAM_START_TIMEOUT, request)
            .await
            .map_err(|_| {
                RagError::Transport(format!(
                    "Chat service sent no response within {:?}",
                    STREAM_START_TIMEOUT
                ))
            })?
            .map_err(|e| RagError::Transport(format!("Chat request failed: {}", e)))?;

        let status = response.status().as_u16();
        if status != 200 {
            let body = response
                .text()
                .await
                .map_err(|e| RagError::Transport(format!("Failed to read chat error: {}", e)))?;
            warn!("Streamed chat request failed with status {}: {}", status, body);
            return Err(RagError::ChatService { status, body });
        }

        let chunks = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()))
            .boxed();
        Ok(ChatStream::new(chunks, self.idle_timeout))
    }

    fn request_body(&self, messages: &[ChatMessage], stream: bool) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stream,
        };
        serde_json::to_string(&request)
            .map_err(|e| RagError::Other(anyhow::anyhow!("Failed to serialize request: {}", e)))
    }
}

/// Upstream answer body, split into lines
pub struct ChatStream {
    chunks: BoxStream<'static, reqwest::Result<Vec<u8>>>,
    pending: Vec<u8>,
    idle_timeout: Duration,
    exhausted: bool,
}

impl ChatStream {
    fn new(chunks: BoxStream<'static, reqwest::Result<Vec<u8>>>, idle_timeout: Duration) -> Self {
        Self {
            chunks,
            pending: Vec::new(),
            idle_timeout,
            exhausted: false,
        }
    }

    /// Next line without its line ending, `None` once the body is complete.
    ///
    /// Fails with `Transport` when no bytes arrive within the idle timeout.
    #[inline]
    pub async fn next_line(&mut self) -> Result<Option<String>> {
        loop {
            if let Some(end) = self.pending.iter().position(|&byte| byte == b'\n') {
                let line: Vec<u8> = self.pending.drain(..=end).collect();
                return Ok(Some(decode_line(&line)));
            }
            if self.exhausted {
                if self.pending.is_empty() {
                    return Ok(None);
                }
                let line = std::mem::take(&mut self.pending);
                return Ok(Some(decode_line(&line)));
            }

            match tokio::time::timeout(self.idle_timeout, self.chunks.next()).await {
                Ok(Some(Ok(chunk))) => self.pending.extend_from_slice(&chunk),
                Ok(Some(Err(e))) => {
                    return Err(RagError::Transport(format!(
                        "Failed to read answer stream: {}",
                        e
                    )));
                }
                Ok(None) => self.exhausted = true,
                Err(_) => {
                    return Err(RagError::Transport(format!(
                        "Answer stream was idle for more than {:?}",
                        self.idle_timeout
                    )));
                }
            }
        }
    }
}

fn decode_line(line: &[u8]) -> String {
    String::from_utf8_lossy(line)
        .trim_end_matches(['\r', '\n'])
        .to_string()
}
