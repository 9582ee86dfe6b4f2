
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::config::Config;
use crate::{RagError, Result};

pub const DEFAULT_EMBEDDING_DIMENSION: u32 = 1024;

/// Blocking client for an OpenAI-compatible `/embeddings` endpoint
#[derive(Debug, Clone)]
pub struct EmbeddingClient {
    endpoint: Url,
    api_key: String,
    model: String,
    agent: ureq::Agent,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    input: &'a str,
    model: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedData>,
}

#[derive(Debug, Deserialize)]
struct EmbedData {
    embedding: Vec<f32>,
}

impl EmbeddingClient {
    #[inline]
    pub fn new(config: &Config) -> Result<Self> {
        let base_url = config
            .llm
            .url()
            .map_err(|e| RagError::Config(e.to_string()))?;
        let endpoint = base_url
            .join("embeddings")
            .map_err(|e| RagError::Config(format!("Failed to build embedding URL: {}", e)))?;

        Ok(Self {
            endpoint,
            api_key: config.llm.api_key.clone(),
            model: config.embedding.model.clone(),
            agent: build_agent(Duration::from_secs(config.llm.timeout_seconds)),
        })
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = build_agent(timeout);
        self
    }

    /// Embed one piece of text. Any non-200 answer is a hard failure.
    #[inline]
    pub fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        debug!("Requesting embedding for text (length: {})", text.len());

        let request = EmbedRequest {
            input: text,
            model: &self.model,
        };
        let request_json = serde_json::to_string(&request)
            .map_err(|e| RagError::Other(anyhow::anyhow!("Failed to serialize request: {}", e)))?;

        let mut response = self
            .agent
            .post(self.endpoint.as_str())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .send(&request_json)?;

        let status = response.status().as_u16();
        let body = response.body_mut().read_to_string()?;

        if status != 200 {
            warn!("Embedding request failed with status {}: {}", status, body);
            return Err(RagError::EmbeddingService { status, body });
        }

        let parsed: EmbedResponse = serde_json::from_str(&body).map_err(|e| {
            RagError::MalformedResponse(format!("Failed to parse embedding response: {}", e))
        })?;

        let embedding = parsed
            .data
            .into_iter()
            .next()
            .map(|data| data.embedding)
            .ok_or_else(|| {
                RagError::MalformedResponse("embedding response has an empty 'data' field".into())
            })?;

        if embedding.is_empty() {
            return Err(RagError::MalformedResponse(
                "embedding response contains an empty vector".into(),
            ));
        }

        debug!("Received embedding with {} dimensions", embedding.len());
        Ok(embedding)
    }
}

/// Statuses are inspected by the caller so error bodies reach the logs
pub(crate) fn build_agent(timeout: Duration) -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .http_status_as_error(false)
        .build()
        .into()
}
