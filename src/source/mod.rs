// Content source module
// Fetches wiki pages and their children and turns their markup into plain text

pub mod markup;

#[cfg(test)]
mod tests;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::config::WikiConfig;
use crate::{RagError, Result};

use self::markup::clean_content;

const EXPAND_BODY: &str = "body.storage,body.view";
const RETRYABLE_STATUSES: [u16; 4] = [500, 502, 503, 504];

/// A fetched page, reduced to plain text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub title: String,
    pub content: String,
}

impl Document {
    #[inline]
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
        }
    }
}

/// Where documents come from. Implementations block, callers run them off the async runtime.
pub trait ContentSource: Send + Sync {
    /// The root page followed by its direct children, in a stable order
    fn fetch_document_set(&self, root_id: &str) -> Result<Vec<Document>>;
}

/// Client for the Confluence-style REST API of the wiki
#[derive(Debug, Clone)]
pub struct WikiClient {
    base_url: Url,
    authorization: String,
    agent: ureq::Agent,
    max_retries: u32,
    backoff_base: Duration,
}

#[derive(Debug, Deserialize)]
struct PageResponse {
    title: String,
    #[serde(default)]
    body: Option<PageBody>,
}

#[derive(Debug, Deserialize)]
struct PageBody {
    #[serde(default)]
    storage: Option<BodyValue>,
    #[serde(default)]
    view: Option<BodyValue>,
}

#[derive(Debug, Deserialize)]
struct BodyValue {
    value: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    results: Vec<PageResponse>,
}

impl PageResponse {
    /// Storage markup is preferred, the rendered view is the fallback
    fn into_document(self) -> Option<Document> {
        let body = self.body?;
        let markup = [body.storage, body.view]
            .into_iter()
            .flatten()
            .map(|b| b.value)
            .find(|value| !value.trim().is_empty())?;

        Some(Document {
            title: self.title,
            content: clean_content(&markup),
        })
    }
}

impl WikiClient {
    #[inline]
    pub fn new(config: &WikiConfig) -> Result<Self> {
        let base_url = config
            .base_url()
            .map_err(|e| RagError::Config(e.to_string()))?;

        let credentials = format!("{}:{}", config.username, config.password);
        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.timeout_seconds)))
            .http_status_as_error(false)
            .build()
            .into();

        Ok(Self {
            base_url,
            authorization: format!("Basic {}", STANDARD.encode(credentials)),
            agent,
            max_retries: config.max_retries,
            backoff_base: Duration::from_millis(config.backoff_base_ms),
        })
    }

    /// Fetch a single page. `Ok(None)` when the page has no body.
    #[inline]
    pub fn fetch_page(&self, page_id: &str) -> Result<Option<Document>> {
        let mut url = self.content_url(&[page_id])?;
        url.query_pairs_mut().append_pair("expand", EXPAND_BODY);

        let page: PageResponse = self.get_json(&url)?;
        let title = page.title.clone();
        let document = page.into_document();
        if document.is_none() {
            error!("No content found for page {} ({})", page_id, title);
        }
        Ok(document)
    }

    /// Fetch the direct children of a page, skipping children without a body
    #[inline]
    pub fn fetch_children(&self, page_id: &str) -> Result<Vec<Document>> {
        let mut url = self.content_url(&["search"])?;
        url.query_pairs_mut()
            .append_pair("cql", &format!("parent={}", page_id))
            .append_pair("expand", EXPAND_BODY);

        let search: SearchResponse = self.get_json(&url)?;
        let children: Vec<Document> = search
            .results
            .into_iter()
            .filter_map(|child| {
                debug!("Found child page: {}", child.title);
                child.into_document()
            })
            .collect();

        debug!("Fetched {} child pages of {}", children.len(), page_id);
        Ok(children)
    }

    fn content_url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self
            .base_url
            .join("rest/api/content")
            .map_err(|e| RagError::Config(format!("Failed to build wiki URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|()| {
                RagError::Config(format!("Wiki URL cannot be a base: {}", self.base_url))
            })?
            .extend(segments);
        Ok(url)
    }

    /// GET with retries on gateway and server errors
    fn get_json<T: DeserializeOwned>(&self, url: &Url) -> Result<T> {
        let mut attempt = 0;
        loop {
            debug!("GET {} (attempt {})", url, attempt + 1);
            let mut response = self
                .agent
                .get(url.as_str())
                .header("Authorization", &self.authorization)
                .header("Accept", "application/json")
                .call()?;

            let status = response.status().as_u16();
            let body = response.body_mut().read_to_string()?;

            if (200..300).contains(&status) {
                return serde_json::from_str(&body).map_err(|e| {
                    RagError::MalformedResponse(format!(
                        "Unexpected wiki response from {}: {}",
                        url, e
                    ))
                });
            }

            if RETRYABLE_STATUSES.contains(&status) && attempt < self.max_retries {
                attempt += 1;
                let delay = self.backoff_base * 2_u32.pow(attempt - 1);
                warn!(
                    "Wiki returned {} for {}, retry {}/{} in {:?}",
                    status, url, attempt, self.max_retries, delay
                );
                std::thread::sleep(delay);
                continue;
            }

            return Err(RagError::ContentSource { status, body });
        }
    }
}

impl ContentSource for WikiClient {
    /// Root page and children are fetched independently; one failing does not
    /// discard the other. When nothing was fetched the first error is returned.
    #[inline]
    fn fetch_document_set(&self, root_id: &str) -> Result<Vec<Document>> {
        let root = self.fetch_page(root_id);
        let children = self.fetch_children(root_id);

        let mut documents = Vec::new();
        let root_error = match root {
            Ok(Some(page)) => {
                documents.push(page);
                None
            }
            Ok(None) => {
                warn!(
                    "Main page {} is empty, continuing with child pages",
                    root_id
                );
                None
            }
            Err(e) => {
                warn!(
                    "Main page {} failed to fetch: {}, continuing with child pages",
                    root_id, e
                );
                Some(e)
            }
        };

        let child_error = match children {
            Ok(pages) => {
                if pages.is_empty() {
                    warn!("No child pages found for page {}", root_id);
                }
                documents.extend(pages);
                None
            }
            Err(e) => {
                error!("Failed to fetch child pages of {}: {}", root_id, e);
                Some(e)
            }
        };

        if documents.is_empty() {
            if let Some(e) = root_error.or(child_error) {
                return Err(e);
            }
        }

        info!("Fetched {} documents under page {}", documents.len(), root_id);
        Ok(documents)
    }
}
