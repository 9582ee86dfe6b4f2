use thiserror::Error;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Input text is empty after tokenization")]
    EmptyInput,

    #[error("Embedding service returned HTTP {status}: {body}")]
    EmbeddingService { status: u16, body: String },

    #[error("Collection '{0}' is not initialized. Please create the collection first.")]
    CollectionNotInitialized(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("No documents fetched for root page {0}")]
    NoDocuments(String),

    #[error("Vector database is not initialized. Please initialize first.")]
    NotInitialized,

    #[error("Chat service returned HTTP {status}: {body}")]
    ChatService { status: u16, body: String },

    #[error("Content source returned HTTP {status}: {body}")]
    ContentSource { status: u16, body: String },

    #[error("Network error: {0}")]
    Transport(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl From<ureq::Error> for RagError {
    #[inline]
    fn from(err: ureq::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<config::ConfigError> for RagError {
    #[inline]
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

/// Run blocking work (HTTP calls) on tokio's blocking pool
pub(crate) async fn run_blocking<T, F>(task: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| RagError::Other(anyhow::anyhow!("Blocking task failed: {}", e)))?
}

pub mod commands;
pub mod config;
pub mod database;
pub mod embeddings;
pub mod indexer;
pub mod pipeline;
pub mod query;
pub mod source;

#[cfg(test)]
pub(crate) mod test_support;
