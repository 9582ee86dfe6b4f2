
use tracing::debug;

use crate::config::Config;
use crate::embeddings::chunking::{ChunkingConfig, mean_pool};
use crate::embeddings::client::EmbeddingClient;
use crate::embeddings::tokenizer::Tokenizer;
use crate::{RagError, Result};

/// Turns text of any length into a single embedding.
///
/// The text is tokenized, cut into overlapping windows, every window is
/// embedded separately and the window vectors are mean pooled.
#[derive(Debug, Clone)]
pub struct ChunkedEmbedder {
    client: EmbeddingClient,
    tokenizer: Tokenizer,
    chunking: ChunkingConfig,
    dimension: usize,
}

impl ChunkedEmbedder {
    #[inline]
    pub fn new(config: &Config) -> Result<Self> {
        let client = EmbeddingClient::new(config)?;
        Self::from_parts(
            client,
            config.chunking,
            config.embedding.dimension as usize,
        )
    }

    #[inline]
    pub fn from_parts(
        client: EmbeddingClient,
        chunking: ChunkingConfig,
        dimension: usize,
    ) -> Result<Self> {
        Ok(Self {
            client,
            tokenizer: Tokenizer::cl100k()?,
            chunking,
            dimension,
        })
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Embed `text`. Fails without any request when it has no tokens, and
    /// fails as a whole when any window cannot be embedded.
    #[inline]
    pub fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let tokenized = self.tokenizer.tokenize(text);
        if tokenized.is_empty() {
            return Err(RagError::EmptyInput);
        }

        let windows = self.chunking.window_ranges(tokenized.len());
        debug!(
            "Embedding {} tokens in {} windows",
            tokenized.len(),
            windows.len()
        );

        let mut vectors = Vec::with_capacity(windows.len());
        for window in windows {
            let chunk_text = tokenized.decode(window.clone());
            debug!(
                "Processing tokens {}..{}: {}",
                window.start,
                window.end,
                preview(&chunk_text, 100)
            );

            let vector = self.client.embed_text(&chunk_text)?;
            if vector.len() != self.dimension {
                return Err(RagError::MalformedResponse(format!(
                    "embedding service returned {} dimensions, expected {}",
                    vector.len(),
                    self.dimension
                )));
            }
            vectors.push(vector);
        }

        mean_pool(&vectors)
    }
}

/// First `max_chars` characters of `text`, for log lines
pub(crate) fn preview(text: &str, max_chars: usize) -> &str {
    text.char_indices()
        .nth(max_chars)
        .map_or(text, |(end, _)| text.get(..end).unwrap_or(text))
}
