// Embeddings module
// Tokenization, sliding windows, the embedding HTTP client and mean pooling

pub mod chunking;
pub mod client;
pub mod generator;
pub mod tokenizer;

pub use chunking::{ChunkingConfig, cosine_similarity, mean_pool};
pub use client::EmbeddingClient;
pub use generator::ChunkedEmbedder;
pub use tokenizer::{TokenizedText, Tokenizer};
