// LanceDB vector database module
// Handles vector storage and similarity search for document embeddings


pub mod vector_store;

use serde::{Deserialize, Serialize};

pub use vector_store::{CollectionHandle, DISTANCE_TYPE, VectorIndex};

/// Document stored in a collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedRecord {
    /// Unique identifier within the collection, `{root_id}_{index}` for wiki pages
    pub id: String,
    /// Mean pooled document embedding
    pub embedding: Vec<f32>,
    pub metadata: RecordMetadata,
    /// Plain text the embedding was computed from
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMetadata {
    pub title: String,
}

/// One nearest-neighbour match
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub id: String,
    pub text: String,
    pub metadata: RecordMetadata,
    /// Cosine distance to the query, smaller is closer
    pub distance: f32,
}

impl IndexedRecord {
    #[inline]
    pub fn new(
        id: impl Into<String>,
        embedding: Vec<f32>,
        title: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            embedding,
            metadata: RecordMetadata {
                title: title.into(),
            },
            text: text.into(),
        }
    }
}
