// Database module
// LanceDB storage for document embeddings

pub mod lancedb;

pub use self::lancedb::{
    CollectionHandle, DISTANCE_TYPE, IndexedRecord, RecordMetadata, SearchHit, VectorIndex,
};
