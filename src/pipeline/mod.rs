// Pipeline module
// Builds every component once from the configuration and shares them

#[cfg(test)]
mod tests;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

use crate::Result;
use crate::config::Config;
use crate::database::lancedb::VectorIndex;
use crate::embeddings::ChunkedEmbedder;
use crate::indexer::{Indexer, IngestionReport};
use crate::query::{EventStream, QueryEngine};
use crate::source::{ContentSource, WikiClient};

/// Whether the vector database holds documents to answer from.
///
/// Starts unset and, once set, stays set for the lifetime of the process.
#[derive(Debug, Clone, Default)]
pub struct Readiness(Arc<AtomicBool>);

impl Readiness {
    #[inline]
    pub fn is_ready(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    #[inline]
    pub fn mark_ready(&self) {
        self.0.store(true, Ordering::Release);
    }
}

/// Every component of the question answering system, built from one [`Config`]
pub struct Pipeline {
    index: Arc<VectorIndex>,
    indexer: Indexer,
    engine: QueryEngine,
    collection: String,
    readiness: Readiness,
}

impl Pipeline {
    /// Pipeline reading documents from the configured wiki
    #[inline]
    pub async fn open(config: &Config) -> Result<Self> {
        let source = Arc::new(WikiClient::new(&config.wiki)?);
        Self::with_source(config, source).await
    }

    /// Pipeline reading documents from `source`.
    ///
    /// The collection is ensured up front. If it already holds records from an
    /// earlier run the pipeline starts ready.
    #[inline]
    pub async fn with_source(config: &Config, source: Arc<dyn ContentSource>) -> Result<Self> {
        config.validate()?;

        let embedder = Arc::new(ChunkedEmbedder::new(config)?);
        let index = Arc::new(VectorIndex::new(config).await?);
        let collection = config.vector_db.collection.clone();
        index.ensure_collection(&collection).await?;

        let readiness = Readiness::default();
        let stored = index.count(&collection).await?;
        if stored > 0 {
            info!(
                "Collection '{}' already holds {} documents, ready for queries",
                collection, stored
            );
            readiness.mark_ready();
        }

        let indexer = Indexer::new(
            source,
            Arc::clone(&embedder),
            Arc::clone(&index),
            collection.clone(),
            config.ingest.concurrency,
            readiness.clone(),
        );
        let engine = QueryEngine::new(config, embedder, Arc::clone(&index), readiness.clone())?;

        Ok(Self {
            index,
            indexer,
            engine,
            collection,
            readiness,
        })
    }

    /// Ingest the wiki page `root_id` and its children
    #[inline]
    pub async fn init(&self, root_id: &str) -> Result<IngestionReport> {
        self.indexer.ingest(root_id).await
    }

    #[inline]
    pub async fn query(&self, question: &str) -> Result<String> {
        self.engine.query(question).await
    }

    #[inline]
    pub fn stream_query(&self, question: &str) -> EventStream {
        self.engine.stream_query(question)
    }

    #[inline]
    pub fn is_ready(&self) -> bool {
        self.readiness.is_ready()
    }

    /// Number of documents in the configured collection
    #[inline]
    pub async fn document_count(&self) -> Result<usize> {
        self.index.count(&self.collection).await
    }

    #[inline]
    pub fn collection(&self) -> &str {
        &self.collection
    }
}
