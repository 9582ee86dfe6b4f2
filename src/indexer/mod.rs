// Indexer module
// Coordinates fetching, embedding and storing the documents under a wiki page


use std::collections::HashSet;
use std::sync::Arc;

use futures::{StreamExt, stream};
use tracing::{debug, error, info, warn};

use crate::database::lancedb::{IndexedRecord, VectorIndex};
use crate::embeddings::ChunkedEmbedder;
use crate::pipeline::Readiness;
use crate::source::{ContentSource, Document};
use crate::{RagError, Result, run_blocking};

/// Outcome of one ingestion run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestionReport {
    pub root_id: String,
    /// Records written by this run
    pub added: usize,
    /// Documents whose id was already stored
    pub skipped: usize,
    pub failed: Vec<DocumentFailure>,
}

/// A document that could not be embedded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentFailure {
    pub id: String,
    pub title: String,
    pub error: String,
}

impl IngestionReport {
    fn new(root_id: &str) -> Self {
        Self {
            root_id: root_id.to_string(),
            added: 0,
            skipped: 0,
            failed: Vec::new(),
        }
    }
}

/// Stable record id of the `index`-th document fetched under `root_id`
#[inline]
pub fn document_id(root_id: &str, index: usize) -> String {
    format!("{}_{}", root_id, index)
}

/// Writes wiki documents into one collection of the vector index
pub struct Indexer {
    source: Arc<dyn ContentSource>,
    embedder: Arc<ChunkedEmbedder>,
    index: Arc<VectorIndex>,
    collection: String,
    concurrency: usize,
    readiness: Readiness,
}

impl Indexer {
    #[inline]
    pub fn new(
        source: Arc<dyn ContentSource>,
        embedder: Arc<ChunkedEmbedder>,
        index: Arc<VectorIndex>,
        collection: impl Into<String>,
        concurrency: usize,
        readiness: Readiness,
    ) -> Self {
        Self {
            source,
            embedder,
            index,
            collection: collection.into(),
            concurrency: concurrency.max(1),
            readiness,
        }
    }

    #[inline]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Fetch the page `root_id` and its children and store every document
    /// that is not indexed yet.
    ///
    /// Documents that fail to embed are reported and skipped. Fetch and
    /// storage errors abort the run.
    #[inline]
    pub async fn ingest(&self, root_id: &str) -> Result<IngestionReport> {
        info!("Starting ingestion of page {}", root_id);

        let source = Arc::clone(&self.source);
        let root = root_id.to_string();
        let documents = run_blocking(move || source.fetch_document_set(&root)).await?;
        if documents.is_empty() {
            warn!("No documents found under page {}", root_id);
            return Err(RagError::NoDocuments(root_id.to_string()));
        }

        let handle = self.index.ensure_collection(&self.collection).await?;
        let existing = self.index.existing_ids(&self.collection).await?;

        let mut report = IngestionReport::new(root_id);
        let mut pending = Vec::with_capacity(documents.len());
        for (index, document) in documents.into_iter().enumerate() {
            let id = document_id(root_id, index);
            if existing.contains(&id) {
                debug!("Document {} already indexed, skipping", id);
                report.skipped += 1;
            } else {
                pending.push((id, document));
            }
        }

        if pending.is_empty() {
            info!("All documents under page {} are already indexed", root_id);
        } else {
            info!("Embedding {} new documents", pending.len());
        }

        let mut records = self.embed_documents(pending, &mut report).await;

        {
            let _write_guard = handle.lock_writes().await;
            let present = self.index.existing_ids(&self.collection).await?;
            drop_present(&mut records, &present, &mut report);
            report.added = self.index.upsert(&self.collection, records).await?;
        }

        if self.index.count(&self.collection).await? > 0 {
            self.readiness.mark_ready();
        }

        info!(
            "Ingestion of page {} finished: {} added, {} skipped, {} failed",
            root_id,
            report.added,
            report.skipped,
            report.failed.len()
        );
        Ok(report)
    }

    async fn embed_documents(
        &self,
        pending: Vec<(String, Document)>,
        report: &mut IngestionReport,
    ) -> Vec<IndexedRecord> {
        let embedded: Vec<_> = stream::iter(pending)
            .map(|(id, document)| {
                let embedder = Arc::clone(&self.embedder);
                let text = document.content.clone();
                async move {
                    let embedding = run_blocking(move || embedder.embed(&text)).await;
                    (id, document, embedding)
                }
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut records = Vec::with_capacity(embedded.len());
        for (id, document, embedding) in embedded {
            match embedding {
                Ok(embedding) => {
                    debug!("Embedded document {} ({})", id, document.title);
                    records.push(IndexedRecord::new(
                        id,
                        embedding,
                        document.title,
                        document.content,
                    ));
                }
                Err(e) => {
                    error!("Failed to embed document {} ({}): {}", id, document.title, e);
                    report.failed.push(DocumentFailure {
                        id,
                        title: document.title,
                        error: e.to_string(),
                    });
                }
            }
        }
        records
    }
}

/// Drop records another run stored while these were being embedded
fn drop_present(
    records: &mut Vec<IndexedRecord>,
    present: &HashSet<String>,
    report: &mut IngestionReport,
) {
    let before = records.len();
    records.retain(|record| !present.contains(&record.id));
    let raced = before - records.len();
    if raced > 0 {
        debug!("{} documents were stored by a concurrent run", raced);
        report.skipped += raced;
    }
}
