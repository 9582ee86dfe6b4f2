
use super::{IndexedRecord, RecordMetadata, SearchHit};
use crate::{RagError, Result, config::Config};
use arrow::array::{Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use futures::TryStreamExt;
use lancedb::{
    Connection, DistanceType, Table,
    query::{ExecutableQuery, QueryBase, Select},
};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Metric used for every nearest-neighbour search
pub const DISTANCE_TYPE: DistanceType = DistanceType::Cosine;

/// Persistent vector index holding named collections of documents
pub struct VectorIndex {
    connection: Connection,
    default_dimension: usize,
    collections: Mutex<HashMap<String, CollectionHandle>>,
}

/// Handle to an ensured collection
#[derive(Clone)]
pub struct CollectionHandle {
    name: String,
    dimension: usize,
    table: Table,
    write_lock: Arc<Mutex<()>>,
}

impl fmt::Debug for CollectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionHandle")
            .field("name", &self.name)
            .field("dimension", &self.dimension)
            .finish_non_exhaustive()
    }
}

impl CollectionHandle {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Serialises check-then-write sequences against this collection
    #[inline]
    pub async fn lock_writes(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().await
    }
}

impl VectorIndex {
    /// Open the index stored under the configured vector database path
    #[inline]
    pub async fn new(config: &Config) -> Result<Self> {
        Self::open(
            &config.vector_database_path(),
            config.embedding.dimension as usize,
        )
        .await
    }

    /// Open or create an index at `db_path`. New collections get `default_dimension`.
    #[inline]
    pub async fn open(db_path: &Path, default_dimension: usize) -> Result<Self> {
        debug!("Initializing LanceDB at path: {:?}", db_path);

        std::fs::create_dir_all(db_path).map_err(|e| {
            RagError::Database(format!("Failed to create vector database directory: {}", e))
        })?;

        let uri = format!("file://{}", db_path.display());
        let connection = lancedb::connect(&uri)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to connect to LanceDB: {}", e)))?;

        info!("Vector index opened at {}", db_path.display());
        Ok(Self {
            connection,
            default_dimension,
            collections: Mutex::new(HashMap::new()),
        })
    }

    /// Create the collection if it does not exist yet, then return its handle.
    /// Repeated calls return handles to the same table.
    #[inline]
    pub async fn ensure_collection(&self, name: &str) -> Result<CollectionHandle> {
        let mut collections = self.collections.lock().await;
        if let Some(handle) = collections.get(name) {
            return Ok(handle.clone());
        }

        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to list tables: {}", e)))?;

        let (table, dimension) = if table_names.iter().any(|t| t == name) {
            let table = self
                .connection
                .open_table(name)
                .execute()
                .await
                .map_err(|e| RagError::Database(format!("Failed to open table: {}", e)))?;
            let dimension = detect_vector_dimension(&table).await?;
            if dimension != self.default_dimension {
                warn!(
                    "Collection '{}' stores {} dimensional vectors, configuration says {}",
                    name, dimension, self.default_dimension
                );
            }
            info!("Using existing collection '{}'", name);
            (table, dimension)
        } else {
            let table = self
                .connection
                .create_empty_table(name, create_schema(self.default_dimension))
                .execute()
                .await
                .map_err(|e| RagError::Database(format!("Failed to create table: {}", e)))?;
            info!(
                "Created new collection '{}' with {} dimensions",
                name, self.default_dimension
            );
            (table, self.default_dimension)
        };

        let handle = CollectionHandle {
            name: name.to_string(),
            dimension,
            table,
            write_lock: Arc::new(Mutex::new(())),
        };
        collections.insert(name.to_string(), handle.clone());
        Ok(handle)
    }

    /// Handle of a collection previously passed to [`Self::ensure_collection`]
    #[inline]
    pub async fn collection(&self, name: &str) -> Result<CollectionHandle> {
        self.collections
            .lock()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| RagError::CollectionNotInitialized(name.to_string()))
    }

    /// Number of records stored in the collection
    #[inline]
    pub async fn count(&self, name: &str) -> Result<usize> {
        let handle = self.collection(name).await?;
        handle
            .table
            .count_rows(None)
            .await
            .map_err(|e| RagError::Database(format!("Failed to count rows: {}", e)))
    }

    /// Every id currently stored in the collection
    #[inline]
    pub async fn existing_ids(&self, name: &str) -> Result<HashSet<String>> {
        let handle = self.collection(name).await?;
        let row_count = handle
            .table
            .count_rows(None)
            .await
            .map_err(|e| RagError::Database(format!("Failed to count rows: {}", e)))?;

        let mut ids = HashSet::with_capacity(row_count);
        if row_count == 0 {
            return Ok(ids);
        }

        let mut results = handle
            .table
            .query()
            .select(Select::columns(&["id"]))
            .limit(row_count)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to query ids: {}", e)))?;

        while let Some(batch) = results
            .try_next()
            .await
            .map_err(|e| RagError::Database(format!("Failed to read id stream: {}", e)))?
        {
            let column = string_column(&batch, "id")?;
            ids.extend((0..batch.num_rows()).map(|row| column.value(row).to_string()));
        }

        debug!("Collection '{}' holds {} ids", name, ids.len());
        Ok(ids)
    }

    /// Insert or replace `records` by id in a single commit.
    ///
    /// The whole batch is validated before anything is written: ids must be
    /// non-empty and unique within the batch, embeddings must match the
    /// collection dimension.
    #[inline]
    pub async fn upsert(&self, name: &str, records: Vec<IndexedRecord>) -> Result<usize> {
        let handle = self.collection(name).await?;
        if records.is_empty() {
            debug!("No records to store");
            return Ok(0);
        }

        validate_records(&records, handle.dimension)?;
        let record_batch = create_record_batch(&records, handle.dimension)?;
        let schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);

        let mut merge = handle.table.merge_insert(&["id"]);
        merge
            .when_matched_update_all(None)
            .when_not_matched_insert_all();
        merge
            .execute(Box::new(reader))
            .await
            .map_err(|e| RagError::Database(format!("Failed to upsert records: {}", e)))?;

        info!(
            "Successfully stored {} documents in collection '{}'",
            records.len(),
            name
        );
        Ok(records.len())
    }

    /// Up to `k` records nearest to `query`, nearest first
    #[inline]
    pub async fn search(&self, name: &str, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        let handle = self.collection(name).await?;
        if query.len() != handle.dimension {
            return Err(RagError::InvalidRecord(format!(
                "query embedding has {} dimensions, collection '{}' stores {}",
                query.len(),
                name,
                handle.dimension
            )));
        }

        let row_count = handle
            .table
            .count_rows(None)
            .await
            .map_err(|e| RagError::Database(format!("Failed to count rows: {}", e)))?;
        if k == 0 || row_count == 0 {
            return Ok(Vec::new());
        }

        debug!("Searching '{}' for {} nearest records", name, k);
        let mut results = handle
            .table
            .vector_search(query)
            .map_err(|e| RagError::Database(format!("Failed to create vector search: {}", e)))?
            .column("vector")
            .distance_type(DISTANCE_TYPE)
            .limit(k)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to execute search: {}", e)))?;

        let mut hits = Vec::with_capacity(k.min(row_count));
        while let Some(batch) = results
            .try_next()
            .await
            .map_err(|e| RagError::Database(format!("Failed to read result stream: {}", e)))?
        {
            hits.extend(parse_search_batch(&batch)?);
        }

        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits.truncate(k);
        debug!("Search returned {} hits", hits.len());
        Ok(hits)
    }
}

fn validate_records(records: &[IndexedRecord], dimension: usize) -> Result<()> {
    let mut seen = HashSet::with_capacity(records.len());
    for record in records {
        if record.id.is_empty() {
            return Err(RagError::InvalidRecord("record id is empty".to_string()));
        }
        if !seen.insert(record.id.as_str()) {
            return Err(RagError::InvalidRecord(format!(
                "record id '{}' appears twice in one batch",
                record.id
            )));
        }
        if record.embedding.len() != dimension {
            return Err(RagError::InvalidRecord(format!(
                "record '{}' has {} dimensions, collection stores {}",
                record.id,
                record.embedding.len(),
                dimension
            )));
        }
    }
    Ok(())
}

fn create_schema(vector_dim: usize) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, false)),
                vector_dim as i32,
            ),
            false,
        ),
        Field::new("title", DataType::Utf8, false),
        Field::new("text", DataType::Utf8, false),
    ]))
}

async fn detect_vector_dimension(table: &Table) -> Result<usize> {
    let schema = table
        .schema()
        .await
        .map_err(|e| RagError::Database(format!("Failed to get table schema: {}", e)))?;

    schema
        .fields()
        .iter()
        .find(|field| field.name() == "vector")
        .and_then(|field| match field.data_type() {
            DataType::FixedSizeList(_, size) => usize::try_from(*size).ok(),
            _ => None,
        })
        .ok_or_else(|| {
            RagError::Database("Could not find vector column or determine dimension".to_string())
        })
}

fn create_record_batch(records: &[IndexedRecord], vector_dim: usize) -> Result<RecordBatch> {
    let len = records.len();
    let mut ids = Vec::with_capacity(len);
    let mut flat_values = Vec::with_capacity(len * vector_dim);
    let mut titles = Vec::with_capacity(len);
    let mut texts = Vec::with_capacity(len);

    for record in records {
        ids.push(record.id.as_str());
        flat_values.extend_from_slice(&record.embedding);
        titles.push(record.metadata.title.as_str());
        texts.push(record.text.as_str());
    }

    let values_array = Float32Array::from(flat_values);
    let field = Arc::new(Field::new("item", DataType::Float32, false));
    let vector_array =
        FixedSizeListArray::try_new(field, vector_dim as i32, Arc::new(values_array), None)
            .map_err(|e| RagError::Database(format!("Failed to create vector array: {}", e)))?;

    let arrays: Vec<Arc<dyn Array>> = vec![
        Arc::new(StringArray::from(ids)),
        Arc::new(vector_array),
        Arc::new(StringArray::from(titles)),
        Arc::new(StringArray::from(texts)),
    ];

    RecordBatch::try_new(create_schema(vector_dim), arrays)
        .map_err(|e| RagError::Database(format!("Failed to create record batch: {}", e)))
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .ok_or_else(|| RagError::Database(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| RagError::Database(format!("Invalid {} column type", name)))
}

fn parse_search_batch(batch: &RecordBatch) -> Result<Vec<SearchHit>> {
    let ids = string_column(batch, "id")?;
    let titles = string_column(batch, "title")?;
    let texts = string_column(batch, "text")?;
    let distances = batch
        .column_by_name("_distance")
        .ok_or_else(|| RagError::Database("Missing _distance column".to_string()))?
        .as_any()
        .downcast_ref::<Float32Array>()
        .ok_or_else(|| RagError::Database("Invalid _distance column type".to_string()))?;

    (0..batch.num_rows())
        .map(|row| {
            if distances.is_null(row) {
                return Err(RagError::Database(format!(
                    "Search result {} has no distance",
                    ids.value(row)
                )));
            }
            Ok(SearchHit {
                id: ids.value(row).to_string(),
                text: texts.value(row).to_string(),
                metadata: RecordMetadata {
                    title: titles.value(row).to_string(),
                },
                distance: distances.value(row),
            })
        })
        .collect()
}
