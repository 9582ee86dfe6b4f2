#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

/// Integration tests for the LanceDB vector index with realistic data
use ops_rag::config::Config;
use ops_rag::database::lancedb::{IndexedRecord, VectorIndex};
use std::collections::HashSet;
use std::sync::Arc;
use tempfile::TempDir;

const COLLECTION: &str = "ops_docs";

fn create_test_config() -> (Config, TempDir) {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = Config {
        base_dir: temp_dir.path().to_path_buf(),
        ..Config::default()
    };
    (config, temp_dir)
}

/// Deterministic pseudo-embedding at the default 1024 dimensions
fn realistic_vector(content: &str, variation: f32) -> Vec<f32> {
    (0..1024)
        .map(|i| {
            let base = (i as f32).mul_add(0.01, variation).sin() * 0.1;
            (content.len() as f32).mul_add(0.001, base)
        })
        .collect()
}

fn record(id: &str, title: &str, content: &str, variation: f32) -> IndexedRecord {
    IndexedRecord::new(id, realistic_vector(content, variation), title, content)
}

fn runbook_dataset() -> Vec<IndexedRecord> {
    vec![
        record(
            "100_0",
            "Restarting services",
            "Restart the web tier one node at a time and wait for health checks to pass.",
            0.1,
        ),
        record(
            "100_1",
            "Database backups",
            "Nightly backups run at 02:00. Verify the archive checksum before rotating old copies.",
            0.7,
        ),
        record(
            "100_2",
            "Deployments",
            "Deploy through the release pipeline. Roll back by redeploying the previous tag.",
            1.3,
        ),
        record(
            "200_0",
            "Disk alerts",
            "When disk usage passes 90% clean the log directory and expand the volume.",
            2.1,
        ),
    ]
}

async fn open_index(config: &Config) -> Arc<VectorIndex> {
    let index = VectorIndex::new(config)
        .await
        .expect("should open vector index");
    index
        .ensure_collection(COLLECTION)
        .await
        .expect("should ensure collection");
    Arc::new(index)
}

#[tokio::test]
async fn runbook_storage_and_search() {
    let (config, _temp_dir) = create_test_config();
    let index = open_index(&config).await;

    let dataset = runbook_dataset();
    let written = index
        .upsert(COLLECTION, dataset.clone())
        .await
        .expect("should store runbooks");
    assert_eq!(written, dataset.len());
    assert_eq!(index.count(COLLECTION).await.expect("count"), dataset.len());

    let hits = index
        .search(COLLECTION, &dataset[1].embedding, 3)
        .await
        .expect("search should succeed");

    assert_eq!(hits.len(), 3);
    assert_eq!(hits[0].id, "100_1");
    assert_eq!(hits[0].metadata.title, "Database backups");
    assert_eq!(hits[0].text, dataset[1].text);
    assert!(hits[0].distance.abs() < 1e-4, "exact match should have ~0 distance");
    for pair in hits.windows(2) {
        assert!(pair[0].distance <= pair[1].distance);
    }
}

#[tokio::test]
async fn large_batch_processing() {
    let (config, _temp_dir) = create_test_config();
    let index = open_index(&config).await;

    let dataset: Vec<IndexedRecord> = (0..100)
        .map(|i| {
            record(
                &format!("{}_{}", i % 5, i),
                &format!("Page {}", i),
                &format!("Runbook page {} covering procedure {}.", i, i % 10),
                i as f32 * 0.01,
            )
        })
        .collect();

    let start_time = std::time::Instant::now();
    index
        .upsert(COLLECTION, dataset.clone())
        .await
        .expect("should store large batch");
    assert!(
        start_time.elapsed().as_secs() < 30,
        "Storage should complete within 30 seconds"
    );

    let ids = index.existing_ids(COLLECTION).await.expect("ids");
    assert_eq!(ids.len(), 100);

    let hits = index
        .search(COLLECTION, &dataset[0].embedding, 20)
        .await
        .expect("search should succeed");
    assert_eq!(hits.len(), 20);
}

#[tokio::test]
async fn collections_are_isolated() {
    let (config, _temp_dir) = create_test_config();
    let index = open_index(&config).await;
    index
        .ensure_collection("staging_docs")
        .await
        .expect("second collection");

    index
        .upsert(COLLECTION, runbook_dataset())
        .await
        .expect("store");

    assert_eq!(index.count("staging_docs").await.expect("count"), 0);
    assert!(
        index
            .existing_ids("staging_docs")
            .await
            .expect("ids")
            .is_empty()
    );
}

#[tokio::test]
async fn concurrent_writers_keep_every_record() {
    let (config, _temp_dir) = create_test_config();
    let index = open_index(&config).await;

    let mut tasks = Vec::new();
    for writer in 0..4 {
        let index = Arc::clone(&index);
        tasks.push(tokio::spawn(async move {
            let handle = index.collection(COLLECTION).await.expect("handle");
            let records: Vec<IndexedRecord> = (0..5)
                .map(|i| {
                    record(
                        &format!("{}_{}", writer, i),
                        "Concurrent",
                        &format!("writer {} record {}", writer, i),
                        (writer * 5 + i) as f32 * 0.1,
                    )
                })
                .collect();
            let _write_guard = handle.lock_writes().await;
            index.upsert(COLLECTION, records).await.expect("upsert")
        }));
    }

    let mut written = 0;
    for task in tasks {
        written += task.await.expect("writer task");
    }

    assert_eq!(written, 20);
    let ids = index.existing_ids(COLLECTION).await.expect("ids");
    let expected: HashSet<String> = (0..4)
        .flat_map(|writer| (0..5).map(move |i| format!("{}_{}", writer, i)))
        .collect();
    assert_eq!(ids, expected);
}

#[tokio::test]
async fn data_survives_reopen() {
    let (config, _temp_dir) = create_test_config();
    {
        let index = open_index(&config).await;
        index
            .upsert(COLLECTION, runbook_dataset())
            .await
            .expect("store");
    }

    let reopened = open_index(&config).await;
    assert_eq!(reopened.count(COLLECTION).await.expect("count"), 4);

    let dataset = runbook_dataset();
    let hits = reopened
        .search(COLLECTION, &dataset[3].embedding, 1)
        .await
        .expect("search after reopen");
    assert_eq!(hits[0].id, "200_0");
}
