use super::*;
use crate::config::ConfigError;
use crate::source::Document;
use crate::test_support::{mount_echo_chat, mount_keyword_embedder, test_config};
use crate::RagError;
use wiremock::MockServer;

struct Runbooks;

impl ContentSource for Runbooks {
    fn fetch_document_set(&self, _root_id: &str) -> Result<Vec<Document>> {
        Ok(vec![
            Document::new("A", "restart nginx"),
            Document::new("B", "backup the database"),
        ])
    }
}

#[test]
fn readiness_is_shared_and_sticky() {
    let readiness = Readiness::default();
    let shared = readiness.clone();
    assert!(!shared.is_ready());

    readiness.mark_ready();
    readiness.mark_ready();

    assert!(shared.is_ready());
}

#[tokio::test]
async fn fresh_pipeline_is_not_ready() {
    let server = MockServer::start().await;
    let (config, _temp_dir) = test_config(&server.uri());

    let pipeline = Pipeline::with_source(&config, Arc::new(Runbooks))
        .await
        .expect("pipeline");

    assert!(!pipeline.is_ready());
    assert_eq!(pipeline.document_count().await.expect("count"), 0);
    assert_eq!(pipeline.collection(), "ops_docs");
    assert!(matches!(
        pipeline.query("restart?").await,
        Err(RagError::NotInitialized)
    ));
}

#[tokio::test]
async fn init_then_query() {
    let server = MockServer::start().await;
    mount_keyword_embedder(&server).await;
    mount_echo_chat(&server).await;
    let (mut config, _temp_dir) = test_config(&server.uri());
    config.vector_db.top_k = 1;

    let pipeline = Pipeline::with_source(&config, Arc::new(Runbooks))
        .await
        .expect("pipeline");
    let report = pipeline.init("100").await.expect("init");

    assert_eq!(report.added, 2);
    assert!(pipeline.is_ready());
    let answer = pipeline.query("how to restart?").await.expect("query");
    assert_eq!(
        answer,
        "echo: Context:\nrestart nginx\n\nQuestion: how to restart?"
    );
}

#[tokio::test]
async fn reopened_pipeline_recovers_readiness() {
    let server = MockServer::start().await;
    mount_keyword_embedder(&server).await;
    let (config, _temp_dir) = test_config(&server.uri());

    {
        let pipeline = Pipeline::with_source(&config, Arc::new(Runbooks))
            .await
            .expect("pipeline");
        pipeline.init("100").await.expect("init");
    }

    let reopened = Pipeline::with_source(&config, Arc::new(Runbooks))
        .await
        .expect("reopened pipeline");
    assert!(reopened.is_ready());
    assert_eq!(reopened.document_count().await.expect("count"), 2);
}

#[tokio::test]
async fn invalid_config_is_rejected() {
    let (mut config, _temp_dir) = test_config("http://localhost:9999");
    config.chunking.overlap = config.chunking.chunk_size;

    let result = Pipeline::with_source(&config, Arc::new(Runbooks)).await;

    let expected =
        ConfigError::OverlapTooLarge(config.chunking.overlap, config.chunking.chunk_size);
    assert!(matches!(result, Err(RagError::Config(message)) if message == expected.to_string()));
}
