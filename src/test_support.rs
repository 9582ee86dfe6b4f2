//! Fake model provider shared by the unit tests

use serde_json::{Value, json};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

use crate::config::Config;

pub(crate) const KEYWORDS: [&str; 3] = ["restart", "backup", "deploy"];
pub(crate) const FAKE_DIMENSION: u32 = 4;
/// Any embedding input containing this marker gets an HTTP 500
pub(crate) const FAILURE_MARKER: &str = "EXPLODE";

/// Embeds text as keyword counts plus a constant component, so that texts
/// sharing keywords end up close under cosine distance
pub(crate) struct KeywordEmbedder;

pub(crate) fn keyword_vector(text: &str) -> Vec<f32> {
    let lowered = text.to_lowercase();
    let mut vector: Vec<f32> = KEYWORDS
        .iter()
        .map(|keyword| lowered.matches(keyword).count() as f32)
        .collect();
    vector.push(0.1);
    vector
}

impl Respond for KeywordEmbedder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let Ok(body) = serde_json::from_slice::<Value>(&request.body) else {
            return ResponseTemplate::new(400).set_body_string("invalid json");
        };
        let input = body["input"].as_str().unwrap_or_default();
        if input.contains(FAILURE_MARKER) {
            return ResponseTemplate::new(500).set_body_string("upstream exploded");
        }

        ResponseTemplate::new(200)
            .set_body_json(json!({"data": [{"embedding": keyword_vector(input)}]}))
    }
}

/// Answers with the user turn it received, so tests can see the grounding context
pub(crate) struct EchoChat;

impl Respond for EchoChat {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let Ok(body) = serde_json::from_slice::<Value>(&request.body) else {
            return ResponseTemplate::new(400).set_body_string("invalid json");
        };
        let user_turn = body["messages"][1]["content"].as_str().unwrap_or_default();

        ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": format!("echo: {}", user_turn)}}]
        }))
    }
}

pub(crate) async fn mount_keyword_embedder(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(KeywordEmbedder)
        .mount(server)
        .await;
}

pub(crate) async fn mount_echo_chat(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(EchoChat)
        .mount(server)
        .await;
}

/// Config pointing every service at `server` and the vector store into a temp dir
pub(crate) fn test_config(server_uri: &str) -> (Config, TempDir) {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut config = Config {
        base_dir: temp_dir.path().to_path_buf(),
        ..Config::default()
    };
    config.llm.base_url = format!("{}/v1", server_uri);
    config.llm.api_key = "sk-test".to_string();
    config.llm.timeout_seconds = 5;
    config.wiki.domain = format!("{}/wiki", server_uri);
    config.wiki.backoff_base_ms = 1;
    config.embedding.dimension = FAKE_DIMENSION;
    config.chunking.chunk_size = 8;
    config.chunking.overlap = 2;
    (config, temp_dir)
}
