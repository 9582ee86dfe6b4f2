
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

use crate::embeddings::chunking::ChunkingConfig;
use crate::embeddings::client::DEFAULT_EMBEDDING_DIMENSION;

pub const API_KEY_ENV: &str = "OPS_RAG_API_KEY";
pub const WIKI_PASSWORD_ENV: &str = "OPS_RAG_WIKI_PASSWORD";

const DEFAULT_SYSTEM_PROMPT: &str = "You are an operations and maintenance assistant. Use the following context to answer questions:";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub wiki: WikiConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub vector_db: VectorDbConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

/// Connection settings for the wiki the documents are fetched from
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WikiConfig {
    pub domain: String,
    pub username: String,
    pub password: String,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
}

impl Default for WikiConfig {
    fn default() -> Self {
        Self {
            domain: "https://wiki.example.com/".to_string(),
            username: String::new(),
            password: String::new(),
            timeout_seconds: 10,
            max_retries: 3,
            backoff_base_ms: 1000,
        }
    }
}

/// OpenAI-compatible provider serving both embeddings and chat completions
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout_seconds: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.siliconflow.cn/v1/".to_string(),
            api_key: String::new(),
            timeout_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub model: String,
    pub dimension: u32,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "BAAI/bge-large-zh-v1.5".to_string(),
            dimension: DEFAULT_EMBEDDING_DIMENSION,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChatConfig {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub system_prompt: String,
    /// A streamed answer fails when the model sends nothing for this long
    pub stream_idle_timeout_ms: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            model: "deepseek-ai/DeepSeek-V2.5".to_string(),
            temperature: 0.7,
            max_tokens: 1000,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            stream_idle_timeout_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct VectorDbConfig {
    /// Relative paths are resolved against the config directory
    pub persist_directory: PathBuf,
    pub collection: String,
    pub top_k: usize,
}

impl Default for VectorDbConfig {
    fn default() -> Self {
        Self {
            persist_directory: PathBuf::from("vectors"),
            collection: "ops_docs".to_string(),
            top_k: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct IngestConfig {
    /// Number of documents embedded at the same time
    pub concurrency: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self { concurrency: 4 }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid embedding dimension: {0} (must be between 1 and 8192)")]
    InvalidEmbeddingDimension(u32),
    #[error("Invalid chunk size: {0} (must be between 1 and 8192)")]
    InvalidChunkSize(usize),
    #[error("Overlap ({0}) must be smaller than chunk size ({1})")]
    OverlapTooLarge(usize, usize),
    #[error("Invalid temperature: {0} (must be between 0 and 2)")]
    InvalidTemperature(f32),
    #[error("Invalid max tokens: {0} (must be greater than 0)")]
    InvalidMaxTokens(u32),
    #[error("Invalid stream idle timeout: {0} ms (must be between 1 and 600000)")]
    InvalidStreamIdleTimeout(u64),
    #[error("Invalid top k: {0} (must be between 1 and 100)")]
    InvalidTopK(usize),
    #[error("Invalid collection name: {0:?} (must be non-empty alphanumeric, '_' or '-')")]
    InvalidCollection(String),
    #[error("Invalid concurrency: {0} (must be between 1 and 64)")]
    InvalidConcurrency(usize),
    #[error("Invalid timeout: {0} (must be between 1 and 600 seconds)")]
    InvalidTimeout(u64),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Config {
    /// Default configuration directory, `~/.ops-rag`
    #[inline]
    pub fn default_dir() -> Result<PathBuf, ConfigError> {
        dirs::home_dir()
            .map(|home| home.join(".ops-rag"))
            .ok_or(ConfigError::DirectoryError)
    }

    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join("config.toml");

        let mut config = if config_path.exists() {
            let content = fs::read_to_string(&config_path).with_context(|| {
                format!("Failed to read config file: {}", config_path.display())
            })?;
            toml::from_str::<Config>(&content).with_context(|| {
                format!("Failed to parse config file: {}", config_path.display())
            })?
        } else {
            Self::default()
        };
        config.base_dir = config_dir.as_ref().to_path_buf();
        config.apply_env_overrides();

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    /// Secrets may come from the environment instead of the config file
    #[inline]
    pub fn apply_env_overrides(&mut self) {
        if let Ok(api_key) = env::var(API_KEY_ENV) {
            self.llm.api_key = api_key;
        }
        if let Ok(password) = env::var(WIKI_PASSWORD_ENV) {
            self.wiki.password = password;
        }
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        let config_dir = self.get_base_dir();

        fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        let config_path = self.config_file_path();
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    #[inline]
    pub fn get_base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[inline]
    pub fn config_file_path(&self) -> PathBuf {
        self.get_base_dir().join("config.toml")
    }

    /// Directory holding the LanceDB tables
    #[inline]
    pub fn vector_database_path(&self) -> PathBuf {
        if self.vector_db.persist_directory.is_absolute() {
            self.vector_db.persist_directory.clone()
        } else {
            self.get_base_dir().join(&self.vector_db.persist_directory)
        }
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.wiki.validate()?;
        self.llm.validate()?;
        self.embedding.validate()?;
        self.chat.validate()?;
        self.vector_db.validate()?;
        self.validate_chunking_config()?;

        if !(1..=64).contains(&self.ingest.concurrency) {
            return Err(ConfigError::InvalidConcurrency(self.ingest.concurrency));
        }

        Ok(())
    }

    fn validate_chunking_config(&self) -> Result<(), ConfigError> {
        let config = &self.chunking;

        if !(1..=8192).contains(&config.chunk_size) {
            return Err(ConfigError::InvalidChunkSize(config.chunk_size));
        }

        // The window stride is chunk_size - overlap and has to stay positive
        if config.overlap >= config.chunk_size {
            return Err(ConfigError::OverlapTooLarge(
                config.overlap,
                config.chunk_size,
            ));
        }

        Ok(())
    }
}

impl WikiConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.base_url()?;
        validate_timeout(self.timeout_seconds)
    }

    /// Wiki root with a trailing slash so relative API paths join below it
    #[inline]
    pub fn base_url(&self) -> Result<Url, ConfigError> {
        parse_base_url(&self.domain)
    }
}

impl LlmConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.url()?;
        validate_timeout(self.timeout_seconds)
    }

    #[inline]
    pub fn url(&self) -> Result<Url, ConfigError> {
        parse_base_url(&self.base_url)
    }
}

impl EmbeddingConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.model.clone()));
        }

        if !(1..=8192).contains(&self.dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(self.dimension));
        }

        Ok(())
    }
}

impl ChatConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.model.clone()));
        }

        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::InvalidTemperature(self.temperature));
        }

        if self.max_tokens == 0 {
            return Err(ConfigError::InvalidMaxTokens(self.max_tokens));
        }

        if !(1..=600_000).contains(&self.stream_idle_timeout_ms) {
            return Err(ConfigError::InvalidStreamIdleTimeout(
                self.stream_idle_timeout_ms,
            ));
        }

        Ok(())
    }
}

impl VectorDbConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_name = !self.collection.is_empty()
            && self
                .collection
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid_name {
            return Err(ConfigError::InvalidCollection(self.collection.clone()));
        }

        if !(1..=100).contains(&self.top_k) {
            return Err(ConfigError::InvalidTopK(self.top_k));
        }

        Ok(())
    }
}

fn validate_timeout(seconds: u64) -> Result<(), ConfigError> {
    if (1..=600).contains(&seconds) {
        Ok(())
    } else {
        Err(ConfigError::InvalidTimeout(seconds))
    }
}

fn parse_base_url(raw: &str) -> Result<Url, ConfigError> {
    let mut url = Url::parse(raw.trim()).map_err(|_| ConfigError::InvalidUrl(raw.to_string()))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(raw.to_string()));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}
