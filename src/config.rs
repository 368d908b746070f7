use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub storage: StorageConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Root data directory. Raw files live under `raw/<scope>/`, the ledger
    /// at `ingested.json`, and the SQLite database at `cairn.db`.
    pub data_dir: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Window size in characters.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Characters shared between consecutive windows. Must be < chunk_size.
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}
fn default_overlap() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    /// Base URL of an Ollama-compatible inference server.
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    /// Model used for triple extraction; falls back to `model` when unset.
    #[serde(default)]
    pub extraction_model: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Total attempts per logical operation (rewrite, extraction, synthesis).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Linear backoff step: attempt N sleeps N * backoff_ms before retrying.
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            model: default_llm_model(),
            extraction_model: None,
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

fn default_llm_base_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_llm_model() -> String {
    "llama3.2".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    3
}
fn default_backoff_ms() -> u64 {
    1500
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `ollama`, `openai`, or `disabled`.
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    /// Base URL for the ollama provider.
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            base_url: default_llm_base_url(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            backoff_ms: default_backoff_ms(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_embedding_provider() -> String {
    "ollama".to_string()
}
fn default_embedding_model() -> String {
    "nomic-embed-text".to_string()
}
fn default_batch_size() -> usize {
    32
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Chunks returned by vector search.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Keywords derived from retrieved chunks for the graph lookup.
    #[serde(default = "default_keyword_top_k")]
    pub keyword_top_k: usize,
    /// Cap on graph triples included in the synthesis prompt.
    #[serde(default = "default_graph_limit")]
    pub graph_limit: i64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            keyword_top_k: default_keyword_top_k(),
            graph_limit: default_graph_limit(),
        }
    }
}

fn default_top_k() -> usize {
    3
}
fn default_keyword_top_k() -> usize {
    5
}
fn default_graph_limit() -> i64 {
    25
}

impl Config {
    pub fn raw_dir(&self, scope: &str) -> PathBuf {
        self.storage.data_dir.join("raw").join(scope)
    }

    pub fn raw_root(&self) -> PathBuf {
        self.storage.data_dir.join("raw")
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.storage.data_dir.join("ingested.json")
    }

    pub fn db_path(&self) -> PathBuf {
        self.storage.data_dir.join("cairn.db")
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }

    // A window that advances by chunk_size - overlap characters never
    // terminates when overlap >= chunk_size; reject it up front.
    if config.chunking.overlap >= config.chunking.chunk_size {
        anyhow::bail!(
            "chunking.overlap ({}) must be smaller than chunking.chunk_size ({})",
            config.chunking.overlap,
            config.chunking.chunk_size
        );
    }

    if config.retrieval.top_k < 1 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }
    if config.retrieval.graph_limit < 1 {
        anyhow::bail!("retrieval.graph_limit must be >= 1");
    }
    if config.llm.max_retries < 1 {
        anyhow::bail!("llm.max_retries must be >= 1");
    }

    match config.embedding.provider.as_str() {
        "ollama" | "openai" | "disabled" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be ollama, openai, or disabled.",
            other
        ),
    }

    Ok(())
}
