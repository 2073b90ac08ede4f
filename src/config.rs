//! Configuration parsing and validation.
//!
//! Support Harness is configured with a single TOML file. Every backend is
//! chosen from a closed set of variants at startup; an unknown provider
//! name is a parse error, never a runtime surprise.
//!
//! # Example
//!
//! ```toml
//! [db]
//! path = "./data/support.sqlite"
//!
//! [chunking]
//! window_chars = 500
//! overlap_fraction = 0.15
//!
//! [retrieval]
//! top_k = 5
//! similarity_threshold = 0.75
//!
//! [embedding]
//! provider = "ollama"          # openai | ollama | local | hash
//! model = "nomic-embed-text"
//! dims = 768
//!
//! [vector_store]
//! provider = "sqlite"          # sqlite | memory | qdrant
//!
//! [generation]
//! provider = "ollama"          # openai | ollama | extractive
//! model = "llama3.2"
//!
//! [conversation]
//! max_history_turns = 5
//! fallback_mode = "generate"   # generate | canned
//!
//! [server]
//! bind = "127.0.0.1:8000"
//! ```
//!
//! Secrets are read from the environment: `OPENAI_API_KEY`, `QDRANT_API_KEY`.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use support_harness_core::chat::{ChatSettings, FallbackMode};
use support_harness_core::chunk::ChunkingParams;
use support_harness_core::prompt::DEFAULT_FALLBACK_MESSAGE;
use support_harness_core::retrieval::RetrievalParams;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub vector_store: VectorStoreConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub conversation: ConversationConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_window_chars")]
    pub window_chars: usize,
    #[serde(default = "default_overlap_fraction")]
    pub overlap_fraction: f32,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            window_chars: default_window_chars(),
            overlap_fraction: default_overlap_fraction(),
        }
    }
}

fn default_window_chars() -> usize {
    500
}
fn default_overlap_fraction() -> f32 {
    0.15
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            similarity_threshold: default_similarity_threshold(),
        }
    }
}

fn default_top_k() -> usize {
    5
}
fn default_similarity_threshold() -> f32 {
    0.75
}

/// Embedding backend variants.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderKind {
    Openai,
    Ollama,
    Local,
    Hash,
}

impl EmbeddingProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Openai => "openai",
            Self::Ollama => "ollama",
            Self::Local => "local",
            Self::Hash => "hash",
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: EmbeddingProviderKind,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            url: None,
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            backoff_ms: default_backoff_ms(),
            max_input_chars: default_max_input_chars(),
        }
    }
}

fn default_embedding_provider() -> EmbeddingProviderKind {
    EmbeddingProviderKind::Hash
}
fn default_max_retries() -> u32 {
    3
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_backoff_ms() -> u64 {
    500
}
fn default_max_input_chars() -> usize {
    32_000
}

/// Vector store backend variants.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VectorStoreKind {
    Sqlite,
    Memory,
    Qdrant,
}

impl VectorStoreKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Memory => "memory",
            Self::Qdrant => "qdrant",
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct VectorStoreConfig {
    #[serde(default = "default_vector_store")]
    pub provider: VectorStoreKind,
    /// Base URL of the Qdrant REST API.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_store_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            provider: default_vector_store(),
            url: None,
            collection: default_collection(),
            max_retries: default_max_retries(),
            timeout_secs: default_store_timeout_secs(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

fn default_vector_store() -> VectorStoreKind {
    VectorStoreKind::Sqlite
}
fn default_collection() -> String {
    "support_chunks".to_string()
}
fn default_store_timeout_secs() -> u64 {
    10
}

/// Generation backend variants.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GenerationProviderKind {
    Openai,
    Ollama,
    Extractive,
}

impl GenerationProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Openai => "openai",
            Self::Ollama => "ollama",
            Self::Extractive => "extractive",
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_generation_provider")]
    pub provider: GenerationProviderKind,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_generation_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            model: None,
            url: None,
            timeout_secs: default_generation_timeout_secs(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_generation_provider() -> GenerationProviderKind {
    GenerationProviderKind::Extractive
}
fn default_generation_timeout_secs() -> u64 {
    60
}
fn default_temperature() -> f32 {
    0.1
}
fn default_max_tokens() -> u32 {
    500
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FallbackModeKind {
    Generate,
    Canned,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConversationConfig {
    #[serde(default = "default_max_history_turns")]
    pub max_history_turns: usize,
    #[serde(default = "default_fallback_mode")]
    pub fallback_mode: FallbackModeKind,
    #[serde(default = "default_fallback_message")]
    pub fallback_message: String,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            max_history_turns: default_max_history_turns(),
            fallback_mode: default_fallback_mode(),
            fallback_message: default_fallback_message(),
        }
    }
}

fn default_max_history_turns() -> usize {
    5
}
fn default_fallback_mode() -> FallbackModeKind {
    FallbackModeKind::Generate
}
fn default_fallback_message() -> String {
    DEFAULT_FALLBACK_MESSAGE.to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset (e.g. `"info"`, `"support_harness=debug"`).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// A config with every section defaulted and the database at `db_path`.
    pub fn with_db_path(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db: DbConfig {
                path: db_path.into(),
            },
            chunking: ChunkingConfig::default(),
            retrieval: RetrievalConfig::default(),
            embedding: EmbeddingConfig::default(),
            vector_store: VectorStoreConfig::default(),
            generation: GenerationConfig::default(),
            conversation: ConversationConfig::default(),
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    pub fn chunking_params(&self) -> Result<ChunkingParams> {
        Ok(ChunkingParams::new(
            self.chunking.window_chars,
            self.chunking.overlap_fraction,
        )?)
    }

    pub fn retrieval_params(&self) -> Result<RetrievalParams> {
        Ok(RetrievalParams::new(
            self.retrieval.top_k,
            self.retrieval.similarity_threshold,
        )?)
    }

    pub fn chat_settings(&self) -> Result<ChatSettings> {
        let fallback = match self.conversation.fallback_mode {
            FallbackModeKind::Generate => FallbackMode::Generate,
            FallbackModeKind::Canned => {
                FallbackMode::Canned(self.conversation.fallback_message.clone())
            }
        };
        Ok(ChatSettings {
            retrieval: self.retrieval_params()?,
            max_history_turns: self.conversation.max_history_turns,
            fallback,
        })
    }

    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        self.chunking_params()?;
        self.retrieval_params()?;

        match self.embedding.provider {
            EmbeddingProviderKind::Openai | EmbeddingProviderKind::Ollama => {
                if self.embedding.model.is_none() {
                    bail!(
                        "embedding.model must be specified when provider is '{}'",
                        self.embedding.provider.as_str()
                    );
                }
                if self.embedding.dims.is_none() || self.embedding.dims == Some(0) {
                    bail!(
                        "embedding.dims must be > 0 when provider is '{}'",
                        self.embedding.provider.as_str()
                    );
                }
            }
            EmbeddingProviderKind::Local | EmbeddingProviderKind::Hash => {
                if self.embedding.dims == Some(0) {
                    bail!("embedding.dims must be > 0");
                }
            }
        }
        if self.embedding.max_input_chars == 0 {
            bail!("embedding.max_input_chars must be > 0");
        }
        if self.embedding.max_input_chars < self.chunking.window_chars {
            bail!(
                "embedding.max_input_chars ({}) must be >= chunking.window_chars ({})",
                self.embedding.max_input_chars,
                self.chunking.window_chars
            );
        }
        if self.embedding.timeout_secs == 0 || self.vector_store.timeout_secs == 0 {
            bail!("provider timeout_secs must be > 0");
        }
        if self.generation.timeout_secs == 0 {
            bail!("generation.timeout_secs must be > 0");
        }

        if self.vector_store.provider == VectorStoreKind::Qdrant && self.vector_store.url.is_none() {
            bail!("vector_store.url is required when provider is 'qdrant'");
        }
        if self.vector_store.collection.trim().is_empty() {
            bail!("vector_store.collection must not be empty");
        }

        if self.generation.provider != GenerationProviderKind::Extractive
            && self.generation.model.is_none()
        {
            bail!(
                "generation.model must be specified when provider is '{}'",
                self.generation.provider.as_str()
            );
        }
        if !(0.0..=2.0).contains(&self.generation.temperature) {
            bail!("generation.temperature must be in [0.0, 2.0]");
        }

        if self.conversation.fallback_mode == FallbackModeKind::Canned
            && self.conversation.fallback_message.trim().is_empty()
        {
            bail!("conversation.fallback_message must not be empty in canned mode");
        }

        Ok(())
    }
}

/// Parse a config from TOML text and validate it.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    config.validate()?;
    Ok(config)
}

/// Read, parse, and validate the config file at `path`.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content).with_context(|| format!("Invalid config: {}", path.display()))
}
