//! Embedding backends.
//!
//! | `[embedding] provider` | Backend | Network |
//! |------------------------|---------|---------|
//! | `openai` | [`OpenAiEmbedder`], `POST /v1/embeddings` | yes, `OPENAI_API_KEY` |
//! | `ollama` | [`OllamaEmbedder`], `POST /api/embed` | yes |
//! | `local` | `LocalEmbedder` via fastembed (feature `local-embeddings`) | model download only |
//! | `hash` | [`HashEmbedder`], feature hashing | no |
//!
//! Backends make one attempt per call. Timeouts and retries are applied
//! by [`crate::guard::Guarded`]; see [`crate::providers`].

mod hash;
#[cfg(feature = "local-embeddings")]
mod local;

pub use hash::HashEmbedder;
#[cfg(feature = "local-embeddings")]
pub use local::LocalEmbedder;

use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::json;

use support_harness_core::embedding::{check_dims, validate_input, Embedder};
use support_harness_core::RagError;

use crate::config::{EmbeddingConfig, EmbeddingProviderKind};
use crate::remote;

const OPENAI_URL: &str = "https://api.openai.com/v1";
const OLLAMA_URL: &str = "http://localhost:11434";

/// Create the configured embedder, unguarded.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Box<dyn Embedder>> {
    match config.provider {
        EmbeddingProviderKind::Openai => Ok(Box::new(OpenAiEmbedder::new(config)?)),
        EmbeddingProviderKind::Ollama => Ok(Box::new(OllamaEmbedder::new(config)?)),
        EmbeddingProviderKind::Hash => Ok(Box::new(HashEmbedder::new(
            config.dims.unwrap_or(hash::DEFAULT_DIMS),
            config.max_input_chars,
        ))),
        #[cfg(feature = "local-embeddings")]
        EmbeddingProviderKind::Local => Ok(Box::new(LocalEmbedder::new(config)?)),
        #[cfg(not(feature = "local-embeddings"))]
        EmbeddingProviderKind::Local => {
            bail!("Local embedding provider requires --features local-embeddings")
        }
    }
}

fn required_model(config: &EmbeddingConfig, provider: &str) -> Result<(String, usize)> {
    let Some(model) = config.model.clone() else {
        bail!("embedding.model required for {} provider", provider);
    };
    let Some(dims) = config.dims else {
        bail!("embedding.dims required for {} provider", provider);
    };
    Ok((model, dims))
}

// ============ OpenAI ============

pub struct OpenAiEmbedder {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
    dims: usize,
    max_input_chars: usize,
}

impl OpenAiEmbedder {
    /// # Errors
    ///
    /// Fails if `model` or `dims` is missing, or `OPENAI_API_KEY` is unset.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let (model, dims) = required_model(config, "OpenAI")?;
        let Ok(api_key) = std::env::var("OPENAI_API_KEY") else {
            bail!("OPENAI_API_KEY environment variable not set");
        };
        Ok(Self {
            client: remote::client(Duration::from_secs(config.timeout_secs))?,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| OPENAI_URL.to_string()),
            api_key,
            model,
            dims,
            max_input_chars: config.max_input_chars,
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> support_harness_core::Result<Vec<f32>> {
        validate_input(text, self.max_input_chars)?;
        let url = format!("{}/embeddings", self.url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&json!({ "model": self.model, "input": [text] }))
            .send()
            .await
            .map_err(|e| remote::send_error("OpenAI", &url, e))?;
        let body = remote::json_body("OpenAI", response).await?;
        let vector = parse_openai_response(&body)?;
        check_dims(self.dims, &vector)?;
        Ok(vector)
    }
}

fn parse_openai_response(json: &serde_json::Value) -> support_harness_core::Result<Vec<f32>> {
    let first = json
        .get("data")
        .and_then(|d| d.as_array())
        .and_then(|d| d.first())
        .ok_or_else(|| RagError::storage("invalid OpenAI response: missing data array"))?;
    remote::parse_vector("OpenAI", first.get("embedding"))
}

// ============ Ollama ============

/// Requires Ollama running with the model pulled (`ollama pull nomic-embed-text`).
pub struct OllamaEmbedder {
    client: reqwest::Client,
    url: String,
    model: String,
    dims: usize,
    max_input_chars: usize,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let (model, dims) = required_model(config, "Ollama")?;
        Ok(Self {
            client: remote::client(Duration::from_secs(config.timeout_secs))?,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| OLLAMA_URL.to_string()),
            model,
            dims,
            max_input_chars: config.max_input_chars,
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> support_harness_core::Result<Vec<f32>> {
        validate_input(text, self.max_input_chars)?;
        let url = format!("{}/api/embed", self.url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .json(&json!({ "model": self.model, "input": [text] }))
            .send()
            .await
            .map_err(|e| remote::send_error("Ollama", &url, e))?;
        let body = remote::json_body("Ollama", response).await?;
        let vector = parse_ollama_response(&body)?;
        check_dims(self.dims, &vector)?;
        Ok(vector)
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> support_harness_core::Result<Vec<f32>> {
    let first = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .and_then(|e| e.first());
    remote::parse_vector("Ollama", first)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_openai_response() {
        let body = json!({"data": [{"index": 0, "embedding": [0.1, 0.2]}]});
        assert_eq!(parse_openai_response(&body).unwrap(), vec![0.1, 0.2]);
        assert!(parse_openai_response(&json!({"data": []})).is_err());
    }

    #[test]
    fn test_parse_ollama_response() {
        let body = json!({"model": "nomic-embed-text", "embeddings": [[1.0, 0.0, -1.0]]});
        assert_eq!(parse_ollama_response(&body).unwrap(), vec![1.0, 0.0, -1.0]);
        assert!(parse_ollama_response(&json!({})).is_err());
    }

    #[test]
    fn test_remote_embedders_require_model() {
        let config = EmbeddingConfig {
            provider: EmbeddingProviderKind::Ollama,
            ..EmbeddingConfig::default()
        };
        let err = create_embedder(&config).err().unwrap();
        assert!(err.to_string().contains("embedding.model"));
    }

    #[test]
    fn test_hash_is_default_offline_backend() {
        let embedder = create_embedder(&EmbeddingConfig::default()).unwrap();
        assert_eq!(embedder.model_name(), "feature-hash");
        assert_eq!(embedder.dims(), hash::DEFAULT_DIMS);
    }

    #[tokio::test]
    async fn test_unreachable_ollama_is_unavailable() {
        let config = EmbeddingConfig {
            provider: EmbeddingProviderKind::Ollama,
            model: Some("nomic-embed-text".into()),
            dims: Some(768),
            url: Some("http://127.0.0.1:9".into()),
            timeout_secs: 2,
            ..EmbeddingConfig::default()
        };
        let embedder = create_embedder(&config).unwrap();
        let err = embedder.embed("hello").await.unwrap_err();
        assert!(matches!(err, RagError::ProviderUnavailable(_)));
    }
}
