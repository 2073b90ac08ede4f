//! Local inference via fastembed. The model is downloaded from Hugging Face
//! on first use and cached; later calls run offline.

use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use tokio::sync::OnceCell;

use support_harness_core::embedding::{check_dims, validate_input, Embedder};
use support_harness_core::RagError;

use crate::config::EmbeddingConfig;

pub struct LocalEmbedder {
    model_name: String,
    model: EmbeddingModel,
    dims: usize,
    max_input_chars: usize,
    loaded: OnceCell<Arc<Mutex<TextEmbedding>>>,
}

impl LocalEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model_name = config
            .model
            .clone()
            .unwrap_or_else(|| "all-minilm-l6-v2".to_string());
        let (model, default_dims) = resolve_model(&model_name)?;
        Ok(Self {
            model_name,
            model,
            dims: config.dims.unwrap_or(default_dims),
            max_input_chars: config.max_input_chars,
            loaded: OnceCell::new(),
        })
    }

    async fn handle(&self) -> support_harness_core::Result<Arc<Mutex<TextEmbedding>>> {
        let model = self.model.clone();
        self.loaded
            .get_or_try_init(|| async move {
                tokio::task::spawn_blocking(move || {
                    TextEmbedding::try_new(InitOptions::new(model).with_show_download_progress(false))
                        .map(|m| Arc::new(Mutex::new(m)))
                        .map_err(|e| RagError::unavailable(format!("failed to load local model: {}", e)))
                })
                .await
                .map_err(|e| RagError::unavailable(format!("model loader panicked: {}", e)))?
            })
            .await
            .cloned()
    }
}

fn resolve_model(name: &str) -> Result<(EmbeddingModel, usize)> {
    Ok(match name {
        "all-minilm-l6-v2" => (EmbeddingModel::AllMiniLML6V2, 384),
        "bge-small-en-v1.5" => (EmbeddingModel::BGESmallENV15, 384),
        "bge-base-en-v1.5" => (EmbeddingModel::BGEBaseENV15, 768),
        "bge-large-en-v1.5" => (EmbeddingModel::BGELargeENV15, 1024),
        "nomic-embed-text-v1.5" => (EmbeddingModel::NomicEmbedTextV15, 768),
        "multilingual-e5-small" => (EmbeddingModel::MultilingualE5Small, 384),
        other => bail!(
            "Unknown local embedding model: '{}'. Supported models: \
             all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5, \
             nomic-embed-text-v1.5, multilingual-e5-small",
            other
        ),
    })
}

#[async_trait]
impl Embedder for LocalEmbedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> support_harness_core::Result<Vec<f32>> {
        validate_input(text, self.max_input_chars)?;
        let handle = self.handle().await?;
        let input = vec![text.to_string()];

        let mut vectors = tokio::task::spawn_blocking(move || {
            let mut model = handle
                .lock()
                .map_err(|_| RagError::storage("local embedding model lock poisoned"))?;
            model
                .embed(input, None)
                .map_err(|e| RagError::unavailable(format!("local embedding failed: {}", e)))
        })
        .await
        .map_err(|e| RagError::unavailable(format!("embedding task panicked: {}", e)))??;

        let vector = vectors
            .pop()
            .ok_or_else(|| RagError::storage("local model returned no embedding"))?;
        check_dims(self.dims, &vector)?;
        Ok(vector)
    }
}
