//! Deterministic offline embedder.
//!
//! Each lowercase alphanumeric token is hashed with SHA-256 into one of
//! `dims` buckets with a hash-derived sign, and the resulting count vector
//! is L2-normalized. Texts sharing vocabulary land close together; texts
//! with no shared tokens are near-orthogonal. No model, no network.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use support_harness_core::embedding::{normalize, validate_input, Embedder};
use support_harness_core::Result;

pub const DEFAULT_DIMS: usize = 256;

pub struct HashEmbedder {
    dims: usize,
    max_input_chars: usize,
}

impl HashEmbedder {
    pub fn new(dims: usize, max_input_chars: usize) -> Self {
        Self {
            dims: dims.max(1),
            max_input_chars,
        }
    }

    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dims];
        for token in tokens(text) {
            let digest = Sha256::digest(token.as_bytes());
            let mut bucket = [0u8; 8];
            bucket.copy_from_slice(&digest[..8]);
            let index = (u64::from_le_bytes(bucket) % self.dims as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[index] += sign;
        }
        normalize(&mut vector);
        vector
    }
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn model_name(&self) -> &str {
        "feature-hash"
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        validate_input(text, self.max_input_chars)?;
        Ok(self.embed_sync(text))
    }
}
