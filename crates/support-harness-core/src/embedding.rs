//! Embedder capability trait and vector utilities.
//!
//! Defines the [`Embedder`] trait that every embedding backend implements,
//! plus pure helpers for vector serialization and similarity computation.
//!
//! Concrete backends (OpenAI, Ollama, fastembed, feature hashing) live in
//! the `support-harness` app crate.

use async_trait::async_trait;

use crate::error::{RagError, Result};

/// Turns text into a fixed-length vector.
///
/// Every vector returned by one embedder has exactly [`dims`](Embedder::dims)
/// components. Implementations fail with
/// [`ProviderUnavailable`](RagError::ProviderUnavailable) on network errors
/// and [`InvalidInput`](RagError::InvalidInput) on empty text.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;
    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Reject text an embedder must never see: empty, blank, or longer than
/// `max_chars` characters.
pub fn validate_input(text: &str, max_chars: usize) -> Result<()> {
    if text.trim().is_empty() {
        return Err(RagError::invalid("text to embed must not be empty"));
    }
    let len = text.chars().count();
    if len > max_chars {
        return Err(RagError::invalid(format!(
            "text to embed is {} characters, limit is {}",
            len, max_chars
        )));
    }
    Ok(())
}

/// Check a vector against the dimensionality the index expects.
pub fn check_dims(expected: usize, vector: &[f32]) -> Result<()> {
    if vector.len() != expected {
        return Err(RagError::DimensionMismatch {
            expected,
            actual: vector.len(),
        });
    }
    Ok(())
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// ```rust
/// use support_harness_core::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12);
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`, or `0.0` for empty vectors or
/// vectors of different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

/// Scale a vector to unit length in place. Zero vectors are left alone.
pub fn normalize(vec: &mut [f32]) {
    let norm = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in vec.iter_mut() {
            *x /= norm;
        }
    }
}
