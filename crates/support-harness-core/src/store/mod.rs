//! Vector storage abstraction.
//!
//! The [`VectorStore`] trait is the single persistence seam for chunks:
//! ingestion writes through it, retrieval reads through it, and the
//! document listing is derived from [`VectorStore::list`]. Backends
//! (in-memory, SQLite, Qdrant) must agree on ordering: descending
//! similarity, ties broken by the newer `created_at`, then by chunk id.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use std::cmp::Ordering;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;
use crate::models::{ChunkMetadata, StoredChunk};

/// Restricts which chunks a query or listing may return.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryFilter {
    /// Only these chunk ids. `None` or an empty list means no restriction;
    /// ids that do not exist are ignored.
    pub chunk_ids: Option<Vec<String>>,
    /// Only chunks tagged with exactly this product version.
    pub product_version: Option<String>,
}

impl QueryFilter {
    pub fn new(chunk_ids: Option<Vec<String>>, product_version: Option<String>) -> Self {
        Self {
            chunk_ids: chunk_ids.filter(|ids| !ids.is_empty()),
            product_version,
        }
    }

    pub fn matches(&self, chunk_id: &str, metadata: &ChunkMetadata) -> bool {
        if let Some(ids) = &self.chunk_ids {
            if !ids.is_empty() && !ids.iter().any(|id| id == chunk_id) {
                return false;
            }
        }
        if let Some(version) = &self.product_version {
            if metadata.product_version.as_deref() != Some(version.as_str()) {
                return false;
            }
        }
        true
    }
}

/// One ranked result from [`VectorStore::query`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VectorHit {
    pub chunk_id: String,
    pub similarity: f32,
    pub metadata: ChunkMetadata,
}

/// Canonical result ordering shared by every backend.
pub fn compare_hits(a: &VectorHit, b: &VectorHit) -> Ordering {
    b.similarity
        .partial_cmp(&a.similarity)
        .unwrap_or(Ordering::Equal)
        .then_with(|| b.metadata.created_at.cmp(&a.metadata.created_at))
        .then_with(|| a.chunk_id.cmp(&b.chunk_id))
}

/// Sort `hits` into canonical order and keep the first `top_k`.
pub fn rank_hits(mut hits: Vec<VectorHit>, top_k: usize) -> Vec<VectorHit> {
    hits.sort_by(compare_hits);
    hits.truncate(top_k);
    hits
}

/// Nearest-neighbor storage for chunk vectors.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert`](VectorStore::upsert) | Insert or overwrite a chunk by id |
/// | [`query`](VectorStore::query) | Top-k most similar chunks, canonical order |
/// | [`delete`](VectorStore::delete) | Remove one chunk; `false` if absent |
/// | [`list`](VectorStore::list) | Metadata of every matching chunk |
/// | [`count`](VectorStore::count) | Total stored chunks |
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Short backend name for health output (`"sqlite"`, `"memory"`, ...).
    fn backend(&self) -> &str;

    /// Insert or overwrite the chunk stored under `chunk_id`.
    async fn upsert(&self, chunk_id: &str, vector: &[f32], metadata: &ChunkMetadata)
        -> Result<()>;

    /// Return up to `top_k` chunks ordered by [`compare_hits`].
    ///
    /// Fails with `DimensionMismatch` when stored vectors have a different
    /// length than `vector`.
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: &QueryFilter,
    ) -> Result<Vec<VectorHit>>;

    /// Delete a chunk. Returns whether it existed.
    async fn delete(&self, chunk_id: &str) -> Result<bool>;

    /// List stored chunks (without vectors) that pass `filter`.
    async fn list(&self, filter: &QueryFilter) -> Result<Vec<StoredChunk>>;

    async fn count(&self) -> Result<usize>;
}
