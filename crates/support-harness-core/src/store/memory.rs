//! In-memory [`VectorStore`] for tests and the `memory` backend.
//!
//! A `HashMap` behind `std::sync::RwLock`. Queries are brute-force cosine
//! similarity over every stored vector.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::error::{RagError, Result};
use crate::models::{ChunkMetadata, StoredChunk};

use super::{rank_hits, QueryFilter, VectorHit, VectorStore};

struct StoredVector {
    vector: Vec<f32>,
    metadata: ChunkMetadata,
}

/// Process-local vector store.
pub struct InMemoryVectorStore {
    vectors: RwLock<HashMap<String, StoredVector>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self {
            vectors: RwLock::new(HashMap::new()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, StoredVector>>> {
        self.vectors
            .read()
            .map_err(|_| RagError::storage("in-memory vector store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, StoredVector>>> {
        self.vectors
            .write()
            .map_err(|_| RagError::storage("in-memory vector store lock poisoned"))
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    fn backend(&self) -> &str {
        "memory"
    }

    async fn upsert(
        &self,
        chunk_id: &str,
        vector: &[f32],
        metadata: &ChunkMetadata,
    ) -> Result<()> {
        if chunk_id.is_empty() {
            return Err(RagError::invalid("chunk id must not be empty"));
        }
        self.write()?.insert(
            chunk_id.to_string(),
            StoredVector {
                vector: vector.to_vec(),
                metadata: metadata.clone(),
            },
        );
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: &QueryFilter,
    ) -> Result<Vec<VectorHit>> {
        let vectors = self.read()?;
        if let Some(stored) = vectors.values().find(|sv| sv.vector.len() != vector.len()) {
            return Err(RagError::DimensionMismatch {
                expected: stored.vector.len(),
                actual: vector.len(),
            });
        }

        let hits = vectors
            .iter()
            .filter(|(id, sv)| filter.matches(id, &sv.metadata))
            .map(|(id, sv)| VectorHit {
                chunk_id: id.clone(),
                similarity: cosine_similarity(vector, &sv.vector),
                metadata: sv.metadata.clone(),
            })
            .collect();

        Ok(rank_hits(hits, top_k))
    }

    async fn delete(&self, chunk_id: &str) -> Result<bool> {
        Ok(self.write()?.remove(chunk_id).is_some())
    }

    async fn list(&self, filter: &QueryFilter) -> Result<Vec<StoredChunk>> {
        let vectors = self.read()?;
        let mut chunks: Vec<StoredChunk> = vectors
            .iter()
            .filter(|(id, sv)| filter.matches(id, &sv.metadata))
            .map(|(id, sv)| StoredChunk {
                chunk_id: id.clone(),
                metadata: sv.metadata.clone(),
            })
            .collect();
        chunks.sort_by(|a, b| {
            a.metadata
                .key()
                .cmp(&b.metadata.key())
                .then(a.metadata.chunk_index.cmp(&b.metadata.chunk_index))
        });
        Ok(chunks)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.read()?.len())
    }
}
