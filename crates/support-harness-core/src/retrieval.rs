//! Similarity-threshold retrieval with per-document confidence.
//!
//! The retrieval algorithm runs entirely through the [`Embedder`] and
//! [`VectorStore`] traits. The calling application picks the backends and
//! supplies [`RetrievalParams`] from its configuration.
//!
//! # Algorithm
//!
//! 1. Reject empty queries (`InvalidInput`).
//! 2. Embed the query.
//! 3. Fetch the `top_k` nearest chunks, restricted by scope and product version.
//! 4. Group chunks by document key `(title, source_type)`.
//! 5. Document confidence = **MAX** member similarity, clamped to `[0, 1]`.
//!    One strong match outweighs several weak ones; mean and sum are wrong here.
//! 6. Keep documents with `confidence >= τ`; a document exactly at τ survives.
//! 7. Sort by confidence (desc), newest chunk (desc), title (asc).
//! 8. No survivors → `fallback_triggered = true` with no sources.
//!
//! | Property | Guarantee |
//! |----------|-----------|
//! | Grouping | chunk similarities `[0.9, 0.6]` → confidence `0.9` |
//! | Boundary | `confidence == τ` included, `< τ` excluded |
//! | Empty index | fallback, empty sources, not an error |
//! | Stale scope ids | silently ignored |

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::embedding::{check_dims, Embedder};
use crate::error::{RagError, Result};
use crate::generation::Passage;
use crate::models::{DocumentKey, SourceRef};
use crate::store::{QueryFilter, VectorHit, VectorStore};

/// Retrieval tuning parameters, decoupled from application config.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrievalParams {
    /// Number of nearest chunks to fetch from the store.
    pub top_k: usize,
    /// Default τ when the request does not override it.
    pub similarity_threshold: f32,
}

impl RetrievalParams {
    pub fn new(top_k: usize, similarity_threshold: f32) -> Result<Self> {
        if top_k == 0 {
            return Err(RagError::Config("retrieval.top_k must be >= 1".into()));
        }
        check_threshold(similarity_threshold)
            .map_err(|_| RagError::Config("retrieval.similarity_threshold must be in [0.0, 1.0]".into()))?;
        Ok(Self {
            top_k,
            similarity_threshold,
        })
    }
}

impl Default for RetrievalParams {
    fn default() -> Self {
        Self {
            top_k: 5,
            similarity_threshold: 0.75,
        }
    }
}

/// Inputs for a single retrieval.
#[derive(Debug, Clone, Default)]
pub struct RetrievalRequest<'a> {
    pub query: &'a str,
    /// Chunk ids the search is restricted to.
    pub scope: Option<&'a [String]>,
    pub product_version: Option<&'a str>,
    /// Overrides [`RetrievalParams::similarity_threshold`].
    pub threshold: Option<f32>,
}

/// All retrieved chunks belonging to one document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentHit {
    pub key: DocumentKey,
    /// Maximum member similarity, clamped to `[0, 1]`.
    pub confidence: f32,
    /// Newest `created_at` among the members, used as a tie-breaker.
    pub newest: DateTime<Utc>,
    /// Member chunks in store order (descending similarity).
    pub chunks: Vec<VectorHit>,
}

/// Outcome of [`retrieve`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalResult {
    /// Surviving documents, best first.
    pub documents: Vec<DocumentHit>,
    pub fallback_triggered: bool,
    /// τ actually applied.
    pub threshold: f32,
    /// Chunks returned by the store before grouping and filtering.
    pub candidates: usize,
}

impl RetrievalResult {
    fn from_groups(documents: Vec<DocumentHit>, threshold: f32, candidates: usize) -> Self {
        Self {
            fallback_triggered: documents.is_empty(),
            documents,
            threshold,
            candidates,
        }
    }

    /// Confidence of the top surviving document, `0.0` on fallback.
    pub fn confidence(&self) -> f32 {
        self.documents.first().map(|d| d.confidence).unwrap_or(0.0)
    }

    /// Documents flattened back to chunk-level citations, best document first.
    ///
    /// Each citation carries its own chunk similarity, so a surviving
    /// document can appear more than once and its weaker chunks may sit
    /// below the threshold. A document's group confidence is its highest
    /// citation; [`confidence`](Self::confidence) is the top document's.
    pub fn sources(&self) -> Vec<SourceRef> {
        self.documents
            .iter()
            .flat_map(|doc| doc.chunks.iter())
            .map(|hit| SourceRef {
                document_title: hit.metadata.title.clone(),
                section: hit.metadata.section.clone(),
                ticket_id: hit.metadata.ticket_id.clone(),
                source_type: hit.metadata.source_type,
                chunk_id: hit.chunk_id.clone(),
                confidence: clamp_confidence(hit.similarity),
            })
            .collect()
    }

    /// Context passages in the same order as [`sources`](Self::sources).
    pub fn passages(&self) -> Vec<Passage> {
        self.documents
            .iter()
            .flat_map(|doc| doc.chunks.iter())
            .map(|hit| Passage {
                chunk_id: hit.chunk_id.clone(),
                title: hit.metadata.title.clone(),
                source_type: hit.metadata.source_type,
                section: hit.metadata.section.clone(),
                ticket_id: hit.metadata.ticket_id.clone(),
                text: hit.metadata.text.clone(),
            })
            .collect()
    }
}

/// Map a raw cosine similarity into `[0, 1]`.
pub fn clamp_confidence(similarity: f32) -> f32 {
    if similarity.is_nan() {
        return 0.0;
    }
    similarity.clamp(0.0, 1.0)
}

fn check_threshold(threshold: f32) -> Result<()> {
    if !(0.0..=1.0).contains(&threshold) {
        return Err(RagError::invalid(format!(
            "similarity threshold must be in [0.0, 1.0], got {}",
            threshold
        )));
    }
    Ok(())
}

/// Group hits by document key, keeping first-appearance order.
///
/// Each group's confidence is the MAX of its members' clamped similarities.
pub fn group_by_document(hits: Vec<VectorHit>) -> Vec<DocumentHit> {
    let mut order: Vec<DocumentKey> = Vec::new();
    let mut groups: HashMap<DocumentKey, DocumentHit> = HashMap::new();

    for hit in hits {
        let key = hit.metadata.key();
        let confidence = clamp_confidence(hit.similarity);
        let created = hit.metadata.created_at;
        match groups.get_mut(&key) {
            Some(group) => {
                group.confidence = group.confidence.max(confidence);
                group.newest = group.newest.max(created);
                group.chunks.push(hit);
            }
            None => {
                order.push(key.clone());
                groups.insert(
                    key.clone(),
                    DocumentHit {
                        key,
                        confidence,
                        newest: created,
                        chunks: vec![hit],
                    },
                );
            }
        }
    }

    order
        .into_iter()
        .filter_map(|key| groups.remove(&key))
        .collect()
}

/// Drop groups below `threshold` and sort the survivors best first.
pub fn apply_threshold(mut groups: Vec<DocumentHit>, threshold: f32) -> Vec<DocumentHit> {
    groups.retain(|g| g.confidence >= threshold);
    groups.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.newest.cmp(&a.newest))
            .then_with(|| a.key.title.cmp(&b.key.title))
    });
    groups
}

/// Run one retrieval against the given embedder and store.
///
/// # Errors
///
/// - `InvalidInput` for an empty query or a threshold outside `[0, 1]`.
/// - `DimensionMismatch` if the embedder or the store disagree on vector length.
/// - Whatever the embedder or store surface (`ProviderUnavailable`, ...).
pub async fn retrieve(
    embedder: &dyn Embedder,
    store: &dyn VectorStore,
    params: &RetrievalParams,
    request: &RetrievalRequest<'_>,
) -> Result<RetrievalResult> {
    let query = request.query.trim();
    if query.is_empty() {
        return Err(RagError::invalid("query must not be empty"));
    }
    let threshold = request.threshold.unwrap_or(params.similarity_threshold);
    check_threshold(threshold)?;

    let query_vec = embedder.embed(query).await?;
    check_dims(embedder.dims(), &query_vec)?;

    let filter = QueryFilter::new(
        request.scope.map(|ids| ids.to_vec()),
        request.product_version.map(String::from),
    );
    let hits = store.query(&query_vec, params.top_k, &filter).await?;
    let candidates = hits.len();

    let documents = apply_threshold(group_by_document(hits), threshold);
    debug!(
        candidates,
        documents = documents.len(),
        threshold,
        "retrieval complete"
    );

    Ok(RetrievalResult::from_groups(documents, threshold, candidates))
}
