//! Ingestion pipeline: text + metadata → chunks → vectors → store.
//!
//! Every chunk is embedded and written on its own. A chunk that fails to
//! embed or write is recorded in the [`IngestReport`] and the rest of the
//! batch continues, so a cancelled or partially failed ingestion leaves a
//! well-defined prefix in the store and nothing half-written.
//!
//! Writes are idempotent by chunk id. Identical text under a different id
//! is stored twice; the content hash is kept in metadata but never used to
//! deduplicate.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::chunk::{chunk_id, content_hash, split_windows, ChunkingParams};
use crate::documents::{group_documents, DocumentSummary};
use crate::embedding::{check_dims, Embedder};
use crate::error::{RagError, Result};
use crate::models::{ChunkMetadata, DocumentKey, SourceType};
use crate::store::{QueryFilter, VectorStore};

/// Clean text plus metadata, as handed over by an extractor or upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestDocument {
    pub title: String,
    pub source_type: SourceType,
    pub text: String,
    #[serde(default)]
    pub product_version: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub section: Option<String>,
    #[serde(default)]
    pub ticket_id: Option<String>,
    #[serde(default)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl IngestDocument {
    pub fn new(title: impl Into<String>, source_type: SourceType, text: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            source_type,
            text: text.into(),
            product_version: None,
            tags: Vec::new(),
            section: None,
            ticket_id: None,
            extra: serde_json::Map::new(),
        }
    }

    pub fn key(&self) -> DocumentKey {
        DocumentKey::new(self.title.clone(), self.source_type)
    }

    fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(RagError::invalid("document title must not be empty"));
        }
        if self.text.trim().is_empty() {
            return Err(RagError::invalid(format!(
                "document '{}' has no text to ingest",
                self.title
            )));
        }
        Ok(())
    }
}

/// A pre-chunked record with an optional caller-chosen id.
///
/// Without an id, the deterministic id for
/// `(source_type, title, product_version, chunk_index)` is used, matching what [`Ingestor::ingest_document`] would assign.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkInput {
    #[serde(default)]
    pub id: Option<String>,
    pub title: String,
    pub source_type: SourceType,
    pub text: String,
    #[serde(default)]
    pub chunk_index: Option<i64>,
    #[serde(default)]
    pub product_version: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub section: Option<String>,
    #[serde(default)]
    pub ticket_id: Option<String>,
}

/// A chunk ready to embed: its id and the metadata to store with it.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedChunk {
    pub id: String,
    pub metadata: ChunkMetadata,
}

/// Per-chunk result of an ingestion batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkOutcome {
    pub chunk_id: String,
    pub chunk_index: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestReport {
    pub success: bool,
    pub chunks_created: usize,
    pub chunks_failed: usize,
    /// Chunks removed beforehand by a replacing ingestion.
    pub chunks_replaced: usize,
    pub outcomes: Vec<ChunkOutcome>,
}

impl IngestReport {
    fn from_outcomes(outcomes: Vec<ChunkOutcome>, chunks_replaced: usize) -> Self {
        let chunks_failed = outcomes.iter().filter(|o| o.error.is_some()).count();
        Self {
            success: chunks_failed == 0,
            chunks_created: outcomes.len() - chunks_failed,
            chunks_failed,
            chunks_replaced,
            outcomes,
        }
    }

    pub fn errors(&self) -> Vec<String> {
        self.outcomes
            .iter()
            .filter_map(|o| {
                o.error
                    .as_ref()
                    .map(|e| format!("chunk {} ({}): {}", o.chunk_index, o.chunk_id, e))
            })
            .collect()
    }
}

/// Split a document into prepared chunks without touching any backend.
pub fn prepare_document(doc: &IngestDocument, params: &ChunkingParams) -> Result<Vec<PreparedChunk>> {
    doc.validate()?;
    let key = doc.key();
    let created_at = Utc::now();

    Ok(split_windows(&doc.text, params)
        .into_iter()
        .map(|window| PreparedChunk {
            id: chunk_id(&key, doc.product_version.as_deref(), window.index),
            metadata: ChunkMetadata {
                title: doc.title.clone(),
                source_type: doc.source_type,
                content_hash: content_hash(&window.text),
                text: window.text,
                chunk_index: window.index,
                product_version: doc.product_version.clone(),
                tags: doc.tags.clone(),
                section: doc.section.clone(),
                ticket_id: doc.ticket_id.clone(),
                created_at,
                extra: doc.extra.clone(),
            },
        })
        .collect())
}

/// Convert explicit chunk records into prepared chunks.
pub fn prepare_chunks(inputs: Vec<ChunkInput>) -> Result<Vec<PreparedChunk>> {
    let created_at = Utc::now();
    inputs
        .into_iter()
        .enumerate()
        .map(|(position, input)| {
            if input.title.trim().is_empty() {
                return Err(RagError::invalid("chunk title must not be empty"));
            }
            if input.text.trim().is_empty() {
                return Err(RagError::invalid(format!(
                    "chunk {} of '{}' has no text",
                    position, input.title
                )));
            }
            let chunk_index = input.chunk_index.unwrap_or(position as i64);
            let key = DocumentKey::new(input.title.clone(), input.source_type);
            let id = input
                .id
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(|| chunk_id(&key, input.product_version.as_deref(), chunk_index));
            Ok(PreparedChunk {
                id,
                metadata: ChunkMetadata {
                    title: input.title,
                    source_type: input.source_type,
                    content_hash: content_hash(&input.text),
                    text: input.text,
                    chunk_index,
                    product_version: input.product_version,
                    tags: input.tags,
                    section: input.section,
                    ticket_id: input.ticket_id,
                    created_at,
                    extra: serde_json::Map::new(),
                },
            })
        })
        .collect()
}

/// Write path over an [`Embedder`] and a [`VectorStore`].
#[derive(Clone)]
pub struct Ingestor {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    chunking: ChunkingParams,
}

impl Ingestor {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        chunking: ChunkingParams,
    ) -> Self {
        Self {
            embedder,
            store,
            chunking,
        }
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    /// Chunk, embed, and upsert one document.
    ///
    /// Fails only for invalid input; per-chunk failures land in the report.
    pub async fn ingest_document(&self, doc: &IngestDocument) -> Result<IngestReport> {
        let prepared = prepare_document(doc, &self.chunking)?;
        let report = self.write_chunks(prepared, 0).await;
        info!(
            title = %doc.title,
            source_type = %doc.source_type,
            chunks = report.chunks_created,
            failed = report.chunks_failed,
            "ingested document"
        );
        Ok(report)
    }

    /// Delete the document's chunks for its product version, then ingest it.
    ///
    /// Use when a document may have shrunk: plain re-ingestion overwrites
    /// chunks by id but leaves trailing chunks from a longer prior version.
    /// Chunks of the same title under other product versions are kept.
    pub async fn replace_document(&self, doc: &IngestDocument) -> Result<IngestReport> {
        let prepared = prepare_document(doc, &self.chunking)?;
        let version = doc.product_version.as_deref();
        let removed = self
            .remove_where(|m| m.key() == doc.key() && m.product_version.as_deref() == version)
            .await?;
        let report = self.write_chunks(prepared, removed).await;
        info!(
            title = %doc.title,
            source_type = %doc.source_type,
            chunks = report.chunks_created,
            replaced = removed,
            "replaced document"
        );
        Ok(report)
    }

    /// Embed and upsert explicit chunk records.
    pub async fn ingest_chunks(&self, inputs: Vec<ChunkInput>) -> Result<IngestReport> {
        let prepared = prepare_chunks(inputs)?;
        Ok(self.write_chunks(prepared, 0).await)
    }

    async fn write_chunks(&self, prepared: Vec<PreparedChunk>, replaced: usize) -> IngestReport {
        let mut outcomes = Vec::with_capacity(prepared.len());
        for chunk in prepared {
            let error = match self.write_one(&chunk).await {
                Ok(()) => None,
                Err(e) => {
                    warn!(
                        chunk_id = %chunk.id,
                        title = %chunk.metadata.title,
                        error = %e,
                        "chunk ingestion failed"
                    );
                    Some(e.to_string())
                }
            };
            outcomes.push(ChunkOutcome {
                chunk_id: chunk.id,
                chunk_index: chunk.metadata.chunk_index,
                error,
            });
        }
        IngestReport::from_outcomes(outcomes, replaced)
    }

    async fn write_one(&self, chunk: &PreparedChunk) -> Result<()> {
        let vector = self.embedder.embed(&chunk.metadata.text).await?;
        check_dims(self.embedder.dims(), &vector)?;
        self.store.upsert(&chunk.id, &vector, &chunk.metadata).await
    }

    /// Delete one chunk. `NotFound` if it does not exist.
    pub async fn delete_chunk(&self, chunk_id: &str) -> Result<()> {
        if self.store.delete(chunk_id).await? {
            info!(chunk_id, "deleted chunk");
            Ok(())
        } else {
            Err(RagError::not_found(format!("chunk {}", chunk_id)))
        }
    }

    /// Delete every chunk of a document across all product versions.
    /// `NotFound` if it has none.
    pub async fn delete_document(&self, key: &DocumentKey) -> Result<usize> {
        let removed = self.remove_where(|m| &m.key() == key).await?;
        if removed == 0 {
            return Err(RagError::not_found(format!(
                "document '{}' ({})",
                key.title, key.source_type
            )));
        }
        info!(title = %key.title, source_type = %key.source_type, removed, "deleted document");
        Ok(removed)
    }

    async fn remove_where<F>(&self, matches: F) -> Result<usize>
    where
        F: Fn(&ChunkMetadata) -> bool,
    {
        let chunks = self.store.list(&QueryFilter::default()).await?;
        let mut removed = 0;
        for chunk in chunks.iter().filter(|c| matches(&c.metadata)) {
            if self.store.delete(&chunk.chunk_id).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Derived document listing, optionally limited to one product version.
    pub async fn list_documents(&self, product_version: Option<&str>) -> Result<Vec<DocumentSummary>> {
        let filter = QueryFilter::new(None, product_version.map(String::from));
        Ok(group_documents(self.store.list(&filter).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryVectorStore;
    use async_trait::async_trait;

    /// Embeds text length into a 2-d vector; fails on text containing "boom".
    struct LengthEmbedder;

    #[async_trait]
    impl Embedder for LengthEmbedder {
        fn model_name(&self) -> &str {
            "length"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            if text.contains("boom") {
                return Err(RagError::unavailable("embedder exploded"));
            }
            Ok(vec![text.len() as f32, 1.0])
        }
    }

    fn ingestor() -> (Ingestor, Arc<InMemoryVectorStore>) {
        let store = Arc::new(InMemoryVectorStore::new());
        let ingestor = Ingestor::new(
            Arc::new(LengthEmbedder),
            store.clone(),
            ChunkingParams::new(20, 0.1).unwrap(),
        );
        (ingestor, store)
    }

    #[test]
    fn test_prepare_rejects_empty() {
        let params = ChunkingParams::default();
        let err = prepare_document(&IngestDocument::new("T", SourceType::Txt, "  "), &params)
            .unwrap_err();
        assert!(matches!(err, RagError::InvalidInput(_)));
        let err = prepare_document(&IngestDocument::new("", SourceType::Txt, "x"), &params)
            .unwrap_err();
        assert!(matches!(err, RagError::InvalidInput(_)));
    }

    #[test]
    fn test_prepare_carries_metadata() {
        let mut doc = IngestDocument::new("Guide", SourceType::Md, "Reset your password.");
        doc.product_version = Some("2.1".into());
        doc.tags = vec!["auth".into()];
        let chunks = prepare_document(&doc, &ChunkingParams::default()).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].id, chunk_id(&doc.key(), Some("2.1"), 0));
        assert_eq!(chunks[0].metadata.product_version.as_deref(), Some("2.1"));
        assert_eq!(chunks[0].metadata.content_hash, content_hash("Reset your password."));
    }

    #[tokio::test]
    async fn test_reingest_is_idempotent_by_id() {
        let (ingestor, store) = ingestor();
        let doc = IngestDocument::new("Doc", SourceType::Txt, "one two three four five six seven");
        let first = ingestor.ingest_document(&doc).await.unwrap();
        let second = ingestor.ingest_document(&doc).await.unwrap();
        assert_eq!(first.chunks_created, second.chunks_created);
        assert_eq!(store.count().await.unwrap(), first.chunks_created);
    }

    #[tokio::test]
    async fn test_partial_failure_continues() {
        let (ingestor, store) = ingestor();
        let report = ingestor
            .ingest_chunks(vec![
                ChunkInput {
                    id: Some("ok-1".into()),
                    title: "T".into(),
                    source_type: SourceType::Txt,
                    text: "fine".into(),
                    chunk_index: None,
                    product_version: None,
                    tags: vec![],
                    section: None,
                    ticket_id: None,
                },
                ChunkInput {
                    id: Some("bad".into()),
                    title: "T".into(),
                    source_type: SourceType::Txt,
                    text: "boom".into(),
                    chunk_index: None,
                    product_version: None,
                    tags: vec![],
                    section: None,
                    ticket_id: None,
                },
                ChunkInput {
                    id: None,
                    title: "T".into(),
                    source_type: SourceType::Txt,
                    text: "also fine".into(),
                    chunk_index: None,
                    product_version: None,
                    tags: vec![],
                    section: None,
                    ticket_id: None,
                },
            ])
            .await
            .unwrap();

        assert!(!report.success);
        assert_eq!(report.chunks_created, 2);
        assert_eq!(report.chunks_failed, 1);
        assert_eq!(report.outcomes[1].chunk_id, "bad");
        assert!(report.errors()[0].contains("embedder exploded"));
        assert_eq!(
            report.outcomes[2].chunk_id,
            chunk_id(&DocumentKey::new("T", SourceType::Txt), None, 2)
        );
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_replace_drops_stale_chunks() {
        let (ingestor, store) = ingestor();
        let long = IngestDocument::new(
            "Doc",
            SourceType::Txt,
            "alpha beta gamma delta epsilon zeta eta theta iota kappa",
        );
        let report = ingestor.ingest_document(&long).await.unwrap();
        assert!(report.chunks_created > 1);

        let short = IngestDocument::new("Doc", SourceType::Txt, "alpha");
        let report = ingestor.replace_document(&short).await.unwrap();
        assert!(report.chunks_replaced > 1);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_product_versions_coexist() {
        let (ingestor, store) = ingestor();
        let mut v1 = IngestDocument::new("Guide", SourceType::Md, "old steps");
        v1.product_version = Some("1.0".into());
        let mut v2 = IngestDocument::new("Guide", SourceType::Md, "new steps");
        v2.product_version = Some("2.0".into());
        ingestor.ingest_document(&v1).await.unwrap();
        ingestor.ingest_document(&v2).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 2);

        let old = ingestor.list_documents(Some("1.0")).await.unwrap();
        assert_eq!(old.len(), 1);
        assert_eq!(old[0].title, "Guide");
        assert_eq!(ingestor.list_documents(Some("2.0")).await.unwrap().len(), 1);
        assert_eq!(ingestor.list_documents(None).await.unwrap().len(), 2);

        let mut v2_short = IngestDocument::new("Guide", SourceType::Md, "newest");
        v2_short.product_version = Some("2.0".into());
        let report = ingestor.replace_document(&v2_short).await.unwrap();
        assert_eq!(report.chunks_replaced, 1);
        assert_eq!(ingestor.list_documents(Some("1.0")).await.unwrap().len(), 1);

        let removed = ingestor
            .delete_document(&DocumentKey::new("Guide", SourceType::Md))
            .await
            .unwrap();
        assert_eq!(removed, 2);
    }

    #[tokio::test]
    async fn test_delete_not_found() {
        let (ingestor, _) = ingestor();
        assert!(matches!(
            ingestor.delete_chunk("missing").await.unwrap_err(),
            RagError::NotFound(_)
        ));
        assert!(matches!(
            ingestor
                .delete_document(&DocumentKey::new("Nope", SourceType::Pdf))
                .await
                .unwrap_err(),
            RagError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_delete_document_and_listing() {
        let (ingestor, _) = ingestor();
        ingestor
            .ingest_document(&IngestDocument::new("A", SourceType::Md, "short a"))
            .await
            .unwrap();
        ingestor
            .ingest_document(&IngestDocument::new("B", SourceType::Md, "short b"))
            .await
            .unwrap();
        assert_eq!(ingestor.list_documents(None).await.unwrap().len(), 2);

        let removed = ingestor
            .delete_document(&DocumentKey::new("A", SourceType::Md))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        let docs = ingestor.list_documents(None).await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].title, "B");
    }
}
