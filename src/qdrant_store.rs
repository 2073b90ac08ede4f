//! Qdrant-backed [`VectorStore`] over the REST API.
//!
//! Chunk ids are arbitrary strings but Qdrant point ids must be integers or
//! UUIDs, so each chunk is stored under a UUID v5 of its id with the
//! original id and the full metadata in the payload. The collection is
//! created with cosine distance on first write.
//!
//! Set `QDRANT_API_KEY` for hosted clusters.

use std::time::Duration;

use anyhow::Result as AnyResult;
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::OnceCell;
use tracing::debug;
use uuid::Uuid;

use support_harness_core::models::{ChunkMetadata, StoredChunk};
use support_harness_core::store::{rank_hits, QueryFilter, VectorHit, VectorStore};
use support_harness_core::{RagError, Result};

use crate::config::VectorStoreConfig;
use crate::remote;

const SCROLL_PAGE: usize = 256;

pub struct QdrantVectorStore {
    client: reqwest::Client,
    base: String,
    collection: String,
    api_key: Option<String>,
    ready: OnceCell<()>,
}

/// Point id under which `chunk_id` is stored.
pub fn point_id(chunk_id: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, chunk_id.as_bytes()).to_string()
}

fn payload_filter(filter: &QueryFilter) -> Option<Value> {
    let mut must = Vec::new();
    if let Some(ids) = &filter.chunk_ids {
        must.push(json!({ "key": "chunk_id", "match": { "any": ids } }));
    }
    if let Some(version) = &filter.product_version {
        must.push(json!({ "key": "product_version", "match": { "value": version } }));
    }
    if must.is_empty() {
        None
    } else {
        Some(json!({ "must": must }))
    }
}

fn point_to_chunk(point: &Value) -> Result<StoredChunk> {
    let payload = point
        .get("payload")
        .cloned()
        .ok_or_else(|| RagError::storage("qdrant point without payload"))?;
    let chunk_id = payload
        .get("chunk_id")
        .and_then(|v| v.as_str())
        .map(String::from)
        .ok_or_else(|| RagError::storage("qdrant payload without chunk_id"))?;
    let metadata: ChunkMetadata = serde_json::from_value(payload)
        .map_err(|e| RagError::storage(format!("corrupt qdrant payload: {}", e)))?;
    Ok(StoredChunk { chunk_id, metadata })
}

impl QdrantVectorStore {
    pub fn new(config: &VectorStoreConfig) -> AnyResult<Self> {
        let base = config
            .url
            .clone()
            .ok_or_else(|| anyhow::anyhow!("vector_store.url required for qdrant provider"))?;
        Ok(Self {
            client: remote::client(Duration::from_secs(config.timeout_secs))?,
            base: base.trim_end_matches('/').to_string(),
            collection: config.collection.clone(),
            api_key: std::env::var("QDRANT_API_KEY").ok(),
            ready: OnceCell::new(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/collections/{}{}", self.base, self.collection, path)
    }

    async fn call(&self, method: reqwest::Method, path: &str, body: Option<Value>) -> Result<Value> {
        let url = self.url(path);
        let mut request = self.client.request(method, &url);
        if let Some(key) = &self.api_key {
            request = request.header("api-key", key);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request
            .send()
            .await
            .map_err(|e| remote::send_error("Qdrant", &url, e))?;
        let body = remote::json_body("Qdrant", response).await?;
        Ok(body.get("result").cloned().unwrap_or(Value::Null))
    }

    /// Vector size of the collection, or `None` if it does not exist yet.
    async fn collection_dims(&self) -> Result<Option<usize>> {
        match self.call(reqwest::Method::GET, "", None).await {
            Ok(info) => Ok(info
                .pointer("/config/params/vectors/size")
                .and_then(|v| v.as_u64())
                .map(|v| v as usize)),
            Err(RagError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn ensure_collection(&self, dims: usize) -> Result<()> {
        self.ready
            .get_or_try_init(|| async {
                if self.collection_dims().await?.is_none() {
                    debug!(collection = %self.collection, dims, "creating qdrant collection");
                    self.call(
                        reqwest::Method::PUT,
                        "",
                        Some(json!({ "vectors": { "size": dims, "distance": "Cosine" } })),
                    )
                    .await?;
                }
                Ok::<(), RagError>(())
            })
            .await?;
        Ok(())
    }
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    fn backend(&self) -> &str {
        "qdrant"
    }

    async fn upsert(&self, chunk_id: &str, vector: &[f32], metadata: &ChunkMetadata) -> Result<()> {
        if chunk_id.trim().is_empty() {
            return Err(RagError::invalid("chunk id must not be empty"));
        }
        self.ensure_collection(vector.len()).await?;

        let mut payload = serde_json::to_value(metadata)
            .map_err(|e| RagError::storage(e.to_string()))?;
        if let Some(map) = payload.as_object_mut() {
            map.insert("chunk_id".into(), Value::String(chunk_id.to_string()));
        }
        self.call(
            reqwest::Method::PUT,
            "/points?wait=true",
            Some(json!({
                "points": [{ "id": point_id(chunk_id), "vector": vector, "payload": payload }]
            })),
        )
        .await?;
        Ok(())
    }

    async fn query(&self, vector: &[f32], top_k: usize, filter: &QueryFilter) -> Result<Vec<VectorHit>> {
        let Some(dims) = self.collection_dims().await? else {
            return Ok(Vec::new());
        };
        if dims != vector.len() {
            return Err(RagError::DimensionMismatch {
                expected: dims,
                actual: vector.len(),
            });
        }

        let mut body = json!({ "vector": vector, "limit": top_k, "with_payload": true });
        if let Some(f) = payload_filter(filter) {
            body["filter"] = f;
        }
        let result = self
            .call(reqwest::Method::POST, "/points/search", Some(body))
            .await?;

        let mut hits = Vec::new();
        for point in result.as_array().map(Vec::as_slice).unwrap_or_default() {
            let chunk = point_to_chunk(point)?;
            let score = point.get("score").and_then(|s| s.as_f64()).unwrap_or(0.0) as f32;
            hits.push(VectorHit {
                chunk_id: chunk.chunk_id,
                similarity: score,
                metadata: chunk.metadata,
            });
        }
        Ok(rank_hits(hits, top_k))
    }

    async fn delete(&self, chunk_id: &str) -> Result<bool> {
        let id = point_id(chunk_id);
        match self
            .call(reqwest::Method::GET, &format!("/points/{}", id), None)
            .await
        {
            Ok(_) => {}
            Err(RagError::NotFound(_)) => return Ok(false),
            Err(e) => return Err(e),
        }
        self.call(
            reqwest::Method::POST,
            "/points/delete?wait=true",
            Some(json!({ "points": [id] })),
        )
        .await?;
        Ok(true)
    }

    async fn list(&self, filter: &QueryFilter) -> Result<Vec<StoredChunk>> {
        let mut chunks = Vec::new();
        let mut offset = Value::Null;
        loop {
            let mut body = json!({
                "limit": SCROLL_PAGE,
                "with_payload": true,
                "with_vector": false,
            });
            if !offset.is_null() {
                body["offset"] = offset.clone();
            }
            if let Some(f) = payload_filter(filter) {
                body["filter"] = f;
            }
            let page = match self
                .call(reqwest::Method::POST, "/points/scroll", Some(body))
                .await
            {
                Ok(page) => page,
                Err(RagError::NotFound(_)) => return Ok(Vec::new()),
                Err(e) => return Err(e),
            };
            for point in page
                .get("points")
                .and_then(|p| p.as_array())
                .map(Vec::as_slice)
                .unwrap_or_default()
            {
                chunks.push(point_to_chunk(point)?);
            }
            offset = page.get("next_page_offset").cloned().unwrap_or(Value::Null);
            if offset.is_null() {
                break;
            }
        }
        chunks.sort_by(|a, b| {
            a.metadata
                .key()
                .cmp(&b.metadata.key())
                .then(a.metadata.chunk_index.cmp(&b.metadata.chunk_index))
        });
        Ok(chunks)
    }

    async fn count(&self) -> Result<usize> {
        match self
            .call(
                reqwest::Method::POST,
                "/points/count",
                Some(json!({ "exact": true })),
            )
            .await
        {
            Ok(result) => Ok(result.get("count").and_then(|c| c.as_u64()).unwrap_or(0) as usize),
            Err(RagError::NotFound(_)) => Ok(0),
            Err(e) => Err(e),
        }
    }
}
