//! SQLite-backed [`VectorStore`].
//!
//! Vectors are stored as little-endian `f32` BLOBs in the `chunks` table
//! next to their metadata. Queries load the candidate rows and compute
//! cosine similarity in Rust: a brute-force scan that is fast enough for
//! support corpora of tens of thousands of chunks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use support_harness_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use support_harness_core::models::{ChunkMetadata, SourceType, StoredChunk};
use support_harness_core::store::{rank_hits, QueryFilter, VectorHit, VectorStore};
use support_harness_core::{RagError, Result};

pub struct SqliteVectorStore {
    pool: SqlitePool,
}

impl SqliteVectorStore {
    /// Wrap a pool whose schema has been migrated.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

pub(crate) fn db_err(e: sqlx::Error) -> RagError {
    RagError::storage(format!("sqlite: {}", e))
}

pub(crate) fn millis_to_datetime(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .ok_or_else(|| RagError::storage(format!("invalid timestamp {}", ms)))
}

const METADATA_COLUMNS: &str = "id, title, source_type, text, chunk_index, product_version, \
     tags_json, section, ticket_id, content_hash, extra_json, created_at";

fn row_to_chunk(row: &SqliteRow) -> Result<StoredChunk> {
    let source_type: String = row.try_get("source_type").map_err(db_err)?;
    let tags_json: String = row.try_get("tags_json").map_err(db_err)?;
    let extra_json: String = row.try_get("extra_json").map_err(db_err)?;
    let created_at: i64 = row.try_get("created_at").map_err(db_err)?;

    Ok(StoredChunk {
        chunk_id: row.try_get("id").map_err(db_err)?,
        metadata: ChunkMetadata {
            title: row.try_get("title").map_err(db_err)?,
            source_type: source_type
                .parse::<SourceType>()
                .map_err(|e| RagError::storage(e.to_string()))?,
            text: row.try_get("text").map_err(db_err)?,
            chunk_index: row.try_get("chunk_index").map_err(db_err)?,
            product_version: row.try_get("product_version").map_err(db_err)?,
            tags: serde_json::from_str(&tags_json)
                .map_err(|e| RagError::storage(format!("corrupt tags: {}", e)))?,
            section: row.try_get("section").map_err(db_err)?,
            ticket_id: row.try_get("ticket_id").map_err(db_err)?,
            content_hash: row.try_get("content_hash").map_err(db_err)?,
            extra: serde_json::from_str(&extra_json)
                .map_err(|e| RagError::storage(format!("corrupt extra metadata: {}", e)))?,
            created_at: millis_to_datetime(created_at)?,
        },
    })
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    fn backend(&self) -> &str {
        "sqlite"
    }

    async fn upsert(&self, chunk_id: &str, vector: &[f32], metadata: &ChunkMetadata) -> Result<()> {
        if chunk_id.trim().is_empty() {
            return Err(RagError::invalid("chunk id must not be empty"));
        }
        let tags_json = serde_json::to_string(&metadata.tags)
            .map_err(|e| RagError::storage(e.to_string()))?;
        let extra_json = serde_json::to_string(&metadata.extra)
            .map_err(|e| RagError::storage(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO chunks (id, title, source_type, text, chunk_index, product_version,
                                tags_json, section, ticket_id, content_hash, extra_json,
                                created_at, dims, embedding)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                source_type = excluded.source_type,
                text = excluded.text,
                chunk_index = excluded.chunk_index,
                product_version = excluded.product_version,
                tags_json = excluded.tags_json,
                section = excluded.section,
                ticket_id = excluded.ticket_id,
                content_hash = excluded.content_hash,
                extra_json = excluded.extra_json,
                created_at = excluded.created_at,
                dims = excluded.dims,
                embedding = excluded.embedding
            "#,
        )
        .bind(chunk_id)
        .bind(&metadata.title)
        .bind(metadata.source_type.as_str())
        .bind(&metadata.text)
        .bind(metadata.chunk_index)
        .bind(&metadata.product_version)
        .bind(tags_json)
        .bind(&metadata.section)
        .bind(&metadata.ticket_id)
        .bind(&metadata.content_hash)
        .bind(extra_json)
        .bind(metadata.created_at.timestamp_millis())
        .bind(vector.len() as i64)
        .bind(vec_to_blob(vector))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn query(&self, vector: &[f32], top_k: usize, filter: &QueryFilter) -> Result<Vec<VectorHit>> {
        // Any stored dimension other than the query's means the index was
        // built with a different embedder.
        let stored_dims: Option<i64> =
            sqlx::query_scalar("SELECT dims FROM chunks WHERE dims != ? LIMIT 1")
                .bind(vector.len() as i64)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;
        if let Some(expected) = stored_dims {
            return Err(RagError::DimensionMismatch {
                expected: expected as usize,
                actual: vector.len(),
            });
        }

        let rows = sqlx::query(&format!(
            "SELECT {}, embedding FROM chunks WHERE (?1 IS NULL OR product_version = ?1)",
            METADATA_COLUMNS
        ))
        .bind(&filter.product_version)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut hits = Vec::new();
        for row in &rows {
            let chunk = row_to_chunk(row)?;
            if !filter.matches(&chunk.chunk_id, &chunk.metadata) {
                continue;
            }
            let blob: Vec<u8> = row.try_get("embedding").map_err(db_err)?;
            hits.push(VectorHit {
                similarity: cosine_similarity(vector, &blob_to_vec(&blob)),
                chunk_id: chunk.chunk_id,
                metadata: chunk.metadata,
            });
        }
        Ok(rank_hits(hits, top_k))
    }

    async fn delete(&self, chunk_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM chunks WHERE id = ?")
            .bind(chunk_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn list(&self, filter: &QueryFilter) -> Result<Vec<StoredChunk>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM chunks WHERE (?1 IS NULL OR product_version = ?1) \
             ORDER BY title, source_type, chunk_index",
            METADATA_COLUMNS
        ))
        .bind(&filter.product_version)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut chunks = Vec::with_capacity(rows.len());
        for row in &rows {
            let chunk = row_to_chunk(row)?;
            if filter.matches(&chunk.chunk_id, &chunk.metadata) {
                chunks.push(chunk);
            }
        }
        Ok(chunks)
    }

    async fn count(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(count as usize)
    }
}
