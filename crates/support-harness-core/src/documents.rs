//! Read-time document view.
//!
//! Documents are never persisted. [`group_documents`] folds a chunk listing
//! into one summary per `(title, source_type, product_version)`, so the chunk
//! table stays the single source of truth.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{DocumentKey, SourceType, StoredChunk};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentSummary {
    pub title: String,
    pub source_type: SourceType,
    /// Always equals `chunk_ids.len()`.
    pub chunks_count: usize,
    /// Ordered by chunk index.
    pub chunk_ids: Vec<String>,
    pub product_version: Option<String>,
    pub tags: Vec<String>,
    /// Earliest chunk creation time.
    pub created_at: DateTime<Utc>,
}

/// Group chunks by document key and product version, sorted by title, then
/// source type, then version (unversioned first).
pub fn group_documents(chunks: Vec<StoredChunk>) -> Vec<DocumentSummary> {
    let mut grouped: BTreeMap<(DocumentKey, Option<String>), Vec<StoredChunk>> = BTreeMap::new();
    for chunk in chunks {
        let version = chunk.metadata.product_version.clone();
        grouped
            .entry((chunk.metadata.key(), version))
            .or_default()
            .push(chunk);
    }

    grouped
        .into_iter()
        .filter_map(|((key, product_version), mut members)| {
            members.sort_by_key(|c| c.metadata.chunk_index);
            let created_at = members.iter().map(|c| c.metadata.created_at).min()?;
            let mut tags: Vec<String> = members
                .iter()
                .flat_map(|c| c.metadata.tags.iter().cloned())
                .collect();
            tags.sort();
            tags.dedup();
            let chunk_ids: Vec<String> = members.into_iter().map(|c| c.chunk_id).collect();
            Some(DocumentSummary {
                title: key.title,
                source_type: key.source_type,
                chunks_count: chunk_ids.len(),
                chunk_ids,
                product_version,
                tags,
                created_at,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChunkMetadata;
    use chrono::TimeZone;

    fn stored(id: &str, title: &str, source_type: SourceType, index: i64, tags: &[&str]) -> StoredChunk {
        StoredChunk {
            chunk_id: id.into(),
            metadata: ChunkMetadata {
                title: title.into(),
                source_type,
                text: String::new(),
                chunk_index: index,
                product_version: None,
                tags: tags.iter().map(|t| t.to_string()).collect(),
                section: None,
                ticket_id: None,
                content_hash: String::new(),
                created_at: Utc.timestamp_opt(1_000 + index, 0).unwrap(),
                extra: Default::default(),
            },
        }
    }

    #[test]
    fn test_chunk_count_matches_key() {
        let docs = group_documents(vec![
            stored("g1", "Guide", SourceType::Md, 1, &["auth"]),
            stored("g0", "Guide", SourceType::Md, 0, &["auth", "web"]),
            stored("t0", "Guide", SourceType::Zendesk, 0, &[]),
            stored("a0", "Alpha", SourceType::Txt, 0, &[]),
        ]);
        assert_eq!(docs.len(), 3);
        assert_eq!(docs[0].title, "Alpha");
        let guide = &docs[1];
        assert_eq!(guide.source_type, SourceType::Md);
        assert_eq!(guide.chunks_count, 2);
        assert_eq!(guide.chunk_ids, vec!["g0", "g1"]);
        assert_eq!(guide.tags, vec!["auth", "web"]);
        assert_eq!(guide.created_at.timestamp(), 1_000);
        assert_eq!(docs[2].source_type, SourceType::Zendesk);
    }

    #[test]
    fn test_versions_listed_separately() {
        let mut v1 = stored("g1-0", "Guide", SourceType::Md, 0, &[]);
        v1.metadata.product_version = Some("1.0".into());
        let mut v2 = stored("g2-0", "Guide", SourceType::Md, 0, &[]);
        v2.metadata.product_version = Some("2.0".into());
        let docs = group_documents(vec![v2, v1]);
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].product_version.as_deref(), Some("1.0"));
        assert_eq!(docs[0].chunk_ids, vec!["g1-0"]);
        assert_eq!(docs[1].product_version.as_deref(), Some("2.0"));
        assert_eq!(docs[1].chunks_count, 1);
    }

    #[test]
    fn test_empty_listing() {
        assert!(group_documents(vec![]).is_empty());
    }
}
