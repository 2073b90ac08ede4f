//! Core data models used throughout Support Harness.
//!
//! These types describe the chunks, conversations, and wire shapes that flow
//! through the ingestion, retrieval, and chat pipeline. Documents are not
//! modelled as stored entities: a document is the set of chunks sharing a
//! [`DocumentKey`].

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RagError;

/// Where a chunk's text originally came from.
///
/// The first four variants are document formats; `zendesk` and `jira` are
/// support tickets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Pdf,
    Docx,
    Txt,
    Md,
    Zendesk,
    Jira,
}

impl SourceType {
    pub const ALL: [SourceType; 6] = [
        SourceType::Pdf,
        SourceType::Docx,
        SourceType::Txt,
        SourceType::Md,
        SourceType::Zendesk,
        SourceType::Jira,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Pdf => "pdf",
            SourceType::Docx => "docx",
            SourceType::Txt => "txt",
            SourceType::Md => "md",
            SourceType::Zendesk => "zendesk",
            SourceType::Jira => "jira",
        }
    }

    pub fn is_ticket(&self) -> bool {
        matches!(self, SourceType::Zendesk | SourceType::Jira)
    }

    /// Guess a source type from a file extension (`md`, `markdown`, `txt`, ...).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "md" | "markdown" => Some(SourceType::Md),
            "txt" | "text" => Some(SourceType::Txt),
            "pdf" => Some(SourceType::Pdf),
            "docx" => Some(SourceType::Docx),
            _ => None,
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SourceType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                RagError::invalid(format!(
                    "unknown source type '{}' (expected one of: pdf, docx, txt, md, zendesk, jira)",
                    s
                ))
            })
    }
}

/// Identity of a logical document: every chunk with the same title and
/// source type belongs to the same document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentKey {
    pub title: String,
    pub source_type: SourceType,
}

impl DocumentKey {
    pub fn new(title: impl Into<String>, source_type: SourceType) -> Self {
        Self {
            title: title.into(),
            source_type,
        }
    }
}

/// Everything stored next to a chunk's vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub title: String,
    pub source_type: SourceType,
    pub text: String,
    /// Position of the chunk within its document (0-based).
    pub chunk_index: i64,
    #[serde(default)]
    pub product_version: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub section: Option<String>,
    #[serde(default)]
    pub ticket_id: Option<String>,
    /// SHA-256 of `text`. Recorded, not used for deduplication.
    pub content_hash: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ChunkMetadata {
    pub fn key(&self) -> DocumentKey {
        DocumentKey::new(self.title.clone(), self.source_type)
    }
}

/// A chunk as returned by [`VectorStore::list`](crate::store::VectorStore::list):
/// id plus metadata, without the vector.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredChunk {
    pub chunk_id: String,
    pub metadata: ChunkMetadata,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl FromStr for Role {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(RagError::storage(format!("unknown message role '{}'", other))),
        }
    }
}

/// A chunk-level citation attached to an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    pub document_title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticket_id: Option<String>,
    pub source_type: SourceType,
    pub chunk_id: String,
    /// Similarity of this chunk to the query, clamped to `[0, 1]`.
    pub confidence: f32,
}

/// One entry in a conversation's append-only log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<SourceRef>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(default)]
    pub fallback: bool,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            sources: None,
            confidence: None,
            fallback: false,
            created_at: Utc::now(),
        }
    }

    pub fn assistant(
        text: impl Into<String>,
        sources: Vec<SourceRef>,
        confidence: f32,
        fallback: bool,
    ) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
            sources: Some(sources),
            confidence: Some(confidence),
            fallback,
            created_at: Utc::now(),
        }
    }
}

/// Conversation header. Messages are stored separately and attached on read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub user_id: String,
    #[serde(default)]
    pub product_version: Option<String>,
    #[serde(default)]
    pub document_ids: Option<Vec<String>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub messages: Vec<Message>,
}

/// Incoming chat turn.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatRequest {
    pub user_id: String,
    pub query: String,
    #[serde(default)]
    pub product_version: Option<String>,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub document_ids: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub answer: String,
    pub sources: Vec<SourceRef>,
    pub conversation_id: String,
    pub confidence: f32,
    pub fallback_triggered: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackRequest {
    pub conversation_id: String,
    pub user_id: String,
    pub rating: u8,
    #[serde(default)]
    pub feedback_text: Option<String>,
}

/// An immutable rating recorded against a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    pub id: String,
    pub conversation_id: String,
    pub user_id: String,
    pub rating: u8,
    #[serde(default)]
    pub feedback_text: Option<String>,
    pub created_at: DateTime<Utc>,
}
