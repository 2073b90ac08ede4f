//! # Support Harness Core
//!
//! Runtime-agnostic logic for Support Harness: data models, chunking, the
//! three provider capability traits (embedding, vector storage, generation),
//! the retrieval engine, and the conversation assembler.
//!
//! This crate contains no tokio, sqlx, HTTP clients, or filesystem I/O.
//! Concrete backends live in the `support-harness` app crate and are
//! handed to this crate as trait objects.
//!
//! ```text
//! IngestDocument ──chunk──▶ windows ──Embedder──▶ VectorStore
//!                                                      │
//! ChatRequest ──Embedder──▶ query ─────────────────────┘
//!      │                       │
//!      │                group by (title, source_type), MAX, ≥ τ
//!      ▼                       ▼
//! ConversationStore ◀── assemble prompt ──Generator──▶ ChatResponse
//! ```

pub mod chat;
pub mod chunk;
pub mod documents;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod history;
pub mod ingest;
pub mod models;
pub mod prompt;
pub mod retrieval;
pub mod store;

pub use error::{RagError, Result};
