//! # Support Harness
//!
//! Retrieval-augmented support answers over product documentation and past
//! support tickets.
//!
//! The pipeline logic (chunking, retrieval, prompt assembly, conversation
//! bookkeeping) lives in `support-harness-core` behind provider traits. This
//! crate supplies the concrete backends, configuration, the `support` CLI,
//! and the HTTP API.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────────┐   ┌──────────────┐
//! │ Files /    │──▶│ Chunk+Embed  │──▶│ Vector store │
//! │ Tickets    │   │  (Ingestor)  │   │ SQLite/Qdrant│
//! └────────────┘   └──────────────┘   └──────┬───────┘
//!                                            │
//!                  ┌──────────────┐   ┌──────▼───────┐
//!   question ─────▶│ ChatService  │◀──│  Retrieval   │
//!                  └──────┬───────┘   └──────────────┘
//!                         ▼
//!                  ┌──────────────┐
//!                  │  Generator   │──▶ answer + sources
//!                  └──────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`db`] / [`migrate`] | SQLite pool and schema |
//! | [`embedding`] | OpenAI, Ollama, local, and hashing embedders |
//! | [`generation`] | OpenAI, Ollama, and extractive generators |
//! | [`guard`] | Timeouts and retries around every backend call |
//! | [`sqlite_store`] / [`qdrant_store`] | Vector store backends |
//! | [`history_store`] | Conversation and feedback persistence |
//! | [`tickets`] | Ticket export conversion |
//! | [`providers`] | Backend selection and service wiring |
//! | [`server`] | HTTP API |

pub mod chat_cmd;
pub mod config;
pub mod db;
pub mod documents;
pub mod embedding;
pub mod generation;
pub mod guard;
pub mod history_store;
pub mod ingest;
pub mod logging;
pub mod migrate;
pub mod providers;
pub mod qdrant_store;
pub mod remote;
pub mod server;
pub mod sqlite_store;
pub mod stats;
pub mod tickets;
