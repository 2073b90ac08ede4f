//! Conversation assembler: one chat turn from request to recorded answer.
//!
//! ```text
//! resolve conversation ─▶ retrieve ─▶ history tail ─▶ prompt ─▶ generate ─▶ append user + assistant
//! ```
//!
//! Each turn is an independent invocation; the service holds only shared
//! handles to its backends. Nothing is recorded, not even a new
//! conversation header, unless generation succeeds.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::embedding::Embedder;
use crate::error::{RagError, Result};
use crate::generation::Generator;
use crate::history::ConversationStore;
use crate::models::{ChatRequest, ChatResponse, Conversation, Message};
use crate::prompt::{build_prompt, history_tail};
use crate::retrieval::{retrieve, RetrievalParams, RetrievalRequest};
use crate::store::VectorStore;

/// What to answer when no document clears the threshold.
#[derive(Debug, Clone, PartialEq)]
pub enum FallbackMode {
    /// Call the generator with the fallback system prompt and no context.
    Generate,
    /// Reply with a fixed message and skip the generator.
    Canned(String),
}

impl Default for FallbackMode {
    fn default() -> Self {
        FallbackMode::Generate
    }
}

#[derive(Debug, Clone)]
pub struct ChatSettings {
    pub retrieval: RetrievalParams,
    /// Prior turns (user + assistant pairs) replayed into the prompt.
    pub max_history_turns: usize,
    pub fallback: FallbackMode,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            retrieval: RetrievalParams::default(),
            max_history_turns: 5,
            fallback: FallbackMode::Generate,
        }
    }
}

/// Wires retrieval, generation, and the conversation log together.
#[derive(Clone)]
pub struct ChatService {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    generator: Arc<dyn Generator>,
    conversations: Arc<dyn ConversationStore>,
    settings: ChatSettings,
}

impl ChatService {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        generator: Arc<dyn Generator>,
        conversations: Arc<dyn ConversationStore>,
        settings: ChatSettings,
    ) -> Self {
        Self {
            embedder,
            store,
            generator,
            conversations,
            settings,
        }
    }

    /// Answer one chat turn.
    ///
    /// # Errors
    ///
    /// - `InvalidInput` for an empty `user_id` or `query`.
    /// - `NotFound` for an unknown `conversation_id`.
    /// - Provider errors from retrieval or generation, unchanged.
    pub async fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
        if request.user_id.trim().is_empty() {
            return Err(RagError::invalid("user_id must not be empty"));
        }
        let query = request.query.trim();
        if query.is_empty() {
            return Err(RagError::invalid("query must not be empty"));
        }

        let (conversation, is_new) = self.resolve_conversation(&request).await?;
        let scope = request
            .document_ids
            .clone()
            .or_else(|| conversation.document_ids.clone());
        let product_version = request
            .product_version
            .clone()
            .or_else(|| conversation.product_version.clone());

        let retrieval = retrieve(
            self.embedder.as_ref(),
            self.store.as_ref(),
            &self.settings.retrieval,
            &RetrievalRequest {
                query,
                scope: scope.as_deref(),
                product_version: product_version.as_deref(),
                threshold: None,
            },
        )
        .await?;

        let fallback = retrieval.fallback_triggered;
        let sources = retrieval.sources();
        let confidence = retrieval.confidence();

        let answer = match (&self.settings.fallback, fallback) {
            (FallbackMode::Canned(message), true) => message.clone(),
            _ => {
                let prior = self
                    .conversations
                    .recent_messages(
                        &conversation.id,
                        self.settings.max_history_turns.saturating_mul(2),
                    )
                    .await?;
                let prompt = build_prompt(
                    history_tail(&prior, self.settings.max_history_turns),
                    query,
                    fallback,
                );
                self.generator.generate(&prompt, &retrieval.passages()).await?
            }
        };

        if is_new {
            self.conversations.create(&conversation).await?;
        }
        self.conversations
            .append(&conversation.id, &Message::user(query))
            .await?;
        self.conversations
            .append(
                &conversation.id,
                &Message::assistant(answer.clone(), sources.clone(), confidence, fallback),
            )
            .await?;

        info!(
            conversation_id = %conversation.id,
            sources = sources.len(),
            confidence,
            fallback,
            "answered chat turn"
        );

        Ok(ChatResponse {
            answer,
            sources,
            conversation_id: conversation.id,
            confidence,
            fallback_triggered: fallback,
        })
    }

    /// Load the requested conversation, or build (but do not persist) a new one.
    async fn resolve_conversation(&self, request: &ChatRequest) -> Result<(Conversation, bool)> {
        if let Some(id) = &request.conversation_id {
            let existing = self.conversation(id).await?;
            return Ok((existing, false));
        }

        let now = Utc::now();
        let conversation = Conversation {
            id: Uuid::new_v4().to_string(),
            user_id: request.user_id.clone(),
            product_version: request.product_version.clone(),
            document_ids: request.document_ids.clone().filter(|ids| !ids.is_empty()),
            created_at: now,
            updated_at: now,
            messages: Vec::new(),
        };
        Ok((conversation, true))
    }

    /// Load a conversation and its messages. `NotFound` if unknown.
    pub async fn conversation(&self, id: &str) -> Result<Conversation> {
        self.conversations
            .get(id)
            .await?
            .ok_or_else(|| RagError::not_found(format!("conversation {}", id)))
    }
}
