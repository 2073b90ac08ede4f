//! Conversation log and feedback storage traits.
//!
//! Conversations are append-only: a header created on the first turn plus
//! an ordered message log keyed by conversation id. Nothing here updates or
//! deletes a message. Concurrent turns on the same conversation may
//! interleave their appends; that race is accepted.
//!
//! The in-memory implementations exist for tests. Deployments use the
//! SQLite stores in the app crate.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::error::{RagError, Result};
use crate::models::{Conversation, Feedback, FeedbackRequest, Message};

#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Persist a new conversation header. Its `messages` are ignored.
    async fn create(&self, conversation: &Conversation) -> Result<()>;

    /// Load a conversation with its full message log.
    async fn get(&self, id: &str) -> Result<Option<Conversation>>;

    /// Append one message. Fails with `NotFound` for an unknown id.
    async fn append(&self, conversation_id: &str, message: &Message) -> Result<()>;

    /// The last `limit` messages, oldest first.
    async fn recent_messages(&self, conversation_id: &str, limit: usize) -> Result<Vec<Message>>;

    async fn count(&self) -> Result<usize>;
}

#[async_trait]
pub trait FeedbackStore: Send + Sync {
    async fn insert(&self, feedback: &Feedback) -> Result<()>;
    async fn list_for_conversation(&self, conversation_id: &str) -> Result<Vec<Feedback>>;
    async fn count(&self) -> Result<usize>;
}

/// Validate and record a rating.
///
/// Ratings must be `1..=5` and the conversation must exist. The
/// conversation itself is never modified.
pub async fn submit_feedback(
    conversations: &dyn ConversationStore,
    store: &dyn FeedbackStore,
    request: FeedbackRequest,
) -> Result<Feedback> {
    if !(1..=5).contains(&request.rating) {
        return Err(RagError::invalid(format!(
            "rating must be between 1 and 5, got {}",
            request.rating
        )));
    }
    if request.user_id.trim().is_empty() {
        return Err(RagError::invalid("user_id must not be empty"));
    }
    if conversations.get(&request.conversation_id).await?.is_none() {
        return Err(RagError::not_found(format!(
            "conversation {}",
            request.conversation_id
        )));
    }

    let feedback = Feedback {
        id: Uuid::new_v4().to_string(),
        conversation_id: request.conversation_id,
        user_id: request.user_id,
        rating: request.rating,
        feedback_text: request.feedback_text.filter(|t| !t.trim().is_empty()),
        created_at: Utc::now(),
    };
    store.insert(&feedback).await?;
    Ok(feedback)
}

/// Every rating recorded for a conversation, oldest first.
///
/// Fails with `NotFound` for an unknown conversation so callers can tell it
/// apart from one that has simply not been rated.
pub async fn conversation_feedback(
    conversations: &dyn ConversationStore,
    store: &dyn FeedbackStore,
    conversation_id: &str,
) -> Result<Vec<Feedback>> {
    if conversations.get(conversation_id).await?.is_none() {
        return Err(RagError::not_found(format!(
            "conversation {}",
            conversation_id
        )));
    }
    store.list_for_conversation(conversation_id).await
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| RagError::storage("in-memory history lock poisoned"))
}

/// Test double for [`ConversationStore`].
#[derive(Default)]
pub struct InMemoryConversationStore {
    conversations: Mutex<HashMap<String, Conversation>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn create(&self, conversation: &Conversation) -> Result<()> {
        let mut header = conversation.clone();
        header.messages.clear();
        lock(&self.conversations)?.insert(header.id.clone(), header);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Conversation>> {
        Ok(lock(&self.conversations)?.get(id).cloned())
    }

    async fn append(&self, conversation_id: &str, message: &Message) -> Result<()> {
        let mut conversations = lock(&self.conversations)?;
        let conversation = conversations
            .get_mut(conversation_id)
            .ok_or_else(|| RagError::not_found(format!("conversation {}", conversation_id)))?;
        conversation.messages.push(message.clone());
        conversation.updated_at = message.created_at;
        Ok(())
    }

    async fn recent_messages(&self, conversation_id: &str, limit: usize) -> Result<Vec<Message>> {
        let conversations = lock(&self.conversations)?;
        let messages = conversations
            .get(conversation_id)
            .map(|c| c.messages.as_slice())
            .unwrap_or_default();
        let skip = messages.len().saturating_sub(limit);
        Ok(messages[skip..].to_vec())
    }

    async fn count(&self) -> Result<usize> {
        Ok(lock(&self.conversations)?.len())
    }
}

/// Test double for [`FeedbackStore`].
#[derive(Default)]
pub struct InMemoryFeedbackStore {
    feedback: Mutex<Vec<Feedback>>,
}

impl InMemoryFeedbackStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FeedbackStore for InMemoryFeedbackStore {
    async fn insert(&self, feedback: &Feedback) -> Result<()> {
        lock(&self.feedback)?.push(feedback.clone());
        Ok(())
    }

    async fn list_for_conversation(&self, conversation_id: &str) -> Result<Vec<Feedback>> {
        Ok(lock(&self.feedback)?
            .iter()
            .filter(|f| f.conversation_id == conversation_id)
            .cloned()
            .collect())
    }

    async fn count(&self) -> Result<usize> {
        Ok(lock(&self.feedback)?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conversation(id: &str) -> Conversation {
        let now = Utc::now();
        Conversation {
            id: id.into(),
            user_id: "u1".into(),
            product_version: None,
            document_ids: None,
            created_at: now,
            updated_at: now,
            messages: vec![],
        }
    }

    fn request(conversation_id: &str, rating: u8) -> FeedbackRequest {
        FeedbackRequest {
            conversation_id: conversation_id.into(),
            user_id: "u1".into(),
            rating,
            feedback_text: Some("helpful".into()),
        }
    }

    #[tokio::test]
    async fn test_append_and_tail() {
        let store = InMemoryConversationStore::new();
        store.create(&conversation("c")).await.unwrap();
        for i in 0..5 {
            store.append("c", &Message::user(format!("m{}", i))).await.unwrap();
        }
        let tail = store.recent_messages("c", 2).await.unwrap();
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].text, "m3");
        assert_eq!(store.get("c").await.unwrap().unwrap().messages.len(), 5);
    }

    #[tokio::test]
    async fn test_append_unknown_conversation() {
        let store = InMemoryConversationStore::new();
        let err = store.append("nope", &Message::user("hi")).await.unwrap_err();
        assert!(matches!(err, RagError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_feedback_validation() {
        let conversations = InMemoryConversationStore::new();
        let feedback = InMemoryFeedbackStore::new();
        conversations.create(&conversation("c")).await.unwrap();

        let err = submit_feedback(&conversations, &feedback, request("c", 0))
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::InvalidInput(_)));
        let err = submit_feedback(&conversations, &feedback, request("c", 6))
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::InvalidInput(_)));
        let err = submit_feedback(&conversations, &feedback, request("missing", 4))
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::NotFound(_)));

        let saved = submit_feedback(&conversations, &feedback, request("c", 5))
            .await
            .unwrap();
        assert_eq!(saved.rating, 5);
        let listed = feedback.list_for_conversation("c").await.unwrap();
        assert_eq!(listed, vec![saved]);
    }

    #[tokio::test]
    async fn test_conversation_feedback_requires_conversation() {
        let conversations = InMemoryConversationStore::new();
        let feedback = InMemoryFeedbackStore::new();
        conversations.create(&conversation("c")).await.unwrap();

        assert!(conversation_feedback(&conversations, &feedback, "c")
            .await
            .unwrap()
            .is_empty());
        let err = conversation_feedback(&conversations, &feedback, "missing")
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::NotFound(_)));

        submit_feedback(&conversations, &feedback, request("c", 2))
            .await
            .unwrap();
        submit_feedback(&conversations, &feedback, request("c", 4))
            .await
            .unwrap();
        let ratings: Vec<u8> = conversation_feedback(&conversations, &feedback, "c")
            .await
            .unwrap()
            .iter()
            .map(|f| f.rating)
            .collect();
        assert_eq!(ratings, vec![2, 4]);
    }
}
