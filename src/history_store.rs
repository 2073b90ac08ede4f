//! SQLite conversation log and feedback table.
//!
//! Messages are rows in an append-only table ordered by an autoincrement
//! `seq`, so two appends in the same millisecond still have a defined
//! order. Appending bumps the conversation's `updated_at`.

use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use support_harness_core::history::{ConversationStore, FeedbackStore};
use support_harness_core::models::{Conversation, Feedback, Message, Role, SourceRef};
use support_harness_core::{RagError, Result};

use crate::sqlite_store::{db_err, millis_to_datetime};

pub struct SqliteConversationStore {
    pool: SqlitePool,
}

impl SqliteConversationStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn messages(&self, conversation_id: &str, limit: Option<usize>) -> Result<Vec<Message>> {
        // Newest first with the limit applied, then reversed.
        let rows = sqlx::query(
            r#"
            SELECT role, text, sources_json, confidence, fallback, created_at
            FROM messages
            WHERE conversation_id = ?
            ORDER BY seq DESC
            LIMIT ?
            "#,
        )
        .bind(conversation_id)
        .bind(limit.map(|l| l as i64).unwrap_or(-1))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut messages = rows.iter().map(row_to_message).collect::<Result<Vec<_>>>()?;
        messages.reverse();
        Ok(messages)
    }
}

fn row_to_message(row: &SqliteRow) -> Result<Message> {
    let role: String = row.try_get("role").map_err(db_err)?;
    let sources_json: Option<String> = row.try_get("sources_json").map_err(db_err)?;
    let confidence: Option<f64> = row.try_get("confidence").map_err(db_err)?;
    let fallback: bool = row.try_get("fallback").map_err(db_err)?;
    let created_at: i64 = row.try_get("created_at").map_err(db_err)?;

    let sources = match sources_json {
        Some(json) => Some(
            serde_json::from_str::<Vec<SourceRef>>(&json)
                .map_err(|e| RagError::storage(format!("corrupt message sources: {}", e)))?,
        ),
        None => None,
    };

    Ok(Message {
        role: role.parse::<Role>()?,
        text: row.try_get("text").map_err(db_err)?,
        sources,
        confidence: confidence.map(|c| c as f32),
        fallback,
        created_at: millis_to_datetime(created_at)?,
    })
}

#[async_trait]
impl ConversationStore for SqliteConversationStore {
    async fn create(&self, conversation: &Conversation) -> Result<()> {
        let document_ids = conversation
            .document_ids
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| RagError::storage(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO conversations (id, user_id, product_version, document_ids_json, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&conversation.id)
        .bind(&conversation.user_id)
        .bind(&conversation.product_version)
        .bind(document_ids)
        .bind(conversation.created_at.timestamp_millis())
        .bind(conversation.updated_at.timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Conversation>> {
        let row = sqlx::query(
            "SELECT id, user_id, product_version, document_ids_json, created_at, updated_at \
             FROM conversations WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let document_ids_json: Option<String> = row.try_get("document_ids_json").map_err(db_err)?;
        let document_ids = match document_ids_json {
            Some(json) => Some(
                serde_json::from_str::<Vec<String>>(&json)
                    .map_err(|e| RagError::storage(format!("corrupt document scope: {}", e)))?,
            ),
            None => None,
        };
        let created_at: i64 = row.try_get("created_at").map_err(db_err)?;
        let updated_at: i64 = row.try_get("updated_at").map_err(db_err)?;

        Ok(Some(Conversation {
            id: row.try_get("id").map_err(db_err)?,
            user_id: row.try_get("user_id").map_err(db_err)?,
            product_version: row.try_get("product_version").map_err(db_err)?,
            document_ids,
            created_at: millis_to_datetime(created_at)?,
            updated_at: millis_to_datetime(updated_at)?,
            messages: self.messages(id, None).await?,
        }))
    }

    async fn append(&self, conversation_id: &str, message: &Message) -> Result<()> {
        let sources = message
            .sources
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| RagError::storage(e.to_string()))?;
        let at = message.created_at.timestamp_millis();

        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let touched = sqlx::query("UPDATE conversations SET updated_at = ? WHERE id = ?")
            .bind(at)
            .bind(conversation_id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        if touched.rows_affected() == 0 {
            return Err(RagError::not_found(format!("conversation {}", conversation_id)));
        }

        sqlx::query(
            r#"
            INSERT INTO messages (conversation_id, role, text, sources_json, confidence, fallback, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(conversation_id)
        .bind(message.role.as_str())
        .bind(&message.text)
        .bind(sources)
        .bind(message.confidence.map(f64::from))
        .bind(message.fallback)
        .bind(at)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn recent_messages(&self, conversation_id: &str, limit: usize) -> Result<Vec<Message>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        self.messages(conversation_id, Some(limit)).await
    }

    async fn count(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM conversations")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(count as usize)
    }
}

pub struct SqliteFeedbackStore {
    pool: SqlitePool,
}

impl SqliteFeedbackStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn row_to_feedback(row: &SqliteRow) -> Result<Feedback> {
    let rating: i64 = row.try_get("rating").map_err(db_err)?;
    let created_at: i64 = row.try_get("created_at").map_err(db_err)?;
    Ok(Feedback {
        id: row.try_get("id").map_err(db_err)?,
        conversation_id: row.try_get("conversation_id").map_err(db_err)?,
        user_id: row.try_get("user_id").map_err(db_err)?,
        rating: u8::try_from(rating)
            .map_err(|_| RagError::storage(format!("invalid stored rating {}", rating)))?,
        feedback_text: row.try_get("feedback_text").map_err(db_err)?,
        created_at: millis_to_datetime(created_at)?,
    })
}

#[async_trait]
impl FeedbackStore for SqliteFeedbackStore {
    async fn insert(&self, feedback: &Feedback) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO feedback (id, conversation_id, user_id, rating, feedback_text, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&feedback.id)
        .bind(&feedback.conversation_id)
        .bind(&feedback.user_id)
        .bind(feedback.rating as i64)
        .bind(&feedback.feedback_text)
        .bind(feedback.created_at.timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn list_for_conversation(&self, conversation_id: &str) -> Result<Vec<Feedback>> {
        let rows = sqlx::query(
            "SELECT id, conversation_id, user_id, rating, feedback_text, created_at \
             FROM feedback WHERE conversation_id = ? ORDER BY created_at, id",
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(row_to_feedback).collect()
    }

    async fn count(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM feedback")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(count as usize)
    }
}
