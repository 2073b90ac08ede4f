//! Generator capability trait and the prompt shapes it consumes.

use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;
use crate::models::{Role, SourceType};

/// A retrieved chunk handed to the generator as context.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Passage {
    pub chunk_id: String,
    pub title: String,
    pub source_type: SourceType,
    pub section: Option<String>,
    pub ticket_id: Option<String>,
    pub text: String,
}

/// One prior message replayed into the prompt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryTurn {
    pub role: Role,
    pub text: String,
}

/// Everything the generator needs apart from the context passages.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prompt {
    pub system: String,
    pub history: Vec<HistoryTurn>,
    pub question: String,
    /// Set when retrieval found nothing above the threshold.
    pub fallback: bool,
}

/// Produces answer text from a prompt and its context passages.
///
/// `passages` is empty when retrieval fell back. Implementations fail with
/// `ProviderUnavailable` or `RateLimited`; callers never retry them.
#[async_trait]
pub trait Generator: Send + Sync {
    fn model_name(&self) -> &str;
    async fn generate(&self, prompt: &Prompt, passages: &[Passage]) -> Result<String>;
}
