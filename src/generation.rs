//! Generation backends.
//!
//! | `[generation] provider` | Backend |
//! |-------------------------|---------|
//! | `openai` | [`OpenAiGenerator`], `POST /v1/chat/completions`, `OPENAI_API_KEY` |
//! | `ollama` | [`OllamaGenerator`], `POST /api/chat` with `stream: false` |
//! | `extractive` | [`ExtractiveGenerator`], offline, best passage verbatim |
//!
//! Chat backends receive the system prompt, the replayed history, and one
//! user message holding the rendered context and the question.

use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use support_harness_core::generation::{Generator, Passage, Prompt};
use support_harness_core::prompt::{render_user_message, DEFAULT_FALLBACK_MESSAGE};
use support_harness_core::RagError;

use crate::config::{GenerationConfig, GenerationProviderKind};
use crate::remote;

const OPENAI_URL: &str = "https://api.openai.com/v1";
const OLLAMA_URL: &str = "http://localhost:11434";

/// Create the configured generator, unguarded.
pub fn create_generator(config: &GenerationConfig) -> Result<Box<dyn Generator>> {
    match config.provider {
        GenerationProviderKind::Openai => Ok(Box::new(OpenAiGenerator::new(config)?)),
        GenerationProviderKind::Ollama => Ok(Box::new(OllamaGenerator::new(config)?)),
        GenerationProviderKind::Extractive => Ok(Box::new(ExtractiveGenerator)),
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct ChatMessage {
    role: String,
    content: String,
}

/// System, history, then the context-bearing user message.
fn chat_messages(prompt: &Prompt, passages: &[Passage]) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(prompt.history.len() + 2);
    messages.push(ChatMessage {
        role: "system".into(),
        content: prompt.system.clone(),
    });
    for turn in &prompt.history {
        messages.push(ChatMessage {
            role: turn.role.as_str().into(),
            content: turn.text.clone(),
        });
    }
    messages.push(ChatMessage {
        role: "user".into(),
        content: render_user_message(prompt, passages),
    });
    messages
}

fn empty_answer(provider: &str) -> RagError {
    RagError::storage(format!("{} returned an empty completion", provider))
}

// ============ OpenAI ============

#[derive(Debug, Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiMessage {
    #[serde(default)]
    content: Option<String>,
}

pub struct OpenAiGenerator {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let Some(model) = config.model.clone() else {
            bail!("generation.model required for OpenAI provider");
        };
        let Ok(api_key) = std::env::var("OPENAI_API_KEY") else {
            bail!("OPENAI_API_KEY environment variable not set");
        };
        Ok(Self {
            client: remote::client(Duration::from_secs(config.timeout_secs))?,
            url: config.url.clone().unwrap_or_else(|| OPENAI_URL.to_string()),
            api_key,
            model,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }
}

#[async_trait]
impl Generator for OpenAiGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &Prompt, passages: &[Passage]) -> support_harness_core::Result<String> {
        let url = format!("{}/chat/completions", self.url.trim_end_matches('/'));
        let request = OpenAiRequest {
            model: &self.model,
            messages: chat_messages(prompt, passages),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| remote::send_error("OpenAI", &url, e))?;
        let body = remote::json_body("OpenAI", response).await?;
        let parsed: OpenAiResponse = serde_json::from_value(body)
            .map_err(|e| RagError::storage(format!("invalid OpenAI completion: {}", e)))?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| empty_answer("OpenAI"))
    }
}

// ============ Ollama ============

#[derive(Debug, Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    message: ChatMessage,
}

pub struct OllamaGenerator {
    client: reqwest::Client,
    url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OllamaGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let Some(model) = config.model.clone() else {
            bail!("generation.model required for Ollama provider");
        };
        Ok(Self {
            client: remote::client(Duration::from_secs(config.timeout_secs))?,
            url: config.url.clone().unwrap_or_else(|| OLLAMA_URL.to_string()),
            model,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &Prompt, passages: &[Passage]) -> support_harness_core::Result<String> {
        let url = format!("{}/api/chat", self.url.trim_end_matches('/'));
        let request = OllamaRequest {
            model: &self.model,
            messages: chat_messages(prompt, passages),
            stream: false,
            options: OllamaOptions {
                temperature: self.temperature,
                num_predict: self.max_tokens,
            },
        };
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| remote::send_error("Ollama", &url, e))?;
        let body = remote::json_body("Ollama", response).await?;
        let parsed: OllamaResponse = serde_json::from_value(body)
            .map_err(|e| RagError::storage(format!("invalid Ollama completion: {}", e)))?;
        let answer = parsed.message.content.trim().to_string();
        if answer.is_empty() {
            return Err(empty_answer("Ollama"));
        }
        Ok(answer)
    }
}

// ============ Extractive ============

/// Answers with the top passage verbatim; no model involved.
pub struct ExtractiveGenerator;

#[async_trait]
impl Generator for ExtractiveGenerator {
    fn model_name(&self) -> &str {
        "extractive"
    }

    async fn generate(&self, _prompt: &Prompt, passages: &[Passage]) -> support_harness_core::Result<String> {
        Ok(passages
            .first()
            .map(|p| p.text.trim().to_string())
            .unwrap_or_else(|| DEFAULT_FALLBACK_MESSAGE.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use support_harness_core::generation::HistoryTurn;
    use support_harness_core::models::{Role, SourceType};
    use support_harness_core::prompt::build_prompt;

    fn passage(title: &str, text: &str) -> Passage {
        Passage {
            chunk_id: "c1".into(),
            title: title.into(),
            source_type: SourceType::Md,
            section: None,
            ticket_id: None,
            text: text.into(),
        }
    }

    #[test]
    fn test_chat_messages_layout() {
        let history = vec![
            HistoryTurn {
                role: Role::User,
                text: "hi".into(),
            },
            HistoryTurn {
                role: Role::Assistant,
                text: "hello".into(),
            },
        ];
        let prompt = build_prompt(history, "How do I reset?", false);
        let messages = chat_messages(&prompt, &[passage("Guide", "Use settings.")]);
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[1].role, "user");
        assert_eq!(messages[2].role, "assistant");
        assert!(messages[3].content.contains("[Source 1] Guide"));
        assert!(messages[3].content.ends_with("Question: How do I reset?"));
    }

    #[tokio::test]
    async fn test_extractive_answers() {
        let prompt = build_prompt(vec![], "q", false);
        let answer = ExtractiveGenerator
            .generate(&prompt, &[passage("Guide", " Use settings. "), passage("Other", "x")])
            .await
            .unwrap();
        assert_eq!(answer, "Use settings.");

        let prompt = build_prompt(vec![], "q", true);
        let answer = ExtractiveGenerator.generate(&prompt, &[]).await.unwrap();
        assert_eq!(answer, DEFAULT_FALLBACK_MESSAGE);
    }

    #[test]
    fn test_ollama_requires_model() {
        let config = GenerationConfig {
            provider: GenerationProviderKind::Ollama,
            ..GenerationConfig::default()
        };
        assert!(create_generator(&config).is_err());
    }
}
