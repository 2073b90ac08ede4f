//! Prompt templates and context rendering.
//!
//! Two system templates exist: the grounded one, used when retrieval found
//! relevant passages, and the fallback one, which tells the model it has no
//! authoritative context and must say so instead of guessing.

use crate::generation::{HistoryTurn, Passage, Prompt};
use crate::models::Message;

pub const GROUNDED_SYSTEM_PROMPT: &str = "You are a helpful customer support assistant. \
Use ONLY the provided context to answer the question. \
If the context does not contain the answer, say that you don't know. \
Cite sources as [Source N] when you use them. Be concise and accurate.";

pub const FALLBACK_SYSTEM_PROMPT: &str = "You are a helpful customer support assistant. \
No relevant documentation was found for this question. \
Do not invent product details or present guesses as facts. \
Tell the user you don't have enough information to answer reliably \
and suggest contacting the support team.";

/// Reply used by the `canned` fallback mode.
pub const DEFAULT_FALLBACK_MESSAGE: &str = "I don't have enough information to answer that question. \
Please contact our support team for assistance.";

/// Keep the last `max_turns` turns (two messages per turn) of `messages`.
pub fn history_tail(messages: &[Message], max_turns: usize) -> Vec<HistoryTurn> {
    let keep = max_turns.saturating_mul(2);
    let skip = messages.len().saturating_sub(keep);
    messages[skip..]
        .iter()
        .map(|m| HistoryTurn {
            role: m.role,
            text: m.text.clone(),
        })
        .collect()
}

/// Build the prompt for one chat turn.
pub fn build_prompt(history: Vec<HistoryTurn>, question: &str, fallback: bool) -> Prompt {
    let system = if fallback {
        FALLBACK_SYSTEM_PROMPT
    } else {
        GROUNDED_SYSTEM_PROMPT
    };
    Prompt {
        system: system.to_string(),
        history,
        question: question.to_string(),
        fallback,
    }
}

/// Render passages as numbered context blocks.
///
/// ```text
/// [Source 1] Password Guide (Section Account)
/// Reset your password via Settings > Account
/// ```
pub fn render_context(passages: &[Passage]) -> String {
    if passages.is_empty() {
        return "No relevant context found.".to_string();
    }
    let mut out = String::new();
    for (i, p) in passages.iter().enumerate() {
        out.push_str(&format!("[Source {}] {}", i + 1, p.title));
        if let Some(ticket) = &p.ticket_id {
            out.push_str(&format!(" (Ticket #{})", ticket));
        } else if let Some(section) = &p.section {
            out.push_str(&format!(" (Section {})", section));
        }
        out.push('\n');
        out.push_str(p.text.trim());
        out.push_str("\n\n");
    }
    out.truncate(out.trim_end().len());
    out
}

/// The final user-visible message sent to a chat-style model.
pub fn render_user_message(prompt: &Prompt, passages: &[Passage]) -> String {
    if prompt.fallback {
        format!("Question: {}", prompt.question)
    } else {
        format!(
            "Context:\n{}\n\nQuestion: {}",
            render_context(passages),
            prompt.question
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceType;

    fn passage(title: &str, ticket: Option<&str>, text: &str) -> Passage {
        Passage {
            chunk_id: "c".into(),
            title: title.into(),
            source_type: SourceType::Zendesk,
            section: None,
            ticket_id: ticket.map(String::from),
            text: text.into(),
        }
    }

    #[test]
    fn test_history_tail_bounds_turns() {
        let messages: Vec<Message> = (0..7).map(|i| Message::user(format!("m{}", i))).collect();
        let tail = history_tail(&messages, 2);
        assert_eq!(tail.len(), 4);
        assert_eq!(tail[0].text, "m3");
        assert_eq!(tail[3].text, "m6");
        assert!(history_tail(&messages, 0).is_empty());
        assert_eq!(history_tail(&messages, 10).len(), 7);
    }

    #[test]
    fn test_render_context_numbers_sources() {
        let ctx = render_context(&[
            passage("Login", Some("123"), "Clear cookies."),
            passage("Billing", None, "Invoices are monthly."),
        ]);
        assert!(ctx.starts_with("[Source 1] Login (Ticket #123)\nClear cookies."));
        assert!(ctx.contains("[Source 2] Billing\nInvoices are monthly."));
        assert!(!ctx.ends_with('\n'));
    }

    #[test]
    fn test_fallback_prompt_omits_context() {
        let prompt = build_prompt(vec![], "Where is my order?", true);
        assert_eq!(prompt.system, FALLBACK_SYSTEM_PROMPT);
        let msg = render_user_message(&prompt, &[]);
        assert_eq!(msg, "Question: Where is my order?");
    }
}
