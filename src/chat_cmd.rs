//! `support ask`, `support conversation`, and `support feedback`.

use anyhow::Result;

use support_harness_core::history::{conversation_feedback, submit_feedback};
use support_harness_core::models::{
    ChatRequest, ChatResponse, Conversation, Feedback, FeedbackRequest, Role,
};

use crate::config::Config;
use crate::providers::Providers;

pub async fn run_ask(config: &Config, request: ChatRequest) -> Result<()> {
    let providers = Providers::from_config(config).await?;
    let response = providers.chat.chat(request).await?;
    print_response(&response);
    providers.pool.close().await;
    Ok(())
}

fn print_response(response: &ChatResponse) {
    println!("{}", response.answer);
    println!();
    if response.fallback_triggered {
        println!("(no source cleared the similarity threshold)");
    } else {
        println!("Sources (confidence {:.2}):", response.confidence);
        for (i, source) in response.sources.iter().enumerate() {
            let locator = match (&source.ticket_id, &source.section) {
                (Some(ticket), _) => format!(" | Ticket #{}", ticket),
                (None, Some(section)) => format!(" | Section {}", section),
                (None, None) => String::new(),
            };
            println!(
                "  [{}] {} ({}{})  {:.3}  {}",
                i + 1,
                source.document_title,
                source.source_type,
                locator,
                source.confidence,
                source.chunk_id
            );
        }
    }
    println!();
    println!("conversation: {}", response.conversation_id);
}

pub async fn run_conversation(config: &Config, id: &str) -> Result<()> {
    let providers = Providers::from_config(config).await?;
    let conversation = providers.chat.conversation(id).await?;
    let feedback = conversation_feedback(
        providers.conversations.as_ref(),
        providers.feedback.as_ref(),
        id,
    )
    .await?;
    print_conversation(&conversation);
    print_feedback(&feedback);
    providers.pool.close().await;
    Ok(())
}

fn print_conversation(conversation: &Conversation) {
    println!("Conversation {}", conversation.id);
    println!("  user:     {}", conversation.user_id);
    if let Some(version) = &conversation.product_version {
        println!("  version:  {}", version);
    }
    if let Some(ids) = &conversation.document_ids {
        println!("  scope:    {}", ids.join(", "));
    }
    println!(
        "  started:  {}",
        conversation.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!();
    for message in &conversation.messages {
        let who = match message.role {
            Role::User => "user",
            Role::Assistant => "assistant",
        };
        println!("[{}] {}:", message.created_at.format("%H:%M:%S"), who);
        println!("  {}", message.text.replace('\n', "\n  "));
        if let Some(sources) = message.sources.as_ref().filter(|s| !s.is_empty()) {
            let titles: Vec<&str> = sources.iter().map(|s| s.document_title.as_str()).collect();
            println!("  sources: {}", titles.join(", "));
        }
        if message.fallback {
            println!("  (fallback)");
        }
    }
}

fn print_feedback(feedback: &[Feedback]) {
    if feedback.is_empty() {
        return;
    }
    println!();
    println!("Feedback:");
    for f in feedback {
        match &f.feedback_text {
            Some(text) => println!("  {}/5 by {}: {}", f.rating, f.user_id, text),
            None => println!("  {}/5 by {}", f.rating, f.user_id),
        }
    }
}

pub async fn run_feedback(config: &Config, request: FeedbackRequest) -> Result<()> {
    let providers = Providers::from_config(config).await?;
    let feedback = submit_feedback(
        providers.conversations.as_ref(),
        providers.feedback.as_ref(),
        request,
    )
    .await?;
    println!("Recorded feedback {} ({}/5)", feedback.id, feedback.rating);
    providers.pool.close().await;
    Ok(())
}
