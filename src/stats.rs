//! Index and conversation-log overview for `support stats`.
//!
//! Chunk and document counts come from the configured vector store, so the
//! numbers are the same whether chunks live in SQLite or Qdrant. The
//! conversation tables always live in SQLite.

use anyhow::Result;
use sqlx::Row;

use support_harness_core::models::SourceType;

use crate::config::Config;
use crate::providers::Providers;

pub async fn run_stats(config: &Config) -> Result<()> {
    let providers = Providers::from_config(config).await?;
    let pool = &providers.pool;

    let total_chunks = providers.store.count().await?;
    let documents = providers.ingestor.list_documents(None).await?;

    let conversations: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM conversations")
        .fetch_one(pool)
        .await?;
    let messages: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages")
        .fetch_one(pool)
        .await?;
    let feedback: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM feedback")
        .fetch_one(pool)
        .await?;
    let last_message: Option<i64> = sqlx::query("SELECT MAX(created_at) AS last FROM messages")
        .fetch_one(pool)
        .await?
        .get("last");

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Support Harness Stats");
    println!("=======================");
    println!();
    println!("  Database:       {}", config.db.path.display());
    println!("  Size:           {}", format_bytes(db_size));
    println!(
        "  Vector store:   {} ({} {}d)",
        providers.store.backend(),
        providers.embedder.model_name(),
        providers.embedder.dims()
    );
    println!();
    println!("  Documents:      {}", documents.len());
    println!("  Chunks:         {}", total_chunks);
    println!("  Conversations:  {}", conversations);
    println!("  Messages:       {}", messages);
    println!("  Feedback:       {}", feedback);
    println!(
        "  Last message:   {}",
        last_message
            .map(format_ts_relative)
            .unwrap_or_else(|| "never".to_string())
    );

    if !documents.is_empty() {
        println!();
        println!("  By source type:");
        println!("  {:<10} {:>6} {:>8}", "TYPE", "DOCS", "CHUNKS");
        println!("  {}", "-".repeat(26));
        for st in SourceType::ALL {
            let (docs, chunks) = documents
                .iter()
                .filter(|d| d.source_type == st)
                .fold((0, 0), |(d, c), doc| (d + 1, c + doc.chunks_count));
            if docs > 0 {
                println!("  {:<10} {:>6} {:>8}", st.as_str(), docs, chunks);
            }
        }
    }

    println!();
    providers.pool.close().await;
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Millisecond timestamp as a relative time ("3 hours ago").
fn format_ts_relative(ts_ms: i64) -> String {
    let delta = (chrono::Utc::now().timestamp_millis() - ts_ms) / 1000;
    if delta < 0 {
        return format_ts_iso(ts_ms);
    }
    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts_ms)
    }
}

fn format_ts_iso(ts_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(ts_ms)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts_ms.to_string())
}
