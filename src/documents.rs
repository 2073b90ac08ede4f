//! Document listing and deletion commands.

use anyhow::Result;

use support_harness_core::models::{DocumentKey, SourceType};

use crate::config::Config;
use crate::providers::Providers;

pub async fn run_documents(config: &Config, product_version: Option<&str>) -> Result<()> {
    let providers = Providers::from_config(config).await?;
    let documents = providers.ingestor.list_documents(product_version).await?;

    if documents.is_empty() {
        println!("No documents indexed.");
    } else {
        println!(
            "{:<40} {:<8} {:>6}  {:<10} {}",
            "TITLE", "TYPE", "CHUNKS", "VERSION", "TAGS"
        );
        println!("{}", "-".repeat(80));
        for doc in &documents {
            println!(
                "{:<40} {:<8} {:>6}  {:<10} {}",
                doc.title,
                doc.source_type,
                doc.chunks_count,
                doc.product_version.as_deref().unwrap_or("-"),
                doc.tags.join(",")
            );
        }
        println!();
        println!("{} document(s)", documents.len());
    }

    providers.pool.close().await;
    Ok(())
}

pub async fn run_delete_document(config: &Config, title: &str, source_type: SourceType) -> Result<()> {
    let providers = Providers::from_config(config).await?;
    let removed = providers
        .ingestor
        .delete_document(&DocumentKey::new(title, source_type))
        .await?;
    println!(
        "Deleted '{}' ({}): {} chunk{}",
        title,
        source_type,
        removed,
        if removed == 1 { "" } else { "s" }
    );
    providers.pool.close().await;
    Ok(())
}

pub async fn run_delete_chunk(config: &Config, chunk_id: &str) -> Result<()> {
    let providers = Providers::from_config(config).await?;
    providers.ingestor.delete_chunk(chunk_id).await?;
    println!("Deleted chunk {}", chunk_id);
    providers.pool.close().await;
    Ok(())
}
