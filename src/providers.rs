//! Startup wiring: config → guarded backends → services.
//!
//! Every backend is chosen once from its closed config enum and wrapped in
//! a [`Guarded`] with its section's timeout and retry policy. The core
//! services only ever see the trait objects.

use std::sync::Arc;

use anyhow::Result;
use sqlx::SqlitePool;
use tracing::info;

use support_harness_core::chat::ChatService;
use support_harness_core::embedding::Embedder;
use support_harness_core::generation::Generator;
use support_harness_core::history::{ConversationStore, FeedbackStore};
use support_harness_core::ingest::Ingestor;
use support_harness_core::store::memory::InMemoryVectorStore;
use support_harness_core::store::VectorStore;

use crate::config::{Config, VectorStoreKind};
use crate::db;
use crate::embedding::create_embedder;
use crate::generation::create_generator;
use crate::guard::{CallPolicy, Guarded};
use crate::history_store::{SqliteConversationStore, SqliteFeedbackStore};
use crate::migrate;
use crate::qdrant_store::QdrantVectorStore;
use crate::sqlite_store::SqliteVectorStore;

/// Shared handles for one running instance.
#[derive(Clone)]
pub struct Providers {
    pub pool: SqlitePool,
    pub embedder: Arc<dyn Embedder>,
    pub store: Arc<dyn VectorStore>,
    pub generator: Arc<dyn Generator>,
    pub conversations: Arc<dyn ConversationStore>,
    pub feedback: Arc<dyn FeedbackStore>,
    pub ingestor: Ingestor,
    pub chat: ChatService,
}

impl Providers {
    /// Open the database (migrating it) and build every backend.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::migrate_pool(&pool).await?;
        Self::with_pool(config, pool)
    }

    pub fn with_pool(config: &Config, pool: SqlitePool) -> Result<Self> {
        let embedding = &config.embedding;
        let embedder: Arc<dyn Embedder> = Arc::new(Guarded::new(
            create_embedder(embedding)?,
            CallPolicy::new(embedding.timeout_secs, embedding.max_retries, embedding.backoff_ms),
        ));

        let vs = &config.vector_store;
        let raw_store: Box<dyn VectorStore> = match vs.provider {
            VectorStoreKind::Sqlite => Box::new(SqliteVectorStore::new(pool.clone())),
            VectorStoreKind::Memory => Box::new(InMemoryVectorStore::new()),
            VectorStoreKind::Qdrant => Box::new(QdrantVectorStore::new(vs)?),
        };
        let store: Arc<dyn VectorStore> = Arc::new(Guarded::new(
            raw_store,
            CallPolicy::new(vs.timeout_secs, vs.max_retries, vs.backoff_ms),
        ));

        let generation = &config.generation;
        let generator: Arc<dyn Generator> = Arc::new(Guarded::new(
            create_generator(generation)?,
            CallPolicy::new(generation.timeout_secs, 0, 0),
        ));

        let conversations: Arc<dyn ConversationStore> =
            Arc::new(SqliteConversationStore::new(pool.clone()));
        let feedback: Arc<dyn FeedbackStore> = Arc::new(SqliteFeedbackStore::new(pool.clone()));

        let ingestor = Ingestor::new(embedder.clone(), store.clone(), config.chunking_params()?);
        let chat = ChatService::new(
            embedder.clone(),
            store.clone(),
            generator.clone(),
            conversations.clone(),
            config.chat_settings()?,
        );

        info!(
            embedding = embedding.provider.as_str(),
            model = embedder.model_name(),
            dims = embedder.dims(),
            vector_store = vs.provider.as_str(),
            generation = generation.provider.as_str(),
            "providers ready"
        );

        Ok(Self {
            pool,
            embedder,
            store,
            generator,
            conversations,
            feedback,
            ingestor,
            chat,
        })
    }
}
