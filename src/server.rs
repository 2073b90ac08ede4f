//! HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/health` | Status, version, providers, chunk count |
//! | `POST` | `/chat` | One chat turn |
//! | `POST` | `/ingest` | Ingest a document or explicit chunks |
//! | `POST` | `/upload` | Ingest already-extracted file text |
//! | `POST` | `/upload/tickets` | Convert and ingest a ticket export |
//! | `GET` | `/documents` | Derived document listing (`?product_version=`) |
//! | `DELETE` | `/documents/{source_type}/{title}` | Delete a document's chunks |
//! | `DELETE` | `/chunks/{id}` | Delete one chunk |
//! | `GET` | `/conversations/{id}` | Conversation with messages |
//! | `GET` | `/conversations/{id}/feedback` | Ratings recorded for a conversation |
//! | `POST` | `/feedback` | Rate a conversation |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! | Code | Status |
//! |------|--------|
//! | `bad_request` | 400 |
//! | `not_found` | 404 |
//! | `dimension_mismatch` | 409 |
//! | `rate_limited` | 429, with `Retry-After` when known |
//! | `internal` | 500 |
//! | `provider_unavailable` | 503 |
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so a browser chat UI can
//! call the API directly.

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use support_harness_core::documents::DocumentSummary;
use support_harness_core::history::{conversation_feedback, submit_feedback};
use support_harness_core::ingest::{ChunkInput, IngestDocument, IngestReport};
use support_harness_core::models::{
    ChatRequest, ChatResponse, Conversation, DocumentKey, Feedback, FeedbackRequest, SourceType,
};
use support_harness_core::RagError;

use crate::config::Config;
use crate::ingest::{ingest_documents, DocumentReport};
use crate::providers::Providers;
use crate::tickets::{documents_from_export, SkippedRecord, TicketFormat};

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    providers: Providers,
    config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config, providers: Providers) -> Self {
        Self {
            providers,
            config: Arc::new(config),
        }
    }
}

/// Build the router over already-constructed providers.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/chat", post(handle_chat))
        .route("/ingest", post(handle_ingest))
        .route("/upload", post(handle_upload))
        .route("/upload/tickets", post(handle_upload_tickets))
        .route("/documents", get(handle_documents))
        .route("/documents/{source_type}/{title}", delete(handle_delete_document))
        .route("/chunks/{id}", delete(handle_delete_chunk))
        .route("/conversations/{id}", get(handle_conversation))
        .route("/conversations/{id}/feedback", get(handle_conversation_feedback))
        .route("/feedback", post(handle_feedback))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Serve on an already-bound listener until the process ends.
pub async fn serve(listener: tokio::net::TcpListener, state: AppState) -> anyhow::Result<()> {
    axum::serve(listener, build_router(state)).await?;
    Ok(())
}

/// Start the server on `[server] bind`.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let providers = Providers::from_config(config).await?;
    let bind_addr = config.server.bind.clone();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    info!(bind = %bind_addr, "support server listening");
    println!("Support server listening on http://{}", bind_addr);

    serve(listener, AppState::new(config.clone(), providers)).await
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

pub struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
    retry_after: Option<u64>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        let mut response = (self.status, Json(body)).into_response();
        if let Some(secs) = self.retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
        retry_after: None,
    }
}

impl From<RagError> for AppError {
    fn from(err: RagError) -> Self {
        let message = err.to_string();
        let (status, code, retry_after) = match &err {
            RagError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "bad_request", None),
            RagError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found", None),
            RagError::RateLimited { retry_after, .. } => (
                StatusCode::TOO_MANY_REQUESTS,
                "rate_limited",
                Some(retry_after.map(|d| d.as_secs().max(1)).unwrap_or(1)),
            ),
            RagError::ProviderUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "provider_unavailable", None)
            }
            RagError::DimensionMismatch { .. } => {
                (StatusCode::CONFLICT, "dimension_mismatch", None)
            }
            RagError::Storage(_) | RagError::Config(_) => {
                error!(error = %message, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal", None)
            }
        };
        AppError {
            status,
            code,
            message,
            retry_after,
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        bad_request(rejection.body_text())
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    providers: ProviderInfo,
    chunks: Option<usize>,
}

#[derive(Serialize)]
struct ProviderInfo {
    embedding: String,
    embedding_model: String,
    vector_store: String,
    generation: String,
    generation_model: String,
}

/// `healthy` when the vector store answers, `degraded` otherwise.
async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    let p = &state.providers;
    let chunks = p.store.count().await.ok();
    Json(HealthResponse {
        status: if chunks.is_some() { "healthy" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        providers: ProviderInfo {
            embedding: state.config.embedding.provider.as_str().to_string(),
            embedding_model: p.embedder.model_name().to_string(),
            vector_store: p.store.backend().to_string(),
            generation: state.config.generation.provider.as_str().to_string(),
            generation_model: p.generator.model_name().to_string(),
        },
        chunks,
    })
}

// ============ POST /chat ============

async fn handle_chat(
    State(state): State<AppState>,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, AppError> {
    let Json(request) = body?;
    Ok(Json(state.providers.chat.chat(request).await?))
}

// ============ POST /ingest ============

#[derive(Debug, Deserialize)]
struct IngestRequest {
    source_type: SourceType,
    filters: IngestFilters,
    #[serde(default)]
    replace: bool,
}

#[derive(Debug, Deserialize)]
struct IngestFilters {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    product_version: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    section: Option<String>,
    #[serde(default)]
    ticket_id: Option<String>,
    /// Pre-chunked records; when present, `title` and `text` are ignored.
    #[serde(default)]
    chunks: Option<Vec<ChunkInput>>,
}

async fn handle_ingest(
    State(state): State<AppState>,
    body: Result<Json<IngestRequest>, JsonRejection>,
) -> Result<Json<IngestReport>, AppError> {
    let Json(request) = body?;
    let ingestor = &state.providers.ingestor;
    let filters = request.filters;

    if let Some(chunks) = filters.chunks {
        if chunks.is_empty() {
            return Err(bad_request("filters.chunks must not be empty"));
        }
        return Ok(Json(ingestor.ingest_chunks(chunks).await?));
    }

    let title = filters
        .title
        .ok_or_else(|| bad_request("filters.title is required"))?;
    let text = filters
        .text
        .ok_or_else(|| bad_request("filters.text is required"))?;
    let mut doc = IngestDocument::new(title, request.source_type, text);
    doc.product_version = filters.product_version;
    doc.tags = filters.tags;
    doc.section = filters.section;
    doc.ticket_id = filters.ticket_id;

    let report = if request.replace {
        ingestor.replace_document(&doc).await?
    } else {
        ingestor.ingest_document(&doc).await?
    };
    Ok(Json(report))
}

// ============ POST /upload ============

#[derive(Debug, Deserialize)]
struct UploadRequest {
    title: String,
    text: String,
    #[serde(default)]
    source_type: Option<SourceType>,
    #[serde(default)]
    product_version: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    replace: bool,
}

/// Source type of an uploaded file: explicit, else from the title's
/// extension, else plain text.
fn upload_source_type(request: &UploadRequest) -> SourceType {
    request.source_type.unwrap_or_else(|| {
        std::path::Path::new(&request.title)
            .extension()
            .and_then(|e| SourceType::from_extension(&e.to_string_lossy()))
            .unwrap_or(SourceType::Txt)
    })
}

async fn handle_upload(
    State(state): State<AppState>,
    body: Result<Json<UploadRequest>, JsonRejection>,
) -> Result<Json<IngestReport>, AppError> {
    let Json(request) = body?;
    let source_type = upload_source_type(&request);
    let mut doc = IngestDocument::new(request.title, source_type, request.text);
    doc.product_version = request.product_version;
    doc.tags = request.tags;
    doc.extra
        .insert("source".into(), serde_json::Value::String("upload".into()));

    let ingestor = &state.providers.ingestor;
    let report = if request.replace {
        ingestor.replace_document(&doc).await?
    } else {
        ingestor.ingest_document(&doc).await?
    };
    Ok(Json(report))
}

// ============ POST /upload/tickets ============

#[derive(Debug, Deserialize)]
struct TicketUploadRequest {
    data_type: TicketFormat,
    records: serde_json::Value,
    #[serde(default)]
    product_version: Option<String>,
    #[serde(default)]
    replace: bool,
}

#[derive(Serialize)]
struct FailedDocument {
    title: String,
    error: String,
}

#[derive(Serialize)]
struct TicketUploadResponse {
    documents: usize,
    reports: Vec<DocumentReport>,
    failed: Vec<FailedDocument>,
    skipped: Vec<SkippedRecord>,
}

async fn handle_upload_tickets(
    State(state): State<AppState>,
    body: Result<Json<TicketUploadRequest>, JsonRejection>,
) -> Result<Json<TicketUploadResponse>, AppError> {
    let Json(request) = body?;
    let import = documents_from_export(
        request.data_type,
        &request.records,
        request.product_version.as_deref(),
    )?;

    let results =
        ingest_documents(&state.providers.ingestor, import.documents, request.replace).await;
    let mut reports = Vec::new();
    let mut failed = Vec::new();
    for result in results {
        match result {
            Ok(report) => reports.push(report),
            Err((title, error)) => failed.push(FailedDocument { title, error }),
        }
    }

    Ok(Json(TicketUploadResponse {
        documents: reports.len(),
        reports,
        failed,
        skipped: import.skipped,
    }))
}

// ============ Documents and chunks ============

#[derive(Debug, Deserialize)]
struct DocumentsQuery {
    #[serde(default)]
    product_version: Option<String>,
}

async fn handle_documents(
    State(state): State<AppState>,
    Query(query): Query<DocumentsQuery>,
) -> Result<Json<Vec<DocumentSummary>>, AppError> {
    Ok(Json(
        state
            .providers
            .ingestor
            .list_documents(query.product_version.as_deref())
            .await?,
    ))
}

#[derive(Serialize)]
struct DeletedResponse {
    deleted: usize,
}

async fn handle_delete_document(
    State(state): State<AppState>,
    Path((source_type, title)): Path<(String, String)>,
) -> Result<Json<DeletedResponse>, AppError> {
    let source_type: SourceType = source_type.parse()?;
    let deleted = state
        .providers
        .ingestor
        .delete_document(&DocumentKey::new(title, source_type))
        .await?;
    Ok(Json(DeletedResponse { deleted }))
}

async fn handle_delete_chunk(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeletedResponse>, AppError> {
    state.providers.ingestor.delete_chunk(&id).await?;
    Ok(Json(DeletedResponse { deleted: 1 }))
}

// ============ Conversations and feedback ============

async fn handle_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Conversation>, AppError> {
    Ok(Json(state.providers.chat.conversation(&id).await?))
}

async fn handle_conversation_feedback(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Feedback>>, AppError> {
    let feedback = conversation_feedback(
        state.providers.conversations.as_ref(),
        state.providers.feedback.as_ref(),
        &id,
    )
    .await?;
    Ok(Json(feedback))
}

#[derive(Serialize)]
struct FeedbackResponse {
    feedback_id: String,
}

async fn handle_feedback(
    State(state): State<AppState>,
    body: Result<Json<FeedbackRequest>, JsonRejection>,
) -> Result<Json<FeedbackResponse>, AppError> {
    let Json(request) = body?;
    let feedback = submit_feedback(
        state.providers.conversations.as_ref(),
        state.providers.feedback.as_ref(),
        request,
    )
    .await?;
    Ok(Json(FeedbackResponse {
        feedback_id: feedback.id,
    }))
}
