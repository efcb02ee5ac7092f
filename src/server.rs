//! JSON HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | Service banner |
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/api/upload` | Multipart PDF upload (`file`), optional `?topic_id=` |
//! | `GET`  | `/api/documents` | List documents, optional `?topic_id=` |
//! | `DELETE` | `/api/documents/{id}` | Delete a document and its namespace |
//! | `POST` | `/api/query` | Ask a question against a chat session |
//! | `POST` | `/api/sessions/create` | Create a chat session over documents |
//! | `GET`  | `/api/sessions` | List sessions |
//! | `GET`  | `/api/sessions/{id}` | Session with its documents |
//! | `DELETE` | `/api/sessions/{id}` | Delete a session and its conversations |
//! | `GET`  | `/api/sessions/{id}/conversations` | Conversation turns, oldest first |
//! | `POST` | `/api/search/papers` | Search external paper APIs |
//! | `POST` | `/api/papers/save` | Save a paper under a topic (idempotent) |
//! | `DELETE` | `/api/papers/{id}` | Delete a saved paper |
//! | `GET`  | `/api/topics` | Topics with paper counts |
//! | `GET`  | `/api/topics/{id}/papers` | Papers saved under a topic |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "session 7 not found" } }
//! ```
//!
//! Codes: `bad_request` (400), `not_found` (404), `extraction_failed` (500),
//! `internal` (500), `model_call_failed` (502), `retrieval_unavailable` (503).
//!
//! # CORS
//!
//! Only the origins listed in `[server].cors_origins` are allowed.

use anyhow::Context;
use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Multipart, Path, Query, State},
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};

use docqa_core::models::OwningEntity;

use crate::config::Config;
use crate::context::AppContext;
use crate::error::Error;
use crate::ingest;
use crate::models::{
    ConversationTurn, DocumentRecord, IndexStatus, PaperRecord, SessionDetail, SessionSummary,
    StoredPaper, TopicSummary,
};
use crate::qa::{answer_question, Answer};

/// Build the context from `config` and serve until the process exits.
///
/// Fails before binding if the language-model API key is missing.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let ctx = AppContext::from_config(config).await?;
    serve(ctx).await
}

/// Serve an already-built context on `[server].bind`.
pub async fn serve(ctx: AppContext) -> anyhow::Result<()> {
    let bind_addr = ctx.config.server.bind.clone();
    let app = router(ctx)?;

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;
    tracing::info!("listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn router(ctx: AppContext) -> anyhow::Result<Router> {
    let origins = ctx
        .config
        .server
        .cors_origins
        .iter()
        .map(|o| {
            o.parse::<HeaderValue>()
                .with_context(|| format!("invalid CORS origin: {}", o))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any);

    let body_limit = ctx.config.server.max_upload_mb * 1024 * 1024;

    Ok(Router::new()
        .route("/", get(handle_root))
        .route("/health", get(handle_health))
        .route("/api/upload", post(handle_upload))
        .route("/api/documents", get(handle_list_documents))
        .route("/api/documents/{id}", delete(handle_delete_document))
        .route("/api/query", post(handle_query))
        .route("/api/sessions", get(handle_list_sessions))
        .route("/api/sessions/create", post(handle_create_session))
        .route(
            "/api/sessions/{id}",
            get(handle_get_session).delete(handle_delete_session),
        )
        .route(
            "/api/sessions/{id}/conversations",
            get(handle_conversations),
        )
        .route("/api/search/papers", post(handle_search_papers))
        .route("/api/papers/save", post(handle_save_paper))
        .route("/api/papers/{id}", delete(handle_delete_paper))
        .route("/api/topics", get(handle_list_topics))
        .route("/api/topics/{id}/papers", get(handle_topic_papers))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .with_state(ctx))
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

/// An [`Error`] on its way out as an HTTP response.
pub struct AppError(Error);

impl<E: Into<Error>> From<E> for AppError {
    fn from(err: E) -> Self {
        AppError(err.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::error!(code = self.0.code(), error = %self.0, "request failed");
        }
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.0.code().to_string(),
                message: self.0.to_string(),
            },
        };
        (status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError(Error::Validation(message.into()))
}

/// Unwrap a JSON body, reporting malformed input in the error envelope.
fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| bad_request(rejection.body_text()))
}

// ============ GET / and /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "message": "Document QA API",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ Documents ============

#[derive(Deserialize)]
struct TopicFilter {
    topic_id: Option<i64>,
}

#[derive(Serialize)]
struct UploadResponse {
    document_id: i64,
    filename: String,
    chunk_count: i64,
    index_status: IndexStatus,
    message: String,
}

async fn handle_upload(
    State(ctx): State<AppContext>,
    Query(filter): Query<TopicFilter>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let mut upload: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(e.body_text()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| bad_request(e.body_text()))?;
        upload = Some((filename, bytes.to_vec()));
        break;
    }

    let (filename, bytes) = upload.ok_or_else(|| bad_request("missing multipart field 'file'"))?;
    let doc = ingest::ingest_pdf(&ctx, &filename, &bytes, filter.topic_id).await?;

    Ok(Json(UploadResponse {
        document_id: doc.id,
        filename: doc.filename,
        chunk_count: doc.chunk_count,
        index_status: doc.index_status,
        message: "Document uploaded and processed successfully".to_string(),
    }))
}

async fn handle_list_documents(
    State(ctx): State<AppContext>,
    Query(filter): Query<TopicFilter>,
) -> Result<Json<Vec<DocumentRecord>>, AppError> {
    Ok(Json(ctx.registry.list_documents(filter.topic_id).await?))
}

async fn handle_delete_document(
    State(ctx): State<AppContext>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, AppError> {
    ingest::delete_document(&ctx, id).await?;
    Ok(Json(serde_json::json!({ "message": "Document deleted successfully" })))
}

// ============ Query ============

#[derive(Deserialize)]
struct QueryRequest {
    session_id: i64,
    question: String,
}

#[derive(Serialize)]
struct SourceRef {
    document_id: i64,
    chunk_index: i64,
    score: f32,
}

#[derive(Serialize)]
struct QueryResponse {
    answer: String,
    question: String,
    degraded: bool,
    sources: Vec<SourceRef>,
}

async fn handle_query(
    State(ctx): State<AppContext>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<QueryResponse>, AppError> {
    let req = json_body(payload)?;
    let outcome = answer_question(&ctx, OwningEntity::Session(req.session_id), &req.question).await?;

    let sources = match &outcome.answer {
        Answer::Grounded { sources, .. } => sources
            .iter()
            .map(|s| SourceRef {
                document_id: s.document_id,
                chunk_index: s.chunk_index,
                score: s.score,
            })
            .collect(),
        Answer::Degraded { .. } => Vec::new(),
    };

    Ok(Json(QueryResponse {
        degraded: outcome.answer.is_degraded(),
        answer: outcome.turn.answer,
        question: outcome.turn.question,
        sources,
    }))
}

// ============ Sessions ============

#[derive(Deserialize)]
struct CreateSessionRequest {
    name: String,
    document_ids: Vec<i64>,
}

#[derive(Serialize)]
struct CreateSessionResponse {
    session_id: i64,
    name: String,
    document_count: i64,
    index_status: IndexStatus,
}

async fn handle_create_session(
    State(ctx): State<AppContext>,
    payload: Result<Json<CreateSessionRequest>, JsonRejection>,
) -> Result<Json<CreateSessionResponse>, AppError> {
    let req = json_body(payload)?;
    let session = ingest::create_session(&ctx, &req.name, &req.document_ids).await?;
    Ok(Json(CreateSessionResponse {
        session_id: session.id,
        name: session.name,
        document_count: session.document_count,
        index_status: session.index_status,
    }))
}

async fn handle_list_sessions(
    State(ctx): State<AppContext>,
) -> Result<Json<Vec<SessionSummary>>, AppError> {
    Ok(Json(ctx.registry.list_sessions().await?))
}

async fn handle_get_session(
    State(ctx): State<AppContext>,
    Path(id): Path<i64>,
) -> Result<Json<SessionDetail>, AppError> {
    Ok(Json(ctx.registry.get_session(id).await?))
}

async fn handle_delete_session(
    State(ctx): State<AppContext>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, AppError> {
    ingest::delete_session(&ctx, id).await?;
    Ok(Json(serde_json::json!({ "message": "Session deleted successfully" })))
}

async fn handle_conversations(
    State(ctx): State<AppContext>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<ConversationTurn>>, AppError> {
    Ok(Json(
        ctx.registry
            .list_conversations(OwningEntity::Session(id))
            .await?,
    ))
}

// ============ Papers & topics ============

#[derive(Deserialize)]
struct PaperSearchRequest {
    query: String,
    #[serde(default = "default_paper_limit")]
    limit: usize,
    #[serde(default)]
    offset: usize,
}

fn default_paper_limit() -> usize {
    10
}

#[derive(Serialize)]
struct PaperSearchResponse {
    papers: Vec<PaperRecord>,
    count: usize,
}

async fn handle_search_papers(
    State(ctx): State<AppContext>,
    payload: Result<Json<PaperSearchRequest>, JsonRejection>,
) -> Result<Json<PaperSearchResponse>, AppError> {
    let req = json_body(payload)?;
    let query = req.query.trim();
    if query.is_empty() {
        return Err(bad_request("query must not be empty"));
    }
    if !(1..=100).contains(&req.limit) {
        return Err(bad_request("limit must be between 1 and 100"));
    }

    let papers = ctx.papers.search(query, req.limit, req.offset).await;
    Ok(Json(PaperSearchResponse {
        count: papers.len(),
        papers,
    }))
}

#[derive(Deserialize)]
struct SavePaperRequest {
    paper: PaperRecord,
    topic_name: String,
}

#[derive(Serialize)]
struct SavePaperResponse {
    paper_id: i64,
    topic_id: i64,
    created: bool,
    message: String,
}

async fn handle_save_paper(
    State(ctx): State<AppContext>,
    payload: Result<Json<SavePaperRequest>, JsonRejection>,
) -> Result<Json<SavePaperResponse>, AppError> {
    let req = json_body(payload)?;
    let saved = ctx.registry.save_paper(&req.paper, &req.topic_name).await?;
    Ok(Json(SavePaperResponse {
        paper_id: saved.paper_id,
        topic_id: saved.topic_id,
        created: saved.created,
        message: if saved.created {
            "Paper saved successfully".to_string()
        } else {
            "Paper already saved in this topic".to_string()
        },
    }))
}

async fn handle_delete_paper(
    State(ctx): State<AppContext>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, AppError> {
    ctx.registry.delete_paper(id).await?;
    Ok(Json(serde_json::json!({ "message": "Paper deleted successfully" })))
}

async fn handle_list_topics(
    State(ctx): State<AppContext>,
) -> Result<Json<Vec<TopicSummary>>, AppError> {
    Ok(Json(ctx.registry.list_topics().await?))
}

async fn handle_topic_papers(
    State(ctx): State<AppContext>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<StoredPaper>>, AppError> {
    Ok(Json(ctx.registry.list_topic_papers(id).await?))
}
