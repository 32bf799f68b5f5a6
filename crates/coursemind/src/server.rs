//! HTTP surface consumed by the course management shell.
//!
//! Every response uses the `{success, data, message}` envelope. The status code
//! carries the error class; "nothing found" is a 404 with a readable message,
//! distinct from the 500s that need operator attention.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Path, Request, State};
use axum::http::{StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use coursemind_core::{Category, Error, ErrorClass, ParsedDocument, RetrievalFilter, RetrievalResult};
use coursemind_extract::{parse_file_url, resolve_mime};
use coursemind_generate::{Answer, NO_RELEVANT_CONTENT, Synthesis};
use coursemind_query::excerpt;
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use uuid::Uuid;

use crate::app::{App, MaterialInput};

/// Characters of chunk content returned by the search routes.
const SEARCH_EXCERPT_CHARS: usize = 500;

#[derive(Clone)]
pub struct AppState {
    app: Arc<App>,
    api_token: Option<Arc<str>>,
}

impl AppState {
    /// `api_token` enables bearer authentication on every route but `/healthz`.
    pub fn new(app: Arc<App>, api_token: Option<String>) -> Self {
        Self {
            app,
            api_token: api_token.map(Arc::from),
        }
    }
}

/// Build the router.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/parse-from-url", post(parse_from_url))
        .route("/extract-text", post(extract_text))
        .route("/generate-embeddings", post(generate_embeddings))
        .route("/chat", post(chat))
        .route("/semantic-search", post(semantic_search))
        .route("/code-search", post(code_search))
        .route("/generate-enhanced", post(generate_enhanced))
        .route("/generate-pdf", post(generate_pdf))
        .route("/materials/{id}", put(register_material))
        .route("/materials/{id}/index", delete(remove_index))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_token));

    Router::new()
        .route("/healthz", get(healthz))
        .merge(api)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until the process is stopped.
pub async fn serve(state: AppState, bind: &str) -> anyhow::Result<()> {
    let addr: SocketAddr = bind
        .parse()
        .with_context(|| format!("invalid bind address {bind}"))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("coursemind listening on http://{}", addr);
    axum::serve(listener, router(state))
        .await
        .context("server shutdown")
}

// ============================================================================
// Envelope and errors
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: String,
}

fn ok<T: Serialize>(data: T, message: impl Into<String>) -> Response {
    (
        StatusCode::OK,
        Json(Envelope {
            success: true,
            data: Some(data),
            message: message.into(),
        }),
    )
        .into_response()
}

fn not_found<T: Serialize>(data: Option<T>, message: impl Into<String>) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(Envelope {
            success: false,
            data,
            message: message.into(),
        }),
    )
        .into_response()
}

/// Status code for an error class.
pub fn status_for(class: ErrorClass) -> StatusCode {
    match class {
        ErrorClass::Validation => StatusCode::BAD_REQUEST,
        ErrorClass::NotFound => StatusCode::NOT_FOUND,
        ErrorClass::Conflict => StatusCode::CONFLICT,
        ErrorClass::Configuration | ErrorClass::Transport | ErrorClass::Internal => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// A pipeline error on its way to the client.
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(self.0.class());
        if status.is_server_error() {
            warn!("Request failed: {}", self.0);
        }
        (
            status,
            Json(Envelope::<()> {
                success: false,
                data: None,
                message: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

type ApiResult = Result<Response, ApiError>;

/// JSON body whose rejections use the envelope.
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|e| ApiError(Error::Validation(e.body_text())))?;
        Ok(Self(value))
    }
}

async fn require_token(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let Some(expected) = state.api_token.as_deref() else {
        return next.run(request).await;
    };
    let presented = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    if presented == Some(expected) {
        return next.run(request).await;
    }
    (
        StatusCode::UNAUTHORIZED,
        Json(Envelope::<()> {
            success: false,
            data: None,
            message: "missing or invalid bearer token".to_string(),
        }),
    )
        .into_response()
}

// ============================================================================
// Request bodies
// ============================================================================

fn required(field: &str, value: Option<Uuid>) -> Result<Uuid, Error> {
    value.ok_or_else(|| Error::Validation(format!("{field} is required")))
}

fn parse_category(value: Option<&str>) -> Result<Option<Category>, Error> {
    value.map(str::parse).transpose()
}

/// Filters shared by chat, search and synthesis requests.
#[derive(Debug, Default, Deserialize)]
struct FilterFields {
    #[serde(default)]
    course_id: Option<Uuid>,
    #[serde(default)]
    material_id: Option<Uuid>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    week_number: Option<u32>,
}

impl FilterFields {
    fn into_filter(self) -> Result<RetrievalFilter, Error> {
        let mut filter = RetrievalFilter::course(required("course_id", self.course_id)?);
        filter.material_id = self.material_id;
        filter.category = parse_category(self.category.as_deref())?;
        filter.week_number = self.week_number;
        Ok(filter)
    }
}

#[derive(Debug, Deserialize)]
struct ParseFromUrlRequest {
    #[serde(default)]
    material_id: Option<Uuid>,
    #[serde(default)]
    file_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ExtractTextRequest {
    #[serde(default)]
    file_url: Option<String>,
    #[serde(default)]
    mime_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MaterialIdRequest {
    #[serde(default)]
    material_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    question: String,
    #[serde(flatten)]
    filter: FilterFields,
    #[serde(default)]
    top_k: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct SearchRequest {
    query: String,
    #[serde(flatten)]
    filter: FilterFields,
    #[serde(default)]
    top_k: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct CodeSearchRequest {
    query: String,
    #[serde(default)]
    course_id: Option<Uuid>,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    top_k: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct SynthesisRequest {
    prompt: String,
    #[serde(flatten)]
    filter: FilterFields,
}

#[derive(Debug, Serialize)]
struct SearchHit {
    rank: usize,
    chunk_id: Uuid,
    score: f32,
    material_id: Uuid,
    material_title: String,
    page_number: u32,
    category: Category,
    chunk_type: coursemind_core::ChunkType,
    is_code: bool,
    language: Option<String>,
    excerpt: String,
}

#[derive(Debug, Serialize)]
struct SearchResponse {
    query: String,
    count: usize,
    results: Vec<SearchHit>,
}

fn search_response(query: &str, results: &[RetrievalResult]) -> SearchResponse {
    SearchResponse {
        query: query.to_string(),
        count: results.len(),
        results: results
            .iter()
            .enumerate()
            .map(|(i, r)| SearchHit {
                rank: i + 1,
                chunk_id: r.chunk_id,
                score: r.score,
                material_id: r.metadata.material_id,
                material_title: r.metadata.material_title.clone(),
                page_number: r.metadata.page_number,
                category: r.metadata.category,
                chunk_type: r.metadata.chunk_type,
                is_code: r.metadata.is_code,
                language: r.metadata.language.clone(),
                excerpt: excerpt(&r.content, SEARCH_EXCERPT_CHARS),
            })
            .collect(),
    }
}

fn search_result(query: &str, results: &[RetrievalResult]) -> Response {
    let body = search_response(query, results);
    if results.is_empty() {
        not_found(Some(body), NO_RELEVANT_CONTENT)
    } else {
        ok(body, format!("Found {} results", results.len()))
    }
}

#[derive(Debug, Serialize)]
struct ExtractedText {
    page_count: u32,
    skipped_pages: u32,
    text: String,
    document: ParsedDocument,
}

// ============================================================================
// Handlers
// ============================================================================

async fn healthz(State(state): State<AppState>) -> ApiResult {
    let stats = state.app.store.stats().await.map_err(Error::from)?;
    Ok(ok(stats, "ok"))
}

async fn register_material(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ApiJson(input): ApiJson<MaterialInput>,
) -> ApiResult {
    if input.id.is_some_and(|body_id| body_id != id) {
        return Err(Error::Validation("material id in body does not match path".to_string()).into());
    }
    let material = state.app.indexer.register(input.into_material(id)?).await?;
    Ok(ok(material, "Material registered"))
}

async fn parse_from_url(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<ParseFromUrlRequest>,
) -> ApiResult {
    let material_id = required("material_id", request.material_id)?;
    let file_url = request
        .file_url
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| Error::Validation("file_url is required".to_string()))?;

    // Detached so a dropped request does not abort a half-written run
    let indexer = Arc::clone(&state.app.indexer);
    let report = tokio::spawn(async move { indexer.ingest(material_id, &file_url).await })
        .await
        .map_err(|e| Error::Other(format!("ingestion task failed: {e}")))??;

    let message = format!(
        "Indexed {} chunks ({} tables, {} code) from {} pages",
        report.chunk_count, report.table_chunks, report.code_chunks, report.page_count
    );
    Ok(ok(report, message))
}

async fn extract_text(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<ExtractTextRequest>,
) -> ApiResult {
    let file_url = request
        .file_url
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| Error::Validation("file_url is required".to_string()))?;
    parse_file_url(&file_url).map_err(|e| Error::Validation(e.to_string()))?;
    state
        .app
        .parsers
        .check_supported(request.mime_type.as_deref(), &file_url)
        .map_err(Error::from)?;

    let file = state.app.fetcher.fetch(&file_url).await.map_err(Error::from)?;
    let declared = request.mime_type.as_deref().or(file.mime_type.as_deref());
    let mime = resolve_mime(declared, file.file_name.as_deref());
    let document = state
        .app
        .parsers
        .parse(&file.bytes, &mime, file.file_name.as_deref())
        .await
        .map_err(Error::from)?;

    let text = document
        .pages
        .iter()
        .map(|p| p.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");
    let message = format!(
        "Extracted {} pages ({} skipped)",
        document.pages.len(),
        document.skipped_pages
    );
    Ok(ok(
        ExtractedText {
            page_count: document.page_count,
            skipped_pages: document.skipped_pages,
            text,
            document,
        },
        message,
    ))
}

async fn generate_embeddings(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<MaterialIdRequest>,
) -> ApiResult {
    let material_id = required("material_id", request.material_id)?;
    let indexer = Arc::clone(&state.app.indexer);
    let report = tokio::spawn(async move { indexer.reembed(material_id).await })
        .await
        .map_err(|e| Error::Other(format!("embedding task failed: {e}")))??;
    let message = format!("Stored {} vectors", report.vector_count);
    Ok(ok(report, message))
}

async fn remove_index(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult {
    let report = state.app.indexer.remove_index(id).await?;
    Ok(ok(report, "Index removed"))
}

async fn chat(State(state): State<AppState>, ApiJson(request): ApiJson<ChatRequest>) -> ApiResult {
    let filter = request.filter.into_filter()?;
    match state
        .app
        .answers
        .ask(&request.question, filter, request.top_k)
        .await?
    {
        Answer::Grounded(answer) => Ok(ok(answer, "Answer generated")),
        Answer::NoRelevantContent => Ok(not_found::<()>(None, NO_RELEVANT_CONTENT)),
    }
}

async fn semantic_search(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<SearchRequest>,
) -> ApiResult {
    let filter = request.filter.into_filter()?;
    let results = state
        .app
        .retriever
        .search(&request.query, filter, request.top_k)
        .await?;
    Ok(search_result(&request.query, &results))
}

async fn code_search(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<CodeSearchRequest>,
) -> ApiResult {
    let course_id = required("course_id", request.course_id)?;
    let results = state
        .app
        .retriever
        .search_code(
            &request.query,
            course_id,
            request.language.as_deref(),
            request.top_k,
        )
        .await?;
    Ok(search_result(&request.query, &results))
}

async fn generate_enhanced(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<SynthesisRequest>,
) -> ApiResult {
    let filter = request.filter.into_filter()?;
    match state.app.synthesizer.short(&request.prompt, filter).await? {
        Synthesis::Generated(content) => Ok(ok(content, "Content generated")),
        Synthesis::NoRelevantContent => Ok(not_found::<()>(None, NO_RELEVANT_CONTENT)),
    }
}

async fn generate_pdf(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<SynthesisRequest>,
) -> ApiResult {
    let filter = request.filter.into_filter()?;
    match state.app.synthesizer.long(&request.prompt, filter).await? {
        Synthesis::Generated(content) => Ok(ok(content, "Document content generated")),
        Synthesis::NoRelevantContent => Ok(not_found::<()>(None, NO_RELEVANT_CONTENT)),
    }
}
