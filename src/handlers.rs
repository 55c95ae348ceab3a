use std::sync::Arc;

use axum::{
    Router,
    async_trait,
    extract::{
        FromRequest, FromRequestParts, Path, Query, State,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post, put},
};
use http::{StatusCode, header, request::Parts};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::GenerationError;
use crate::models::{BookRecord, GeneratedBook, GenerationRequest};
use crate::services::export::{BookExporter, ExportError, ExportFormat};
use crate::services::invoker::Pacer;
use crate::services::library::{
    BookLibrary, ChapterUpdate, CreatedBook, DetailsUpdate, LibraryError,
};
use crate::services::llm::CompletionApi;
use crate::services::metrics::BookMetrics;
use crate::services::pipeline::BookGenerator;
use crate::services::templates::{self, BookTemplate};
use crate::storage::RecordStore;

pub const USER_HEADER: &str = "x-user-id";

#[derive(Clone)]
pub struct AppState {
    generator: Arc<BookGenerator>,
    library: Arc<BookLibrary>,
    dev_mode: bool,
}

impl AppState {
    pub fn new(
        config: &AppConfig,
        api: Arc<dyn CompletionApi>,
        pacer: Arc<dyn Pacer>,
        store: Arc<dyn RecordStore>,
    ) -> Self {
        let generator = Arc::new(BookGenerator::new(api, pacer, config));
        let library = Arc::new(BookLibrary::new(
            store,
            generator.clone(),
            Arc::new(BookExporter),
        ));
        Self {
            generator,
            library,
            dev_mode: config.dev_mode,
        }
    }

    /// Raw error text only leaves the service in development mode.
    fn fail(&self, err: impl Into<ApiError>) -> ApiError {
        let mut err = err.into();
        if !self.dev_mode {
            err.details = None;
        }
        err
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health_check))
        .route("/api/sizes", get(list_sizes))
        .route("/api/templates", get(list_templates))
        .route("/api/templates/random", get(random_template))
        .route("/api/templates/:id", get(get_template))
        .route("/api/generate-book", post(generate_book))
        .route("/api/books", get(list_books).post(create_book))
        .route(
            "/api/books/:id",
            get(get_book).patch(update_book).delete(delete_book),
        )
        .route("/api/books/:id/chapters", post(add_chapter))
        .route(
            "/api/books/:id/chapters/:index",
            put(update_chapter).delete(remove_chapter),
        )
        .route(
            "/api/books/:id/chapters/:index/regenerate",
            post(regenerate_chapter),
        )
        .route("/api/books/:id/export/:format", get(export_book))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::AllowMethods::any())
                .allow_headers(tower_http::cors::AllowHeaders::any()),
        )
}

/// `Json` whose rejections answer with an `ApiError` body.
#[derive(FromRequest)]
#[from_request(via(Json), rejection(ApiError))]
struct JsonBody<T>(T);

#[derive(FromRequestParts)]
#[from_request(via(Path), rejection(ApiError))]
struct PathParams<T>(T);

#[derive(FromRequestParts)]
#[from_request(via(Query), rejection(ApiError))]
struct QueryParams<T>(T);

/// The signed-in user, as asserted by the fronting identity provider.
pub struct CurrentUser(pub String);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|value| CurrentUser(value.to_string()))
            .ok_or_else(|| {
                ApiError::new(
                    StatusCode::UNAUTHORIZED,
                    "Authentication required",
                    "Sign in and try again",
                )
            })
    }
}

async fn index() -> Html<&'static str> {
    Html(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>Bookwright</title>
    <meta charset="utf-8">
    <style>
        body { font-family: Arial, sans-serif; margin: 40px; }
        .info-box { background-color: #f0f8ff; padding: 20px; border-radius: 8px; margin: 20px 0; }
        .endpoint { background-color: #f5f5f5; padding: 10px; margin: 10px 0; border-radius: 4px; font-family: monospace; }
    </style>
</head>
<body>
    <h1>Bookwright</h1>

    <div class="info-box">
        <h2>Service Information</h2>
        <p>This service writes complete books from a short premise using a chat completion model.</p>
        <p>Every reply is repaired into a title, a synopsis and the requested number of chapters.</p>
    </div>

    <h2>Available Endpoints:</h2>
    <div class="endpoint">GET /health - Health check</div>
    <div class="endpoint">GET /api/sizes - Book sizes and their estimates</div>
    <div class="endpoint">GET /api/templates - Book templates (filters: genre, audience, q)</div>
    <div class="endpoint">POST /api/generate-book - Generate a book</div>
    <div class="endpoint">GET|POST /api/books - List or generate stored books</div>
    <div class="endpoint">GET|PATCH|DELETE /api/books/:id - Read, edit or delete a book</div>
    <div class="endpoint">POST /api/books/:id/chapters - Append a chapter</div>
    <div class="endpoint">PUT|DELETE /api/books/:id/chapters/:index - Edit or remove a chapter</div>
    <div class="endpoint">POST /api/books/:id/chapters/:index/regenerate - Rewrite one chapter</div>
    <div class="endpoint">GET /api/books/:id/export/:format - Download as txt, docx or epub</div>

    <h2>How to Use:</h2>
    <p>POST a JSON body such as {"description": "...", "size": "small", "genre": "mystery", "audience": "adult"}.</p>
    <p>Book library endpoints need the x-user-id header.</p>
</body>
</html>
"#,
    )
}

async fn health_check() -> &'static str {
    "OK"
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SizeEntry<'a> {
    #[serde(flatten)]
    profile: &'a crate::models::SizeProfile,
    metrics: BookMetrics,
}

async fn list_sizes(State(state): State<AppState>) -> Json<serde_json::Value> {
    let sizes: Vec<SizeEntry<'_>> = state
        .generator
        .profiles()
        .iter()
        .map(|profile| SizeEntry {
            profile,
            metrics: BookMetrics::estimate(profile, profile.chapters),
        })
        .collect();
    Json(serde_json::json!(sizes))
}

#[derive(Debug, Default, Deserialize)]
struct TemplateQuery {
    genre: Option<String>,
    audience: Option<String>,
    q: Option<String>,
}

async fn list_templates(
    QueryParams(query): QueryParams<TemplateQuery>,
) -> Json<Vec<&'static BookTemplate>> {
    let mut found: Vec<&'static BookTemplate> = match query.genre.as_deref() {
        Some(genre) => templates::by_genre(genre),
        None => templates::TEMPLATES.iter().collect(),
    };
    if let Some(audience) = query.audience.as_deref() {
        let matching = templates::by_audience(audience);
        found.retain(|template| matching.contains(template));
    }
    if let Some(q) = query.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
        let matching = templates::search(q);
        found.retain(|template| matching.contains(template));
    }
    Json(found)
}

async fn random_template() -> Json<&'static BookTemplate> {
    Json(templates::random())
}

async fn get_template(
    PathParams(id): PathParams<String>,
) -> Result<Json<&'static BookTemplate>, ApiError> {
    templates::by_id(&id).map(Json).ok_or_else(|| {
        ApiError::new(
            StatusCode::NOT_FOUND,
            "Template not found",
            "Pick one of the templates listed at /api/templates",
        )
    })
}

async fn generate_book(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<GenerationRequest>,
) -> Result<Json<GeneratedBook>, ApiError> {
    let output = state
        .generator
        .generate(&request)
        .await
        .map_err(|err| state.fail(err))?;
    Ok(Json(output.book))
}

async fn list_books(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Vec<BookRecord>>, ApiError> {
    let books = state.library.list(&user).await.map_err(|e| state.fail(e))?;
    Ok(Json(books))
}

async fn create_book(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    JsonBody(request): JsonBody<GenerationRequest>,
) -> Result<(StatusCode, Json<CreatedBook>), ApiError> {
    let created = state
        .library
        .create(&user, &request)
        .await
        .map_err(|e| state.fail(e))?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn get_book(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    PathParams(id): PathParams<Uuid>,
) -> Result<Json<BookRecord>, ApiError> {
    let book = state.library.get(&user, id).await.map_err(|e| state.fail(e))?;
    Ok(Json(book))
}

async fn update_book(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    PathParams(id): PathParams<Uuid>,
    JsonBody(update): JsonBody<DetailsUpdate>,
) -> Result<Json<BookRecord>, ApiError> {
    let book = state
        .library
        .update_details(&user, id, update)
        .await
        .map_err(|e| state.fail(e))?;
    Ok(Json(book))
}

async fn delete_book(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    PathParams(id): PathParams<Uuid>,
) -> Result<StatusCode, ApiError> {
    state
        .library
        .delete(&user, id)
        .await
        .map_err(|e| state.fail(e))?;
    Ok(StatusCode::NO_CONTENT)
}

async fn add_chapter(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    PathParams(id): PathParams<Uuid>,
    JsonBody(draft): JsonBody<ChapterUpdate>,
) -> Result<Json<BookRecord>, ApiError> {
    let book = state
        .library
        .add_chapter(&user, id, draft)
        .await
        .map_err(|e| state.fail(e))?;
    Ok(Json(book))
}

async fn update_chapter(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    PathParams((id, index)): PathParams<(Uuid, usize)>,
    JsonBody(update): JsonBody<ChapterUpdate>,
) -> Result<Json<BookRecord>, ApiError> {
    let book = state
        .library
        .update_chapter(&user, id, index, update)
        .await
        .map_err(|e| state.fail(e))?;
    Ok(Json(book))
}

async fn remove_chapter(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    PathParams((id, index)): PathParams<(Uuid, usize)>,
) -> Result<Json<BookRecord>, ApiError> {
    let book = state
        .library
        .remove_chapter(&user, id, index)
        .await
        .map_err(|e| state.fail(e))?;
    Ok(Json(book))
}

async fn regenerate_chapter(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    PathParams((id, index)): PathParams<(Uuid, usize)>,
) -> Result<Json<BookRecord>, ApiError> {
    let book = state
        .library
        .regenerate_chapter(&user, id, index)
        .await
        .map_err(|e| state.fail(e))?;
    Ok(Json(book))
}

async fn export_book(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    PathParams((id, format)): PathParams<(Uuid, String)>,
) -> Result<Response, ApiError> {
    let format: ExportFormat = format.parse().map_err(|e: ExportError| state.fail(e))?;
    let file = state
        .library
        .export(&user, id, format)
        .await
        .map_err(|e| state.fail(e))?;

    Ok((
        [
            (header::CONTENT_TYPE, file.content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file.filename),
            ),
        ],
        file.bytes,
    )
        .into_response())
}

/// JSON failure body: a label, a remediation hint, and optional detail.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    error: String,
    solution: Option<String>,
    issues: Vec<String>,
    details: Option<String>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    solution: Option<&'a str>,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    issues: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<&'a str>,
}

impl ApiError {
    fn new(status: StatusCode, error: &str, solution: &str) -> Self {
        Self {
            status,
            error: error.to_string(),
            solution: Some(solution.to_string()),
            issues: Vec::new(),
            details: None,
        }
    }

    fn with_details(mut self, details: impl ToString) -> Self {
        self.details = Some(details.to_string());
        self
    }
}

impl ApiError {
    fn bad_input(issue: String) -> Self {
        tracing::warn!("request rejected: {}", issue);
        let mut api = ApiError::new(
            StatusCode::BAD_REQUEST,
            "Invalid request",
            "Check the request body and URL against the API documentation",
        );
        api.issues = vec![issue];
        api
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::bad_input(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::bad_input(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::bad_input(rejection.body_text())
    }
}

impl From<GenerationError> for ApiError {
    fn from(err: GenerationError) -> Self {
        match &err {
            GenerationError::Unknown(_) => tracing::error!("generation failed: {:#}", err),
            _ => tracing::warn!("generation rejected: {}", err),
        }
        let mut api = ApiError::new(err.status(), err.label(), err.solution());
        if let GenerationError::Validation { issues } = &err {
            api.issues = issues.clone();
        }
        api.with_details(&err)
    }
}

impl From<ExportError> for ApiError {
    fn from(err: ExportError) -> Self {
        let api = match &err {
            ExportError::UnknownFormat(_) => ApiError::new(
                StatusCode::BAD_REQUEST,
                "Unknown export format",
                "Use txt, docx or epub",
            ),
            ExportError::Unsupported(_) => ApiError::new(
                StatusCode::BAD_REQUEST,
                "Format not available on the server",
                "Print the book to PDF from the reader view",
            ),
            ExportError::Render { .. } => {
                tracing::error!("export failed: {:#}", err);
                ApiError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Export failed",
                    "Try again or pick another format",
                )
            }
        };
        api.with_details(&err)
    }
}

impl From<LibraryError> for ApiError {
    fn from(err: LibraryError) -> Self {
        let api = match err {
            LibraryError::Generation(err) => return err.into(),
            LibraryError::Export(err) => return err.into(),
            LibraryError::NotFound(_) => ApiError::new(
                StatusCode::NOT_FOUND,
                "Book not found",
                "Check the book id or reload your library",
            ),
            LibraryError::Forbidden(_) => ApiError::new(
                StatusCode::FORBIDDEN,
                "Access denied",
                "Only the owner of a book can view or change it",
            ),
            LibraryError::InvalidChapter { .. }
            | LibraryError::LastChapter
            | LibraryError::InvalidEdit(_) => ApiError::new(
                StatusCode::BAD_REQUEST,
                "Invalid change",
                "Fix the request and try again",
            ),
            LibraryError::Store(ref source) => {
                tracing::error!("record store failure: {:#}", source);
                ApiError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Could not access your books",
                    "Try again shortly; contact support if the problem persists",
                )
            }
        };
        api.with_details(&err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: &self.error,
            solution: self.solution.as_deref(),
            issues: &self.issues,
            details: self.details.as_deref(),
        };
        (self.status, Json(body)).into_response()
    }
}
